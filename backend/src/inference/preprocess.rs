//! Image bytes to model input tensors.
//!
//! Two policies exist and are tied to the model artifact they were trained
//! with; they are not interchangeable:
//!
//! * [`NormalizationPolicy::None`]: resize to the model's declared spatial
//!   size, keep raw 0-255 samples in the decoder's native channel order,
//!   layout `(1, H, W, C)`.
//! * [`NormalizationPolicy::ImageNet`]: resize to a fixed square, force RGB,
//!   scale to 0-1, normalise with the ImageNet mean/std, layout `(1, 3, H, W)`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use super::error::DecodeError;

pub type InputTensor = Array4<f32>;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPolicy {
    None,
    ImageNet,
}

/// Strips an optional `data:<mime>;base64,` header and decodes the rest.
/// Whitespace anywhere in the payload is ignored, so line-wrapped output of
/// `base64` decodes as-is.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = match encoded.split(',').nth(1) {
        Some(body) => body,
        None => encoded,
    };
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(compact)?)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(image)
}

/// Variant A: `(1, H, W, C)` of raw samples, no scaling or channel reordering.
pub fn raw_tensor(
    image: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<InputTensor, DecodeError> {
    let resized = image.resize_exact(width, height, FilterType::CatmullRom);
    let channels = resized.color().channel_count() as usize;
    let samples = native_samples(&resized);

    Ok(Array4::from_shape_vec(
        (1, height as usize, width as usize, channels),
        samples,
    )?)
}

/// Variant B: `(1, 3, size, size)` normalised with ImageNet statistics.
pub fn imagenet_tensor(image: &DynamicImage, size: u32) -> InputTensor {
    let rgb = image
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();
    let side = size as usize;

    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let sample = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (sample - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    })
}

// Samples in the decoder's own pixel format, widened to f32.
fn native_samples(image: &DynamicImage) -> Vec<f32> {
    fn widen<T: Copy + Into<f32>>(raw: &[T]) -> Vec<f32> {
        raw.iter().map(|&v| v.into()).collect()
    }

    match image {
        DynamicImage::ImageLuma16(buf) => widen(buf.as_raw()),
        DynamicImage::ImageLumaA16(buf) => widen(buf.as_raw()),
        DynamicImage::ImageRgb16(buf) => widen(buf.as_raw()),
        DynamicImage::ImageRgba16(buf) => widen(buf.as_raw()),
        DynamicImage::ImageRgb32F(buf) => buf.as_raw().clone(),
        DynamicImage::ImageRgba32F(buf) => buf.as_raw().clone(),
        other => widen(other.as_bytes()),
    }
}

use std::time::Instant;

use serde::{Deserialize, Serialize};
use shared::ModelPrediction;

use super::error::{DecodeError, PipelineError};
use super::labels::LabelTable;
use super::postprocess::{decode_probabilities, decode_scored_rows};
use super::preprocess::{
    decode_base64_image, decode_image, imagenet_tensor, raw_tensor, InputTensor,
    NormalizationPolicy,
};
use super::session::{InferenceSession, SessionHandle};
use crate::config::ModelConfig;

/// Which preprocessing/decoding pair the loaded artifact expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// ImageNet normalisation, planar layout, softmax over class logits.
    ImagenetSoftmax,
    /// Raw pixels, NHWC layout, score+index rows resolved through a label file.
    RawScoredRows,
}

impl ModelVariant {
    pub fn normalization(self) -> NormalizationPolicy {
        match self {
            ModelVariant::ImagenetSoftmax => NormalizationPolicy::ImageNet,
            ModelVariant::RawScoredRows => NormalizationPolicy::None,
        }
    }
}

pub struct Classifier {
    session: InferenceSession,
    variant: ModelVariant,
    image_size: u32,
    labels: LabelTable,
}

impl Classifier {
    pub fn new(
        session: InferenceSession,
        variant: ModelVariant,
        image_size: u32,
        labels: LabelTable,
    ) -> Self {
        Self {
            session,
            variant,
            image_size,
            labels,
        }
    }

    /// Builds an ONNX-backed classifier. Reads the label file when the
    /// variant needs one; the model itself is loaded lazily.
    pub fn from_config(config: &ModelConfig) -> std::io::Result<Self> {
        let labels = match (config.variant, &config.labels_path) {
            (ModelVariant::RawScoredRows, Some(path)) => LabelTable::from_file(path)?,
            (ModelVariant::RawScoredRows, None) => {
                log::warn!("raw_scored_rows without labels_path, every class is unmapped");
                LabelTable::OneIndexed(Vec::new())
            }
            (ModelVariant::ImagenetSoftmax, _) => LabelTable::fixed(config.class_names.clone()),
        };

        Ok(Self::new(
            InferenceSession::onnx(&config.path, config.session_pool),
            config.variant,
            config.image_size,
            labels,
        ))
    }

    pub fn session(&self) -> &InferenceSession {
        &self.session
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn classify(&self, bytes: &[u8]) -> Result<ModelPrediction, PipelineError> {
        let handle = self.session.ensure_loaded()?;

        let started = Instant::now();
        let image = decode_image(bytes)?;
        let tensor = self.to_tensor(&image, &handle)?;
        log::debug!(
            "Preprocessed {}x{} image into {:?} in {:?}",
            image.width(),
            image.height(),
            tensor.shape(),
            started.elapsed()
        );

        let started = Instant::now();
        let output = handle.run(&tensor)?;
        log::debug!("Inference produced {:?} in {:?}", output.shape, started.elapsed());

        let prediction = match self.variant {
            ModelVariant::ImagenetSoftmax => decode_probabilities(&output, &self.labels)?,
            ModelVariant::RawScoredRows => {
                let best = decode_scored_rows(&output)?;
                let name = self.labels.resolve(best.class_index);
                ModelPrediction {
                    predicted_class: name.clone(),
                    confidence: best.score,
                    all_probabilities: [(name, best.score)].into_iter().collect(),
                }
            }
        };
        Ok(prediction)
    }

    /// Decodes a base64 (optionally data-URL prefixed) image and classifies it.
    pub fn classify_encoded(&self, encoded: &str) -> Result<ModelPrediction, PipelineError> {
        let bytes = decode_base64_image(encoded)?;
        self.classify(&bytes)
    }

    fn to_tensor(
        &self,
        image: &image::DynamicImage,
        handle: &SessionHandle,
    ) -> Result<InputTensor, DecodeError> {
        match self.variant.normalization() {
            NormalizationPolicy::ImageNet => Ok(imagenet_tensor(image, self.image_size)),
            NormalizationPolicy::None => {
                let (height, width) = handle.input().nhwc_spatial();
                raw_tensor(
                    image,
                    width.unwrap_or(self.image_size),
                    height.unwrap_or(self.image_size),
                )
            }
        }
    }
}

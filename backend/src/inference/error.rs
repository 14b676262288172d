use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot identify image file: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
    #[error("pixel buffer does not fit tensor layout: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model file not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to load model: {0}")]
    Runtime(String),
    #[error("Model declares no inputs")]
    NoInputs,
    #[error("Model input {name} is not a tensor")]
    NotATensor { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("input shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch { expected: Vec<i64>, actual: Vec<usize> },
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("Inference failed: {0}")]
    Runtime(String),
}

impl From<ort::Error> for ModelLoadError {
    fn from(err: ort::Error) -> Self {
        ModelLoadError::Runtime(err.to_string())
    }
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError::Runtime(err.to_string())
    }
}

/// Any failure along decode -> load -> run -> decode-output.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

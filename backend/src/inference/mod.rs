//! Image classification: decode and normalise, run the ONNX session, turn
//! the raw output into a labelled prediction.

pub mod error;
pub mod labels;
pub mod pipeline;
pub mod pool;
pub mod postprocess;
pub mod preprocess;
pub mod session;

pub use error::{DecodeError, InferenceError, ModelLoadError, PipelineError};
pub use labels::LabelTable;
pub use pipeline::{Classifier, ModelVariant};
pub use session::{InferenceSession, ModelRunner, OutputTensor, SessionHandle};

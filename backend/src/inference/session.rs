//! Process-wide handle to the ONNX classifier.
//!
//! The model is loaded at most once per [`InferenceSession`]; concurrent
//! first callers serialise on an init lock and every later call gets the
//! cached [`SessionHandle`]. A failed load is not cached, so the next caller
//! retries. Runs go through a [`Pool`] of ONNX sessions, so concurrent
//! requests only wait on each other once every pooled session is busy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::error::{InferenceError, ModelLoadError};
use super::pool::Pool;
use super::preprocess::InputTensor;

/// Name and declared shape of the model's first input. Dynamic dimensions
/// are reported by the runtime as `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl InputSpec {
    /// Height and width assuming an NHWC layout, `None` where the model
    /// leaves the dimension dynamic.
    pub fn nhwc_spatial(&self) -> (Option<u32>, Option<u32>) {
        let dim = |i: usize| {
            self.shape
                .get(i)
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as u32)
        };
        (dim(1), dim(2))
    }

    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(&expected, &actual)| expected <= 0 || expected as usize == actual)
    }
}

/// Raw, uninterpreted output of the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// Values of the first batch item, flattened.
    pub fn first_row(&self) -> Result<&[f32], InferenceError> {
        let row_len: usize = self.shape.iter().skip(1).product();
        match self.shape.first() {
            Some(&batch) if batch > 0 && row_len > 0 && self.data.len() >= row_len => {
                Ok(&self.data[..row_len])
            }
            _ => Err(InferenceError::UnexpectedOutput(format!(
                "empty output with shape {:?}",
                self.shape
            ))),
        }
    }
}

/// Anything that can map an input tensor to the model's first output.
pub trait ModelRunner: Send + Sync {
    fn input(&self) -> &InputSpec;
    fn run(&self, input: &InputTensor) -> Result<OutputTensor, InferenceError>;
}

pub struct OnnxModel {
    sessions: Pool<Session, ort::Error>,
    input: InputSpec,
}

fn open_session(model_path: &Path) -> ort::Result<Session> {
    Session::builder()?.commit_from_file(model_path)
}

impl OnnxModel {
    /// Loads the artifact once to validate it and read its input; further
    /// sessions, up to `pool_size`, are opened when concurrent runs need them.
    pub fn load(model_path: &Path, pool_size: usize) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
        }

        let session = open_session(model_path)?;
        let first = session.inputs().first().ok_or(ModelLoadError::NoInputs)?;
        let name = first.name().to_string();
        let shape = match first.dtype() {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect::<Vec<i64>>(),
            _ => return Err(ModelLoadError::NotATensor { name }),
        };

        log::info!(
            "Model loaded successfully from {}. Input: {} {:?}, up to {} sessions",
            model_path.display(),
            name,
            shape,
            pool_size.max(1)
        );

        let path = model_path.to_path_buf();
        Ok(Self {
            sessions: Pool::seeded(pool_size, session, move || {
                log::debug!("Opening another session for {}", path.display());
                open_session(&path)
            }),
            input: InputSpec { name, shape },
        })
    }
}

impl ModelRunner for OnnxModel {
    fn input(&self) -> &InputSpec {
        &self.input
    }

    fn run(&self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data))?;

        self.sessions.with(|session| -> Result<OutputTensor, InferenceError> {
            let outputs = session.run(ort::inputs![self.input.name.as_str() => tensor])?;
            let (out_shape, out_data) = outputs[0].try_extract_tensor::<f32>()?;

            Ok(OutputTensor {
                shape: out_shape.iter().map(|&d| d.max(0) as usize).collect(),
                data: out_data.to_vec(),
            })
        })?
    }
}

/// Cheap, clonable reference to a loaded model.
#[derive(Clone)]
pub struct SessionHandle {
    runner: Arc<dyn ModelRunner>,
}

impl SessionHandle {
    pub fn new(runner: Arc<dyn ModelRunner>) -> Self {
        Self { runner }
    }

    pub fn input(&self) -> &InputSpec {
        self.runner.input()
    }

    pub fn run(&self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let spec = self.runner.input();
        if !spec.accepts(input.shape()) {
            return Err(InferenceError::ShapeMismatch {
                expected: spec.shape.clone(),
                actual: input.shape().to_vec(),
            });
        }
        self.runner.run(input)
    }
}

type Loader = dyn Fn(&Path) -> Result<Arc<dyn ModelRunner>, ModelLoadError> + Send + Sync;

pub struct InferenceSession {
    model_path: PathBuf,
    loader: Box<Loader>,
    handle: OnceLock<SessionHandle>,
    init_lock: Mutex<()>,
}

impl InferenceSession {
    /// Session backed by ONNX Runtime, running at most `pool_size`
    /// inferences at once.
    pub fn onnx(model_path: impl Into<PathBuf>, pool_size: usize) -> Self {
        Self::with_loader(model_path, move |path| {
            Ok(Arc::new(OnnxModel::load(path, pool_size)?) as Arc<dyn ModelRunner>)
        })
    }

    pub fn with_loader<F>(model_path: impl Into<PathBuf>, loader: F) -> Self
    where
        F: Fn(&Path) -> Result<Arc<dyn ModelRunner>, ModelLoadError> + Send + Sync + 'static,
    {
        Self {
            model_path: model_path.into(),
            loader: Box::new(loader),
            handle: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn ensure_loaded(&self) -> Result<SessionHandle, ModelLoadError> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let handle = SessionHandle::new((self.loader)(&self.model_path)?);
        let _ = self.handle.set(handle.clone());
        Ok(handle)
    }
}

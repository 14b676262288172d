use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::inference::pipeline::ModelVariant;

pub const CONFIG_ENV: &str = "SKINGUARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/skinguard.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {0}: {1}")]
    Env(&'static str, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(deserialize_with = "lambda_section")]
    pub lambda: ModelConfig,
    pub assessment: AssessmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_max_age: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub variant: ModelVariant,
    pub image_size: u32,
    pub class_names: Vec<String>,
    pub labels_path: Option<PathBuf>,
    /// Upper bound on ONNX sessions run in parallel.
    pub session_pool: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub enabled: bool,
    pub api_key_path: PathBuf,
    pub base_url: String,
    pub model: String,
    pub reasoning_effort: String,
    pub service_tier: String,
    pub web_search: bool,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_max_age: 3600,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/model2_2025-11-30_03-02-21.onnx"),
            variant: ModelVariant::ImagenetSoftmax,
            image_size: 224,
            class_names: vec!["Benign".to_string(), "Malignant".to_string()],
            labels_path: None,
            session_pool: std::thread::available_parallelism().map_or(4, |n| n.get()),
        }
    }
}

impl ModelConfig {
    /// Defaults for the serverless entry point, which ships its own model
    /// directory with a 1-indexed `classes.txt`.
    pub fn lambda_default() -> Self {
        Self {
            path: PathBuf::from("models/model2_2025-11-30_03-02-21.onnx"),
            variant: ModelVariant::RawScoredRows,
            labels_path: Some(PathBuf::from("models/classes.txt")),
            ..Self::default()
        }
    }
}

/// A partial `lambda:` section only overrides the keys it names; the rest
/// keep the serverless defaults rather than the HTTP model's.
fn lambda_section<'de, D>(deserializer: D) -> Result<ModelConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = serde_yaml::Value::deserialize(deserializer)?;
    let mut merged =
        serde_yaml::to_value(ModelConfig::lambda_default()).map_err(D::Error::custom)?;
    match (merged.as_mapping_mut(), overrides) {
        (_, serde_yaml::Value::Null) => {}
        (Some(base), serde_yaml::Value::Mapping(keys)) => base.extend(keys),
        (_, other) => {
            return Err(D::Error::custom(format!(
                "lambda section must be a mapping, got {:?}",
                other
            )));
        }
    }
    serde_yaml::from_value(merged).map_err(D::Error::custom)
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_path: PathBuf::from("open_ai.txt"),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5".to_string(),
            reasoning_effort: "low".to_string(),
            service_tier: "priority".to_string(),
            web_search: true,
            timeout_secs: 120,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            lambda: ModelConfig::lambda_default(),
            assessment: AssessmentConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the YAML config named by `SKINGUARD_CONFIG` (or the default
    /// path), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_yaml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(path.to_path_buf(), e)),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Env("PORT", port.clone()))?;
        }
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(model_path) = std::env::var("MODEL_PATH") {
            self.model.path = PathBuf::from(model_path);
        }
        if let Ok(key_path) = std::env::var("OPENAI_API_KEY_PATH") {
            self.assessment.api_key_path = PathBuf::from(key_path);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

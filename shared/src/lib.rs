use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub const ASSESSMENT_UNAVAILABLE: &str = "AI assessment unavailable";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelPrediction {
    pub predicted_class: String,
    pub confidence: f32,
    pub all_probabilities: BTreeMap<String, f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum SeverityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ConsultDoctor {
    Yes,
    No,
}

/// Structured guidance produced by the LLM for a predicted condition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssessmentDocument {
    pub disease_description: String,
    pub severity_level: SeverityLevel,
    pub immediate_action: String,
    pub things_to_keep_in_mind: Vec<String>,
    pub consult_doctor: ConsultDoctor,
    pub consult_doctor_reasoning: String,
}

/// Either a full assessment or the placeholder returned when the LLM round
/// trip failed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum AiAssessment {
    Available(AssessmentDocument),
    Unavailable { error: String },
}

impl AiAssessment {
    pub fn unavailable() -> Self {
        AiAssessment::Unavailable {
            error: ASSESSMENT_UNAVAILABLE.to_string(),
        }
    }
}

impl From<Option<AssessmentDocument>> for AiAssessment {
    fn from(document: Option<AssessmentDocument>) -> Self {
        match document {
            Some(document) => AiAssessment::Available(document),
            None => AiAssessment::unavailable(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictResponse {
    pub model_prediction: ModelPrediction,
    pub ai_assessment: AiAssessment,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceStatus {
    pub status: String,
    pub message: String,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub model_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiseasePrediction {
    pub disease_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub detail: String,
}

//! LLM-backed dermatology assessment for a predicted condition.
//!
//! Absence is an expected outcome: every failure (missing key, network,
//! API error, unparseable reply) is logged and turned into `None`.

pub mod openai;

use shared::AssessmentDocument;

use crate::config::AssessmentConfig;
use openai::ResponsesClient;

pub const ASSESSMENT_INPUT: &str =
    "Provide your complete dermatological assessment in JSON format.";

pub fn build_instructions(disease: &str, age: u32, gender: &str) -> String {
    format!(
        "You are an expert dermatologist API providing assessments for medical applications. \
         Analyze {disease} for a {age}-year-old {gender} patient. \
         Provide evidence-based, safe, and medically appropriate recommendations. \
         \n\n\
         You MUST respond with ONLY valid JSON in this exact format (no markdown, no extra text):\n\
         {{\n  \
         \"disease_description\": \"A 1 sentence description\",\n  \
         \"severity_level\": \"High\" or \"Medium\" or \"Low\",\n  \
         \"immediate_action\": \"What to do right now. Extremely short 1 - 3 bullet points\",\n  \
         \"things_to_keep_in_mind\": [\"point 1\", \"point 2\", \"point 3\"],\n  \
         \"consult_doctor\": \"Yes\" or \"No\",\n  \
         \"consult_doctor_reasoning\": \"Brief explanation\"\n\
         }}"
    )
}

/// Returns the contents of the first ```json fence, else the first bare
/// ``` fence, else the trimmed input.
pub fn strip_code_fences(output: &str) -> &str {
    let output = output.trim();
    let fenced = if let Some((_, rest)) = output.split_once("```json") {
        Some(rest)
    } else {
        output.split_once("```").map(|(_, rest)| rest)
    };

    match fenced {
        Some(rest) => rest.split("```").next().unwrap_or(rest).trim(),
        None => output,
    }
}

pub fn parse_assessment(output: &str) -> Result<AssessmentDocument, serde_json::Error> {
    serde_json::from_str(strip_code_fences(output))
}

pub struct AssessmentService {
    client: Option<ResponsesClient>,
}

impl AssessmentService {
    /// Reads the API key once. Any problem leaves the service disabled.
    pub fn from_config(config: &AssessmentConfig) -> Self {
        if !config.enabled {
            log::info!("AI assessment disabled by configuration");
            return Self::disabled();
        }

        let api_key = match std::fs::read_to_string(&config.api_key_path) {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            Ok(_) => {
                log::warn!("API key file {} is empty", config.api_key_path.display());
                return Self::disabled();
            }
            Err(e) => {
                log::warn!(
                    "Could not read API key from {}: {}. AI assessment unavailable",
                    config.api_key_path.display(),
                    e
                );
                return Self::disabled();
            }
        };

        match ResponsesClient::new(config, api_key) {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                log::error!("Failed to build LLM client: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn with_client(client: ResponsesClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn assess(&self, disease: &str, age: u32, gender: &str) -> Option<AssessmentDocument> {
        let client = self.client.as_ref()?;
        let instructions = build_instructions(disease, age, gender);

        let output = match client.create_response(&instructions, ASSESSMENT_INPUT).await {
            Ok(output) => output,
            Err(e) => {
                log::error!("Assessment request failed: {}", e);
                return None;
            }
        };

        match parse_assessment(&output) {
            Ok(document) => Some(document),
            Err(e) => {
                log::warn!("JSON parsing error: {}", e);
                log::warn!("Raw output: {}", output);
                None
            }
        }
    }
}

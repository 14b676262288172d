//! Serverless-style entry point: base64 image in, disease name out.

use shared::DiseasePrediction;

use crate::inference::{Classifier, ModelVariant, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Failed to classify image: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Failed to classify image: expected a raw_scored_rows model, got {0:?}")]
    WrongVariant(ModelVariant),
}

/// Classifies a base64 image string, with or without a data-URL header.
///
/// Only a [`ModelVariant::RawScoredRows`] classifier is accepted, so the name
/// always comes from the 1-indexed label file.
pub fn classify_encoded_image(
    classifier: &Classifier,
    encoded_image: &str,
) -> Result<DiseasePrediction, ClassifyError> {
    if classifier.variant() != ModelVariant::RawScoredRows {
        return Err(ClassifyError::WrongVariant(classifier.variant()));
    }
    let prediction = classifier.classify_encoded(encoded_image)?;
    Ok(DiseasePrediction {
        disease_name: prediction.predicted_class,
    })
}

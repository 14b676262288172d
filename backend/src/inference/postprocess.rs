//! Raw model output to a decision.
//!
//! Argmax ties resolve to the lowest index in both procedures.

use std::collections::BTreeMap;

use ndarray::ArrayView2;
use shared::ModelPrediction;

use super::error::InferenceError;
use super::labels::LabelTable;
use super::session::OutputTensor;

/// Winner of a score+index output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub row: usize,
    pub score: f32,
    pub class_index: i64,
}

/// Index of the first maximal element; `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, current)) if v <= current || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Procedure A: the first batch item is an `(N, K)` matrix with a score in
/// column 0 and a class index in column 1. Picks the row with the highest
/// score and returns its class index, truncated toward zero.
pub fn decode_scored_rows(output: &OutputTensor) -> Result<ScoredRow, InferenceError> {
    let (rows, cols) = match output.shape.as_slice() {
        [_, rows, cols] => (*rows, *cols),
        other => {
            return Err(InferenceError::UnexpectedOutput(format!(
                "expected (batch, rows, columns), got {other:?}"
            )));
        }
    };
    if cols < 2 {
        return Err(InferenceError::UnexpectedOutput(format!(
            "need a score and an index column, got {cols} column(s)"
        )));
    }

    let matrix = ArrayView2::from_shape((rows, cols), output.first_row()?)
        .map_err(|e| InferenceError::UnexpectedOutput(e.to_string()))?;
    let scores: Vec<f32> = matrix.column(0).to_vec();
    let row = argmax(&scores)
        .ok_or_else(|| InferenceError::UnexpectedOutput("no rows in output".to_string()))?;

    Ok(ScoredRow {
        row,
        score: matrix[[row, 0]],
        class_index: matrix[[row, 1]] as i64,
    })
}

/// Procedure B: softmax over the first batch item, argmax wins, every class
/// probability reported under its resolved name.
pub fn decode_probabilities(
    output: &OutputTensor,
    labels: &LabelTable,
) -> Result<ModelPrediction, InferenceError> {
    let probabilities = softmax(output.first_row()?);
    let top = argmax(&probabilities).ok_or_else(|| {
        InferenceError::UnexpectedOutput("probabilities are not comparable".to_string())
    })?;

    let all_probabilities: BTreeMap<String, f32> = probabilities
        .iter()
        .enumerate()
        .map(|(i, p)| (labels.resolve(i as i64), *p))
        .collect();

    Ok(ModelPrediction {
        predicted_class: labels.resolve(top as i64),
        confidence: probabilities[top],
        all_probabilities,
    })
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Measurement, Receipt and Status Types
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InstrumentError, InstrumentResult};
use crate::score::{
    AtomicScore, BridgeSpec, BubbleClass, RawValue, ScoreInput, ScoreTrace, Tier, Toggles,
};

/// Evaluation dimensions as submitted for measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub novelty: f64,
    pub density: f64,
    pub coherence: f64,
    pub alignment: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRequest {
    pub submission_hash: String,
    pub evaluation: Evaluation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub toggles: Toggles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_spec: Option<BridgeSpec>,
}

impl MeasurementRequest {
    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        let request: Self = serde_json::from_str(json).map_err(|e| {
            InstrumentError::Validation(format!(
                "missing required fields (submissionHash, evaluation): {e}"
            ))
        })?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> InstrumentResult<()> {
        if self.submission_hash.is_empty() {
            return Err(InstrumentError::MissingField("submissionHash".to_string()));
        }
        Ok(())
    }

    /// Engine input derived from the evaluation block.
    pub fn score_input(&self) -> ScoreInput {
        let e = &self.evaluation;
        let input = ScoreInput::new(e.novelty, e.density, e.coherence, e.alignment)
            .with_toggles(self.toggles);
        match &self.bridge_spec {
            Some(spec) => input.with_bridge_spec(spec.clone()),
            None => input,
        }
    }
}

/// Submitted dimensions echoed back with the computed final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredScores {
    pub novelty: RawValue,
    pub density: RawValue,
    pub coherence: RawValue,
    pub alignment: RawValue,
    #[serde(rename = "final")]
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub hash: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    /// RFC 3339 issue time.
    pub timestamp: String,
    pub scores: MeasuredScores,
    pub atomic_score: AtomicScore,
    pub integrity: Integrity,
}

/// Flattened precision block of a scoring response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionSummary {
    pub n_hat: f64,
    pub bubble_class: BubbleClass,
    pub tier: Tier,
}

/// Scoring response: the atomic score plus its integrity digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReceipt {
    #[serde(rename = "final")]
    pub final_score: f64,
    pub trace: ScoreTrace,
    /// Digest of the canonical `AtomicScore`.
    pub integrity_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<PrecisionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Maintenance,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub measurement: bool,
    pub verification: bool,
    pub state_image: bool,
    pub scoring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: ServiceStatus,
    pub version: String,
    pub octave: String,
    pub scoring_table_version: String,
    pub timestamp: String,
    pub capabilities: Capabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_request_parse() {
        let req = MeasurementRequest::from_json(
            r#"{"submissionHash":"sub-1","evaluation":{"novelty":0.7,"density":0.6,"coherence":0.8,"alignment":0.9,"pod_score":0.5},"toggles":{"seed":true}}"#,
        )
        .unwrap();
        assert_eq!(req.evaluation.pod_score, Some(0.5));
        let input = req.score_input();
        assert!(input.toggles().seed);
        assert_eq!(input.dimensions(), [0.7, 0.6, 0.8, 0.9]);
    }

    #[test]
    fn test_measurement_request_requires_evaluation() {
        let err = MeasurementRequest::from_json(r#"{"submissionHash":"sub-1"}"#).unwrap_err();
        assert!(matches!(err, InstrumentError::Validation(_)));
    }

    #[test]
    fn test_measurement_request_empty_submission() {
        let err = MeasurementRequest::from_json(
            r#"{"submissionHash":"","evaluation":{"novelty":0.1,"density":0.1,"coherence":0.1,"alignment":0.1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, InstrumentError::MissingField(_)));
    }

    #[test]
    fn test_capabilities_field_names() {
        let caps = Capabilities {
            measurement: true,
            verification: true,
            state_image: true,
            scoring: true,
        };
        let v = serde_json::to_value(caps).unwrap();
        assert_eq!(v["stateImage"], serde_json::json!(true));
    }
}

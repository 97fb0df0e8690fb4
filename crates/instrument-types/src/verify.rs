// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Verification Types
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InstrumentError, InstrumentResult};

/// Outcome of a verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStatus {
    /// Original data supplied and its digest equals the claimed hash.
    Verified,
    /// Original data supplied and its digest differs.
    Mismatch,
    /// No data supplied; the claimed hash is a well-formed digest, nothing more.
    VerifiedShapeOnly,
    /// No data supplied and the claimed hash is not a well-formed digest.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub subject_id: String,
    /// `None` in shape-only mode: nothing was recomputed.
    pub computed_hash: Option<String>,
    pub matches: bool,
    pub status: VerificationStatus,
}

impl VerificationResult {
    /// True only for a full recomputed match.
    pub fn verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Verification request as it arrives from the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub measurement_id: String,
    pub expected_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_data: Option<Value>,
}

impl VerificationRequest {
    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            InstrumentError::Validation(format!(
                "missing required fields (measurementId, expectedHash): {e}"
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub hash: Option<String>,
    pub matches: bool,
    pub measurement_id: String,
    pub status: VerificationStatus,
}

/// Boundary response: `{verified, matches}` plus the integrity block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub verified: bool,
    pub matches: bool,
    pub integrity: IntegrityReport,
}

impl From<VerificationResult> for VerificationResponse {
    fn from(result: VerificationResult) -> Self {
        Self {
            verified: result.verified(),
            matches: result.matches,
            integrity: IntegrityReport {
                hash: result.computed_hash,
                matches: result.matches,
                measurement_id: result.subject_id,
                status: result.status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape_only_serializes_kebab() {
        let v = serde_json::to_value(VerificationStatus::VerifiedShapeOnly).unwrap();
        assert_eq!(v, json!("verified-shape-only"));
    }

    #[test]
    fn test_shape_only_is_not_verified() {
        let result = VerificationResult {
            subject_id: "m-1".into(),
            computed_hash: None,
            matches: false,
            status: VerificationStatus::VerifiedShapeOnly,
        };
        let response = VerificationResponse::from(result);
        assert!(!response.verified);
        assert!(!response.matches);
        assert_eq!(response.integrity.measurement_id, "m-1");
    }

    #[test]
    fn test_request_requires_ids() {
        assert!(VerificationRequest::from_json(r#"{"measurementId":"a"}"#).is_err());
        let req = VerificationRequest::from_json(
            r#"{"measurementId":"a","expectedHash":"b","measurementData":{"x":1}}"#,
        )
        .unwrap();
        assert_eq!(req.measurement_data, Some(json!({"x": 1})));
    }
}

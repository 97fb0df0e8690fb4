// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Verification Service
// ─────────────────────────────────────────────────────────────────────
//! Re-checks previously issued digests.
//!
//! With the original data, the digest is recomputed through the hash
//! binder and compared in constant time. Without it, only the claimed
//! hash's shape can be checked and the result says so explicitly.

use serde::Serialize;
use serde_json::Value;
use subtle::ConstantTimeEq;

use instrument_types::{
    InstrumentError, InstrumentResult, VerificationRequest, VerificationResponse,
    VerificationResult, VerificationStatus,
};

use crate::digest;

/// Constant-time byte comparison.
///
/// Time depends only on the input lengths, never on where the first
/// differing byte sits. Unequal lengths compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Stateless verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationService;

impl VerificationService {
    pub fn new() -> Self {
        Self
    }

    /// Verify `claimed_hash` for `subject_id`, optionally against the data
    /// it was issued for.
    pub fn verify(
        &self,
        subject_id: &str,
        claimed_hash: &str,
        original_data: Option<&Value>,
    ) -> InstrumentResult<VerificationResult> {
        check_ids(subject_id, claimed_hash)?;
        match original_data {
            Some(data) => self.compare(subject_id, claimed_hash, data),
            None => Ok(shape_only(subject_id, claimed_hash)),
        }
    }

    /// Verify against any serializable value (e.g. an `AtomicScore`).
    pub fn verify_value<T: Serialize + ?Sized>(
        &self,
        subject_id: &str,
        claimed_hash: &str,
        original_data: &T,
    ) -> InstrumentResult<VerificationResult> {
        check_ids(subject_id, claimed_hash)?;
        self.compare(subject_id, claimed_hash, original_data)
    }

    /// Transport-shaped entry point.
    pub fn verify_request(&self, request: &VerificationRequest) -> InstrumentResult<VerificationResponse> {
        self.verify(
            &request.measurement_id,
            &request.expected_hash,
            request.measurement_data.as_ref(),
        )
        .map(VerificationResponse::from)
    }

    fn compare<T: Serialize + ?Sized>(
        &self,
        subject_id: &str,
        claimed_hash: &str,
        data: &T,
    ) -> InstrumentResult<VerificationResult> {
        let computed = digest::digest(data)?;
        let matches = constant_time_eq(computed.as_bytes(), claimed_hash.as_bytes());
        log::debug!("verification of {subject_id}: matches={matches}");
        Ok(VerificationResult {
            subject_id: subject_id.to_string(),
            computed_hash: Some(computed),
            matches,
            status: if matches {
                VerificationStatus::Verified
            } else {
                VerificationStatus::Mismatch
            },
        })
    }
}

fn check_ids(subject_id: &str, claimed_hash: &str) -> InstrumentResult<()> {
    if subject_id.is_empty() {
        return Err(InstrumentError::MissingField("measurementId".to_string()));
    }
    if claimed_hash.is_empty() {
        return Err(InstrumentError::MissingField("expectedHash".to_string()));
    }
    Ok(())
}

fn shape_only(subject_id: &str, claimed_hash: &str) -> VerificationResult {
    let status = if digest::is_well_formed(claimed_hash) {
        VerificationStatus::VerifiedShapeOnly
    } else {
        VerificationStatus::Malformed
    };
    VerificationResult {
        subject_id: subject_id.to_string(),
        computed_hash: None,
        matches: false,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_match() {
        let data = json!({"final": 0.76, "submissionHash": "abc"});
        let hash = digest::digest(&data).unwrap();
        let result = VerificationService.verify("m-1", &hash, Some(&data)).unwrap();
        assert!(result.matches);
        assert!(result.verified());
        assert_eq!(result.status, VerificationStatus::Verified);
        assert_eq!(result.computed_hash.as_deref(), Some(hash.as_str()));
        assert_eq!(result.subject_id, "m-1");
    }

    #[test]
    fn test_round_trip_key_order_independent() {
        let issued = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let presented = json!({"b": {"d": 3, "c": 2}, "a": 1});
        let hash = digest::digest(&issued).unwrap();
        assert!(VerificationService.verify("m", &hash, Some(&presented)).unwrap().matches);
    }

    #[test]
    fn test_tampered_data_mismatch() {
        let hash = digest::digest(&json!({"final": 0.76})).unwrap();
        let result = VerificationService
            .verify("m-1", &hash, Some(&json!({"final": 0.77})))
            .unwrap();
        assert!(!result.matches);
        assert!(!result.verified());
        assert_eq!(result.status, VerificationStatus::Mismatch);
    }

    #[test]
    fn test_shape_only_mode() {
        let hash = digest::digest_bytes(b"anything");
        let result = VerificationService.verify("m-1", &hash, None).unwrap();
        assert!(!result.matches);
        assert!(!result.verified());
        assert_eq!(result.status, VerificationStatus::VerifiedShapeOnly);
        assert!(result.computed_hash.is_none());
    }

    #[test]
    fn test_shape_only_malformed() {
        let result = VerificationService.verify("m-1", "not-a-hash", None).unwrap();
        assert_eq!(result.status, VerificationStatus::Malformed);
        assert!(!result.matches);
    }

    #[test]
    fn test_empty_ids_rejected() {
        let err = VerificationService.verify("", "abc", None).unwrap_err();
        assert!(matches!(err, InstrumentError::MissingField(_)));
        let err = VerificationService.verify("m", "", None).unwrap_err();
        assert!(matches!(err, InstrumentError::MissingField(_)));
    }

    #[test]
    fn test_uppercase_claim_does_not_match() {
        let data = json!({"x": 1});
        let hash = digest::digest(&data).unwrap().to_uppercase();
        assert!(!VerificationService.verify("m", &hash, Some(&data)).unwrap().matches);
    }

    #[test]
    fn test_constant_time_eq_positions() {
        let base = digest::digest_bytes(b"base");
        let mut first = base.clone().into_bytes();
        first[0] ^= 0x01;
        let mut last = base.clone().into_bytes();
        last[63] ^= 0x01;
        assert!(constant_time_eq(base.as_bytes(), base.as_bytes()));
        assert!(!constant_time_eq(base.as_bytes(), &first));
        assert!(!constant_time_eq(base.as_bytes(), &last));
        assert!(!constant_time_eq(base.as_bytes(), &base.as_bytes()[..32]));
    }

    #[test]
    fn test_verify_value_typed() {
        use instrument_types::ScoreInput;
        let score = crate::scorer::compute_score(&ScoreInput::new(0.4, 0.5, 0.6, 0.7));
        let hash = digest::digest(&score).unwrap();
        assert!(VerificationService.verify_value("score", &hash, &score).unwrap().verified());
    }

    /// Re-spell integral floats as integers, as `JSON.stringify` does.
    fn respell_integers(v: Value) -> Value {
        match v {
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, respell_integers(v))).collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(respell_integers).collect()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => json!(f as i64),
                _ => Value::Number(n),
            },
            other => other,
        }
    }

    #[test]
    fn test_score_verifies_after_client_respelling() {
        use instrument_types::ScoreInput;
        let score = crate::scorer::compute_score(&ScoreInput::new(1.2, 0.6, 0.7, 0.9));
        let hash = digest::digest(&score).unwrap();
        let original = serde_json::to_value(&score).unwrap();
        let resent = respell_integers(original.clone());
        assert_ne!(
            serde_json::to_string(&original).unwrap(),
            serde_json::to_string(&resent).unwrap()
        );
        assert_eq!(resent["trace"]["terms"][0]["adjustment"], json!(1));
        let result = VerificationService.verify("m-2", &hash, Some(&resent)).unwrap();
        assert!(result.verified());
    }

    #[test]
    fn test_verify_request_response_shape() {
        let data = json!({"k": "v"});
        let request = VerificationRequest {
            measurement_id: "m-9".into(),
            expected_hash: digest::digest(&data).unwrap(),
            measurement_data: Some(data),
        };
        let response = VerificationService.verify_request(&request).unwrap();
        assert!(response.verified);
        assert!(response.matches);
        assert_eq!(response.integrity.measurement_id, "m-9");
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["integrity"]["measurementId"], json!("m-9"));
    }
}

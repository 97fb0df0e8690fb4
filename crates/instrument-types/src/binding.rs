// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — State-Image Binding Types
// ─────────────────────────────────────────────────────────────────────

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BindingConfig;
use crate::error::{InstrumentError, InstrumentResult};
use crate::score::AtomicScore;

/// Pixel channels that feed fingerprint extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    Rgb,
    Grayscale,
}

impl Channels {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Grayscale => "grayscale",
        }
    }

    pub const fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Grayscale => 1,
        }
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channels {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb" => Ok(Self::Rgb),
            "grayscale" => Ok(Self::Grayscale),
            other => Err(InstrumentError::unsupported("channels", other)),
        }
    }
}

/// How `stateId` is derived.
///
/// `Nonce` mixes a fresh per-call nonce into the id, so replaying identical
/// inputs yields a distinct record. `Content` omits the nonce, so replays
/// collide and can be detected as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateIdMode {
    #[default]
    Nonce,
    Content,
}

impl FromStr for StateIdMode {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nonce" => Ok(Self::Nonce),
            "content" => Ok(Self::Content),
            other => Err(InstrumentError::unsupported("stateIdMode", other)),
        }
    }
}

/// Options exactly as they arrive in a binding request. Every field is
/// optional; [`BindRequestOptions::resolve`] fills defaults and rejects
/// unrecognized values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindRequestOptions {
    pub channels: Option<String>,
    pub key_length: Option<i64>,
    pub iterations: Option<i64>,
    pub state_id_mode: Option<String>,
}

impl BindRequestOptions {
    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| InstrumentError::Validation(format!("invalid options: {e}")))
    }

    pub fn resolve(&self, config: &BindingConfig) -> InstrumentResult<BindOptions> {
        let channels = match &self.channels {
            Some(raw) => raw.parse()?,
            None => config.default_channels,
        };
        let key_length_bits = match self.key_length {
            Some(bits) => {
                let in_range = bits >= i64::from(config.min_key_length_bits)
                    && bits <= i64::from(config.max_key_length_bits);
                if !in_range || bits % 8 != 0 {
                    return Err(InstrumentError::unsupported("keyLength", bits));
                }
                bits as u32
            }
            None => config.default_key_length_bits,
        };
        let iterations = match self.iterations {
            Some(n) => {
                if n < 1 || n > i64::from(config.max_iterations) {
                    return Err(InstrumentError::unsupported("iterations", n));
                }
                n as u32
            }
            None => config.default_iterations,
        };
        let state_id_mode = match &self.state_id_mode {
            Some(raw) => raw.parse()?,
            None => StateIdMode::default(),
        };
        Ok(BindOptions {
            channels,
            key_length_bits,
            iterations,
            state_id_mode,
        })
    }
}

/// Validated binding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindOptions {
    pub channels: Channels,
    pub key_length_bits: u32,
    pub iterations: u32,
    pub state_id_mode: StateIdMode,
}

impl BindOptions {
    pub fn key_length_bytes(&self) -> usize {
        (self.key_length_bits / 8) as usize
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        let config = BindingConfig::default();
        Self {
            channels: config.default_channels,
            key_length_bits: config.default_key_length_bits,
            iterations: config.default_iterations,
            state_id_mode: StateIdMode::default(),
        }
    }
}

/// Score payload bound to an image.
///
/// Opaque beyond the mandatory `submissionHash`; everything else (nested
/// evaluation, scores, an embedded atomic score) is hashed as supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreOutput(Value);

impl CoreOutput {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| InstrumentError::Validation(format!("invalid coreOutput: {e}")))
    }

    /// Wrap an issued score together with the submission it scored.
    pub fn from_score(submission_hash: &str, score: &AtomicScore) -> InstrumentResult<Self> {
        let atomic = serde_json::to_value(score)
            .map_err(|e| InstrumentError::internal(format!("atomic score encoding: {e}")))?;
        Ok(Self(serde_json::json!({
            "submissionHash": submission_hash,
            "atomicScore": atomic,
        })))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The mandatory `submissionHash`; absent, empty or non-string fails.
    pub fn submission_hash(&self) -> InstrumentResult<&str> {
        match self.0.get("submissionHash").and_then(Value::as_str) {
            Some(hash) if !hash.is_empty() => Ok(hash),
            _ => Err(InstrumentError::MissingField(
                "coreOutput.submissionHash".to_string(),
            )),
        }
    }
}

/// Hashes emitted by one binding call. Never carries the key or the
/// fingerprint itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateImageRecord {
    pub state_id: String,
    pub state_hash: String,
    pub encryption_key_hash: String,
    pub core_output_hash: String,
    pub submission_hash: String,
}

/// Post-binding integrity check reported alongside the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingVerification {
    pub integrity_verified: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateImageBinding {
    pub state_image: StateImageRecord,
    pub verification: BindingVerification,
}

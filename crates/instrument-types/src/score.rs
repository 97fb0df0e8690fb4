// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Score Types
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InstrumentError, InstrumentResult};

/// Clamp a value to [lo, hi], mapping NaN to lo and Inf to nearest bound.
#[inline]
pub fn clamp_score(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        log::warn!("clamp_score: NaN detected, clamping to {lo:.4}");
        return lo;
    }
    if value.is_infinite() {
        let boundary = if value > 0.0 { hi } else { lo };
        log::warn!("clamp_score: Inf detected, clamping to {boundary:.4}");
        return boundary;
    }
    value.clamp(lo, hi)
}

/// One of the four normalized quality inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Novelty,
    Density,
    Coherence,
    Alignment,
}

impl Dimension {
    /// Fixed evaluation order. Trace terms always follow it.
    pub const ALL: [Dimension; 4] = [
        Dimension::Novelty,
        Dimension::Density,
        Dimension::Coherence,
        Dimension::Alignment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Novelty => "novelty",
            Self::Density => "density",
            Self::Coherence => "coherence",
            Self::Alignment => "alignment",
        }
    }

    /// Position in [`Dimension::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Novelty => 0,
            Self::Density => 1,
            Self::Coherence => 2,
            Self::Alignment => 3,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named boolean modifiers accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Seed,
    Edge,
    Overlap,
}

/// Toggle flags; absent flags default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggles {
    pub seed: bool,
    pub edge: bool,
    pub overlap: bool,
}

impl Toggles {
    pub fn is_set(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::Seed => self.seed,
            Toggle::Edge => self.edge,
            Toggle::Overlap => self.overlap,
        }
    }
}

/// Externally supplied override structure.
///
/// Opaque to the engine except for the `weights` object, whose keys name
/// dimensions and whose values replace the base weight for that dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeSpec(Value);

impl BridgeSpec {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Raw `weights` entries, sorted by key.
    ///
    /// `Err` carries the offending value when `weights` is present but is
    /// not an object.
    pub fn weight_entries(&self) -> Result<Vec<(&str, &Value)>, &Value> {
        match self.0.get("weights") {
            None => Ok(Vec::new()),
            Some(Value::Object(map)) => {
                let mut entries: Vec<(&str, &Value)> =
                    map.iter().map(|(k, v)| (k.as_str(), v)).collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Ok(entries)
            }
            Some(other) => Err(other),
        }
    }
}

/// Scoring request: four dimensions plus optional modifiers.
///
/// Fields are private; once built the input is only ever borrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInput {
    novelty: f64,
    density: f64,
    coherence: f64,
    alignment: f64,
    #[serde(default)]
    toggles: Toggles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bridge_spec: Option<BridgeSpec>,
}

impl ScoreInput {
    pub fn new(novelty: f64, density: f64, coherence: f64, alignment: f64) -> Self {
        Self {
            novelty,
            density,
            coherence,
            alignment,
            toggles: Toggles::default(),
            bridge_spec: None,
        }
    }

    pub fn with_toggles(mut self, toggles: Toggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn with_bridge_spec(mut self, bridge_spec: BridgeSpec) -> Self {
        self.bridge_spec = Some(bridge_spec);
        self
    }

    /// Parse a scoring request payload.
    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            InstrumentError::Validation(format!(
                "missing or invalid required fields (novelty, density, coherence, alignment): {e}"
            ))
        })
    }

    pub fn dimension(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Novelty => self.novelty,
            Dimension::Density => self.density,
            Dimension::Coherence => self.coherence,
            Dimension::Alignment => self.alignment,
        }
    }

    /// Raw (unclamped) values in [`Dimension::ALL`] order.
    pub fn dimensions(&self) -> [f64; 4] {
        [self.novelty, self.density, self.coherence, self.alignment]
    }

    pub fn toggles(&self) -> Toggles {
        self.toggles
    }

    pub fn bridge_spec(&self) -> Option<&BridgeSpec> {
        self.bridge_spec.as_ref()
    }
}

/// Why a dimension value was corrected before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampReason {
    BelowRange,
    AboveRange,
    NotFinite,
}

/// Non-finite input spellings; JSON numbers cannot carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonFinite {
    #[serde(rename = "NaN")]
    NaN,
    #[serde(rename = "Infinity")]
    PosInf,
    #[serde(rename = "-Infinity")]
    NegInf,
}

/// An input value exactly as received. Finite values serialize as JSON
/// numbers, the rest as `"NaN"`, `"Infinity"` or `"-Infinity"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Finite(f64),
    NonFinite(NonFinite),
}

impl RawValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Finite(v) => v,
            Self::NonFinite(NonFinite::NaN) => f64::NAN,
            Self::NonFinite(NonFinite::PosInf) => f64::INFINITY,
            Self::NonFinite(NonFinite::NegInf) => f64::NEG_INFINITY,
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Self::Finite(_))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self::NonFinite(NonFinite::NaN)
        } else if value == f64::INFINITY {
            Self::NonFinite(NonFinite::PosInf)
        } else if value == f64::NEG_INFINITY {
            Self::NonFinite(NonFinite::NegInf)
        } else {
            Self::Finite(value)
        }
    }
}

/// A silently-corrected input, surfaced in the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampEvent {
    pub dimension: Dimension,
    pub raw: RawValue,
    pub clamped: f64,
    pub reason: ClampReason,
}

/// One weighted contribution to the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTerm {
    pub dimension: Dimension,
    /// Clamped dimension value.
    pub value: f64,
    /// Weight after any bridge override.
    pub weight: f64,
    /// Product of all toggle factors applied to this dimension (1.0 if none).
    pub adjustment: f64,
    /// Toggles that contributed to `adjustment`, in table order.
    pub toggles: Vec<Toggle>,
    /// `value * weight * adjustment`.
    pub contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideOutcome {
    Applied,
    UnknownDimension,
    InvalidValue,
    MalformedSpec,
}

/// Record of one bridge override attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightOverride {
    pub key: String,
    /// The override value exactly as supplied.
    pub requested: Value,
    pub base_weight: Option<f64>,
    pub applied_weight: Option<f64>,
    pub outcome: OverrideOutcome,
}

/// Categorical agreement band derived from `n_hat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleClass {
    Tight,
    Stable,
    Diffuse,
    Scattered,
}

impl BubbleClass {
    pub const fn index(self) -> usize {
        match self {
            Self::Tight => 0,
            Self::Stable => 1,
            Self::Diffuse => 2,
            Self::Scattered => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tight => "tight",
            Self::Stable => "stable",
            Self::Diffuse => "diffuse",
            Self::Scattered => "scattered",
        }
    }
}

/// Ordinal quality level, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Copper,
}

impl Tier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Platinum => "platinum",
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Bronze => "bronze",
            Self::Copper => "copper",
        }
    }
}

/// The (n_hat, bubble_class, tier) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionClassification {
    pub n_hat: f64,
    pub bubble_class: BubbleClass,
    pub tier: Tier,
    /// Population standard deviation of the raw dimension values.
    /// `null` when any raw value was non-finite.
    pub dispersion: Option<f64>,
}

/// Audit record explaining how `final` was derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrace {
    /// Scoring table version; any constant change bumps it.
    pub version: String,
    pub clamps: Vec<ClampEvent>,
    pub terms: Vec<TraceTerm>,
    pub overrides: Vec<WeightOverride>,
    /// The bridge spec exactly as supplied.
    pub bridge_spec: Option<Value>,
    pub weight_sum: f64,
    pub raw_total: f64,
    pub final_clamped: bool,
    pub precision: PrecisionClassification,
}

impl ScoreTrace {
    pub fn term(&self, dimension: Dimension) -> Option<&TraceTerm> {
        self.terms.iter().find(|t| t.dimension == dimension)
    }

    pub fn was_clamped(&self, dimension: Dimension) -> bool {
        self.clamps.iter().any(|c| c.dimension == dimension)
    }
}

/// Single scalar result plus its full derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicScore {
    #[serde(rename = "final")]
    pub final_score: f64,
    pub trace: ScoreTrace,
    pub toggles: Toggles,
}

impl AtomicScore {
    pub fn precision(&self) -> &PrecisionClassification {
        &self.trace.precision
    }
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::binding::Channels;
use crate::error::{InstrumentError, InstrumentResult};
use crate::score::{BubbleClass, Dimension, Tier, Toggle};

/// Version of the built-in scoring table. Carried in every trace.
pub const SCORING_TABLE_VERSION: &str = "atomic-score/1";

/// Base weight per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub novelty: f64,
    pub density: f64,
    pub coherence: f64,
    pub alignment: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            novelty: 0.30,
            density: 0.20,
            coherence: 0.25,
            alignment: 0.25,
        }
    }
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Novelty => self.novelty,
            Dimension::Density => self.density,
            Dimension::Coherence => self.coherence,
            Dimension::Alignment => self.alignment,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

/// Multiplicative factor a toggle applies to one dimension's term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleAdjustment {
    pub toggle: Toggle,
    pub dimension: Dimension,
    pub factor: f64,
}

/// `n_hat` ceiling and the lower bound of each bubble band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionBands {
    /// `n_hat` at perfect agreement; `n_hat = 1 / (σ² + 1/ceiling)`.
    pub n_hat_ceiling: f64,
    pub tight: f64,
    pub stable: f64,
    pub diffuse: f64,
}

impl Default for PrecisionBands {
    fn default() -> Self {
        Self {
            n_hat_ceiling: 100.0,
            tight: 50.0,
            stable: 20.0,
            diffuse: 8.0,
        }
    }
}

impl PrecisionBands {
    pub fn classify(&self, n_hat: f64) -> BubbleClass {
        if n_hat >= self.tight {
            BubbleClass::Tight
        } else if n_hat >= self.stable {
            BubbleClass::Stable
        } else if n_hat >= self.diffuse {
            BubbleClass::Diffuse
        } else {
            BubbleClass::Scattered
        }
    }
}

/// Lower bounds of the final-score bands used for tier lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalBands {
    pub high: f64,
    pub mid: f64,
    pub low: f64,
}

impl Default for FinalBands {
    fn default() -> Self {
        Self {
            high: 0.8,
            mid: 0.6,
            low: 0.4,
        }
    }
}

impl FinalBands {
    /// Column index into the tier table: 0 = high … 3 = below `low`.
    pub fn index(&self, final_score: f64) -> usize {
        if final_score >= self.high {
            0
        } else if final_score >= self.mid {
            1
        } else if final_score >= self.low {
            2
        } else {
            3
        }
    }
}

/// Public, versioned scoring constants.
///
/// Any change to weights, adjustments, bands or the tier table is a
/// breaking change to the trace contract and must ship under a new
/// `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTable {
    pub version: String,
    pub weights: DimensionWeights,
    pub adjustments: Vec<ToggleAdjustment>,
    pub precision: PrecisionBands,
    pub final_bands: FinalBands,
    /// Rows indexed by [`BubbleClass::index`], columns by [`FinalBands::index`].
    pub tier_table: [[Tier; 4]; 4],
}

impl Default for ScoringTable {
    fn default() -> Self {
        use Tier::*;
        Self {
            version: SCORING_TABLE_VERSION.to_string(),
            weights: DimensionWeights::default(),
            adjustments: vec![
                ToggleAdjustment {
                    toggle: Toggle::Seed,
                    dimension: Dimension::Novelty,
                    factor: 1.15,
                },
                ToggleAdjustment {
                    toggle: Toggle::Edge,
                    dimension: Dimension::Coherence,
                    factor: 1.10,
                },
                ToggleAdjustment {
                    toggle: Toggle::Overlap,
                    dimension: Dimension::Density,
                    factor: 0.90,
                },
            ],
            precision: PrecisionBands::default(),
            final_bands: FinalBands::default(),
            tier_table: [
                [Platinum, Gold, Silver, Bronze],
                [Gold, Silver, Silver, Bronze],
                [Silver, Bronze, Bronze, Copper],
                [Bronze, Copper, Copper, Copper],
            ],
        }
    }
}

impl ScoringTable {
    pub fn tier(&self, bubble_class: BubbleClass, final_score: f64) -> Tier {
        self.tier_table[bubble_class.index()][self.final_bands.index(final_score)]
    }

    /// Validate table constants.
    pub fn validate(&self) -> InstrumentResult<()> {
        if self.version.trim().is_empty() {
            return Err(InstrumentError::Config(
                "scoring table version must not be empty".to_string(),
            ));
        }
        for dimension in Dimension::ALL {
            let w = self.weights.get(dimension);
            if !w.is_finite() || w < 0.0 {
                return Err(InstrumentError::Config(format!(
                    "weight for {dimension} must be finite and >= 0, got {w}"
                )));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(InstrumentError::Config(format!(
                "dimension weights must sum to 1.0, got {sum}"
            )));
        }
        for (i, adj) in self.adjustments.iter().enumerate() {
            if !adj.factor.is_finite() || adj.factor <= 0.0 {
                return Err(InstrumentError::Config(format!(
                    "adjustment factor for {:?} must be finite and > 0, got {}",
                    adj.toggle, adj.factor
                )));
            }
            if self.adjustments[..i].iter().any(|a| a.toggle == adj.toggle) {
                return Err(InstrumentError::Config(format!(
                    "duplicate adjustment for toggle {:?}",
                    adj.toggle
                )));
            }
        }
        let p = &self.precision;
        if !(p.n_hat_ceiling > 0.0 && p.n_hat_ceiling.is_finite()) {
            return Err(InstrumentError::Config(format!(
                "n_hat_ceiling must be finite and > 0, got {}",
                p.n_hat_ceiling
            )));
        }
        if !(p.n_hat_ceiling >= p.tight && p.tight > p.stable && p.stable > p.diffuse && p.diffuse > 0.0)
        {
            return Err(InstrumentError::Config(format!(
                "precision bands must satisfy ceiling >= tight > stable > diffuse > 0, got {} / {} / {} / {}",
                p.n_hat_ceiling, p.tight, p.stable, p.diffuse
            )));
        }
        let f = &self.final_bands;
        if !(f.high <= 1.0 && f.high > f.mid && f.mid > f.low && f.low > 0.0) {
            return Err(InstrumentError::Config(format!(
                "final bands must satisfy 1 >= high > mid > low > 0, got {} / {} / {}",
                f.high, f.mid, f.low
            )));
        }
        if self.version == SCORING_TABLE_VERSION && *self != Self::default() {
            return Err(InstrumentError::Config(format!(
                "modified scoring table must not reuse version {SCORING_TABLE_VERSION}"
            )));
        }
        Ok(())
    }
}

/// Defaults and limits for state-image binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub default_channels: Channels,
    pub default_key_length_bits: u32,
    /// Default key-derivation work factor.
    pub default_iterations: u32,
    /// Hard cap on caller-supplied iterations; bounds worst-case latency.
    pub max_iterations: u32,
    pub min_key_length_bits: u32,
    pub max_key_length_bits: u32,
    /// Largest accepted image, in pixels (width × height).
    #[serde(default = "default_max_image_pixels")]
    pub max_image_pixels: u64,
}

fn default_max_image_pixels() -> u64 {
    40_000_000
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            default_channels: Channels::Rgb,
            default_key_length_bits: 256,
            default_iterations: 10_000,
            max_iterations: 1_000_000,
            min_key_length_bits: 128,
            max_key_length_bits: 512,
            max_image_pixels: default_max_image_pixels(),
        }
    }
}

impl BindingConfig {
    pub fn validate(&self) -> InstrumentResult<()> {
        if self.min_key_length_bits == 0
            || self.min_key_length_bits % 8 != 0
            || self.max_key_length_bits % 8 != 0
            || self.min_key_length_bits > self.max_key_length_bits
        {
            return Err(InstrumentError::Config(format!(
                "key length bounds must be positive multiples of 8 with min <= max, got {}..={}",
                self.min_key_length_bits, self.max_key_length_bits
            )));
        }
        if self.default_key_length_bits % 8 != 0
            || !(self.min_key_length_bits..=self.max_key_length_bits)
                .contains(&self.default_key_length_bits)
        {
            return Err(InstrumentError::Config(format!(
                "default_key_length_bits must be a multiple of 8 within bounds, got {}",
                self.default_key_length_bits
            )));
        }
        if self.max_image_pixels == 0 {
            return Err(InstrumentError::Config(
                "max_image_pixels must be > 0".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(InstrumentError::Config(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if self.default_iterations == 0 || self.default_iterations > self.max_iterations {
            return Err(InstrumentError::Config(format!(
                "default_iterations must be in 1..={}, got {}",
                self.max_iterations, self.default_iterations
            )));
        }
        Ok(())
    }
}

/// Runtime configuration for the Instrumentation Kernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default)]
    pub scoring: ScoringTable,
    #[serde(default)]
    pub binding: BindingConfig,
}

impl InstrumentConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> InstrumentResult<()> {
        self.scoring.validate()?;
        self.binding.validate()
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| InstrumentError::Config(format!("JSON parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        InstrumentConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((DimensionWeights::default().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_modified_table_must_bump_version() {
        let mut table = ScoringTable::default();
        table.weights.novelty = 0.25;
        table.weights.density = 0.25;
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains(SCORING_TABLE_VERSION));

        table.version = "atomic-score/2-experimental".into();
        table.validate().unwrap();
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut table = ScoringTable::default();
        table.version = "custom".into();
        table.weights.novelty = 0.9;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut table = ScoringTable::default();
        table.version = "custom".into();
        table.weights.novelty = -0.1;
        table.weights.density = 0.6;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_duplicate_adjustment_rejected() {
        let mut table = ScoringTable::default();
        table.version = "custom".into();
        table.adjustments.push(ToggleAdjustment {
            toggle: Toggle::Edge,
            dimension: Dimension::Alignment,
            factor: 1.2,
        });
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_band_order_enforced() {
        let mut table = ScoringTable::default();
        table.version = "custom".into();
        table.precision.stable = 60.0;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_bubble_classification() {
        let bands = PrecisionBands::default();
        assert_eq!(bands.classify(100.0), BubbleClass::Tight);
        assert_eq!(bands.classify(50.0), BubbleClass::Tight);
        assert_eq!(bands.classify(49.9), BubbleClass::Stable);
        assert_eq!(bands.classify(8.0), BubbleClass::Diffuse);
        assert_eq!(bands.classify(0.0), BubbleClass::Scattered);
    }

    #[test]
    fn test_tier_lookup() {
        let table = ScoringTable::default();
        assert_eq!(table.tier(BubbleClass::Tight, 0.9), Tier::Platinum);
        assert_eq!(table.tier(BubbleClass::Tight, 0.1), Tier::Bronze);
        assert_eq!(table.tier(BubbleClass::Scattered, 0.95), Tier::Bronze);
        assert_eq!(table.tier(BubbleClass::Diffuse, 0.5), Tier::Bronze);
    }

    #[test]
    fn test_binding_iterations_cap() {
        let config = BindingConfig {
            default_iterations: 2_000_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_binding_key_bounds() {
        let config = BindingConfig {
            default_key_length_bits: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_binding_pixel_limit_positive() {
        let config = BindingConfig {
            max_image_pixels: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(InstrumentError::Config(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            InstrumentConfig::from_json(r#"{"binding":{"default_channels":"grayscale","default_key_length_bits":128,"default_iterations":500,"max_iterations":5000,"min_key_length_bits":128,"max_key_length_bits":256}}"#)
                .unwrap();
        assert_eq!(config.binding.default_channels, Channels::Grayscale);
        assert_eq!(config.scoring, ScoringTable::default());
        assert_eq!(config.binding.max_image_pixels, 40_000_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            InstrumentConfig::from_json("{not json"),
            Err(InstrumentError::Config(_))
        ));
    }

    #[test]
    fn test_table_json_roundtrip_preserves_equality() {
        let table = ScoringTable::default();
        let json = serde_json::to_string(&table).unwrap();
        let back: ScoringTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        back.validate().unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Atomic Score Engine
// ─────────────────────────────────────────────────────────────────────
//! Deterministic four-dimension scoring.
//!
//! Pipeline, per input:
//! 1. Clamp each dimension to [0, 1]; every correction lands in the trace.
//! 2. Resolve weights: table base weights, then recognized bridge overrides.
//! 3. Apply toggle factors from the adjustment table to their dimension.
//! 4. `final = clamp(Σ value·weight·adjustment)`.
//! 5. Classify precision from the dispersion of the *raw* inputs.
//!
//! The engine holds only an immutable [`ScoringTable`]; identical inputs
//! always produce bit-identical [`AtomicScore`]s.

use instrument_types::score::{
    clamp_score, ClampEvent, ClampReason, OverrideOutcome, PrecisionClassification, TraceTerm,
    WeightOverride,
};
use instrument_types::measurement::PrecisionSummary;
use instrument_types::{
    AtomicScore, BridgeSpec, Dimension, InstrumentResult, RawValue, ScoreInput, ScoreReceipt,
    ScoreTrace, ScoringTable,
};

use crate::digest;

/// Stateless scorer over a validated scoring table.
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    table: ScoringTable,
}

impl ScoreEngine {
    pub fn new(table: ScoringTable) -> InstrumentResult<Self> {
        table.validate()?;
        Ok(Self { table })
    }

    /// Read-only access to the scoring table.
    pub fn table(&self) -> &ScoringTable {
        &self.table
    }

    /// Score one input. Total: never fails, whatever the dimension values.
    pub fn compute_score(&self, input: &ScoreInput) -> AtomicScore {
        let raw = input.dimensions();

        let mut clamps = Vec::new();
        let mut values = [0.0; 4];
        for (i, dimension) in Dimension::ALL.into_iter().enumerate() {
            let (value, reason) = clamp_dimension(raw[i]);
            if let Some(reason) = reason {
                log::debug!("{dimension} clamped: {} -> {value}", raw[i]);
                clamps.push(ClampEvent {
                    dimension,
                    raw: RawValue::from(raw[i]),
                    clamped: value,
                    reason,
                });
            }
            values[i] = value;
        }

        let (weights, overrides) = self.resolve_weights(input.bridge_spec());

        let toggles = input.toggles();
        let mut terms = Vec::with_capacity(Dimension::ALL.len());
        for (i, dimension) in Dimension::ALL.into_iter().enumerate() {
            let mut adjustment = 1.0;
            let mut applied = Vec::new();
            for adj in &self.table.adjustments {
                if adj.dimension == dimension && toggles.is_set(adj.toggle) {
                    adjustment *= adj.factor;
                    applied.push(adj.toggle);
                }
            }
            terms.push(TraceTerm {
                dimension,
                value: values[i],
                weight: weights[i],
                adjustment,
                toggles: applied,
                contribution: values[i] * weights[i] * adjustment,
            });
        }

        let weight_sum: f64 = weights.iter().sum();
        let raw_total: f64 = terms.iter().map(|t| t.contribution).sum();
        let final_score = clamp_score(raw_total, 0.0, 1.0);
        let precision = self.classify(&raw, final_score);

        log::debug!(
            "atomic score: final={final_score:.4} n_hat={:.2} class={} tier={}",
            precision.n_hat,
            precision.bubble_class.as_str(),
            precision.tier.as_str()
        );

        AtomicScore {
            final_score,
            trace: ScoreTrace {
                version: self.table.version.clone(),
                clamps,
                terms,
                overrides,
                bridge_spec: input.bridge_spec().map(|s| s.as_value().clone()),
                weight_sum,
                raw_total,
                final_clamped: final_score != raw_total,
                precision,
            },
            toggles,
        }
    }

    /// Score and attach the integrity digest of the resulting atomic score.
    pub fn issue(&self, input: &ScoreInput) -> InstrumentResult<ScoreReceipt> {
        let score = self.compute_score(input);
        let integrity_hash = digest::digest(&score)?;
        let p = score.precision();
        let precision = Some(PrecisionSummary {
            n_hat: p.n_hat,
            bubble_class: p.bubble_class,
            tier: p.tier,
        });
        Ok(ScoreReceipt {
            final_score: score.final_score,
            trace: score.trace,
            integrity_hash,
            precision,
        })
    }

    /// Base weights with recognized bridge overrides applied.
    ///
    /// Overrides replace individual weights only; the set of dimensions is
    /// fixed. Every attempt is recorded, applied or not.
    fn resolve_weights(&self, bridge: Option<&BridgeSpec>) -> ([f64; 4], Vec<WeightOverride>) {
        let mut weights = Dimension::ALL.map(|d| self.table.weights.get(d));
        let mut overrides = Vec::new();

        let Some(bridge) = bridge else {
            return (weights, overrides);
        };

        let entries = match bridge.weight_entries() {
            Ok(entries) => entries,
            Err(malformed) => {
                log::warn!("bridgeSpec.weights is not an object; ignoring overrides");
                overrides.push(WeightOverride {
                    key: "weights".to_string(),
                    requested: malformed.clone(),
                    base_weight: None,
                    applied_weight: None,
                    outcome: OverrideOutcome::MalformedSpec,
                });
                return (weights, overrides);
            }
        };

        for (key, requested) in entries {
            let Some(dimension) = Dimension::parse(key) else {
                overrides.push(WeightOverride {
                    key: key.to_string(),
                    requested: requested.clone(),
                    base_weight: None,
                    applied_weight: None,
                    outcome: OverrideOutcome::UnknownDimension,
                });
                continue;
            };
            let idx = dimension.index();
            let base = weights[idx];
            match requested.as_f64() {
                Some(w) if w.is_finite() && (0.0..=1.0).contains(&w) => {
                    weights[idx] = w;
                    overrides.push(WeightOverride {
                        key: key.to_string(),
                        requested: requested.clone(),
                        base_weight: Some(base),
                        applied_weight: Some(w),
                        outcome: OverrideOutcome::Applied,
                    });
                }
                _ => overrides.push(WeightOverride {
                    key: key.to_string(),
                    requested: requested.clone(),
                    base_weight: Some(base),
                    applied_weight: None,
                    outcome: OverrideOutcome::InvalidValue,
                }),
            }
        }

        (weights, overrides)
    }

    /// Precision triple from raw dimension dispersion and the final score.
    fn classify(&self, raw: &[f64; 4], final_score: f64) -> PrecisionClassification {
        let bands = &self.table.precision;
        let dispersion = population_std_dev(raw);
        let n_hat = match dispersion {
            Some(sigma) => {
                let n = 1.0 / (sigma * sigma + 1.0 / bands.n_hat_ceiling);
                if n.is_finite() {
                    n
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        let bubble_class = bands.classify(n_hat);
        PrecisionClassification {
            n_hat,
            bubble_class,
            tier: self.table.tier(bubble_class, final_score),
            dispersion,
        }
    }
}

/// Score with the built-in table.
pub fn compute_score(input: &ScoreInput) -> AtomicScore {
    ScoreEngine::default().compute_score(input)
}

fn clamp_dimension(raw: f64) -> (f64, Option<ClampReason>) {
    let clamped = clamp_score(raw, 0.0, 1.0);
    let reason = if !raw.is_finite() {
        Some(ClampReason::NotFinite)
    } else if raw < 0.0 {
        Some(ClampReason::BelowRange)
    } else if raw > 1.0 {
        Some(ClampReason::AboveRange)
    } else {
        None
    };
    (clamped, reason)
}

/// `None` when any value (or the variance itself) is non-finite.
fn population_std_dev(values: &[f64; 4]) -> Option<f64> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if !mean.is_finite() {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if variance.is_finite() {
        Some(variance.sqrt())
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Measurements and Service Status
// ─────────────────────────────────────────────────────────────────────
//! Measurement issuance wraps a score with an id, an issue time and an
//! integrity digest. The clock is read here, never inside the engine;
//! `*_at` variants take the time explicitly.

use chrono::{DateTime, SecondsFormat, Utc};

use instrument_types::measurement::{Integrity, MeasuredScores};
use instrument_types::RawValue;
use instrument_types::{
    Capabilities, InstrumentResult, Measurement, MeasurementRequest, ServiceStatus, StatusReport,
};

use crate::digest;
use crate::scorer::ScoreEngine;

/// Length of a measurement id in hex characters.
pub const MEASUREMENT_ID_LEN: usize = 16;

/// Label reported by [`status`].
pub const OCTAVE: &str = "instrumentation-core";

/// Issue a measurement stamped with the current time.
pub fn measure(engine: &ScoreEngine, request: &MeasurementRequest) -> InstrumentResult<Measurement> {
    measure_at(engine, request, Utc::now())
}

/// Issue a measurement stamped with `now`.
pub fn measure_at(
    engine: &ScoreEngine,
    request: &MeasurementRequest,
    now: DateTime<Utc>,
) -> InstrumentResult<Measurement> {
    request.validate()?;

    let atomic_score = engine.compute_score(&request.score_input());
    let integrity_hash = digest::digest(&atomic_score)?;

    let seed = format!("{}-{}", request.submission_hash, now.timestamp_millis());
    let mut id = digest::digest_bytes(seed.as_bytes());
    id.truncate(MEASUREMENT_ID_LEN);

    let e = &request.evaluation;
    Ok(Measurement {
        id,
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        scores: MeasuredScores {
            novelty: RawValue::from(e.novelty),
            density: RawValue::from(e.density),
            coherence: RawValue::from(e.coherence),
            alignment: RawValue::from(e.alignment),
            final_score: atomic_score.final_score,
        },
        atomic_score,
        integrity: Integrity {
            hash: integrity_hash,
            verified: true,
        },
    })
}

/// Current service status.
pub fn status(engine: &ScoreEngine) -> StatusReport {
    status_at(engine, Utc::now())
}

pub fn status_at(engine: &ScoreEngine, now: DateTime<Utc>) -> StatusReport {
    StatusReport {
        status: ServiceStatus::Active,
        version: env!("CARGO_PKG_VERSION").to_string(),
        octave: OCTAVE.to_string(),
        scoring_table_version: engine.table().version.clone(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        capabilities: Capabilities {
            measurement: true,
            verification: true,
            state_image: true,
            scoring: true,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Data model, versioned scoring table, and error hierarchy for the
//! Instrumentation Kernel: deterministic scoring and state-image binding.

pub mod binding;
pub mod config;
pub mod error;
pub mod measurement;
pub mod score;
pub mod verify;

pub use binding::{
    BindOptions, BindRequestOptions, BindingVerification, Channels, CoreOutput, StateIdMode,
    StateImageBinding, StateImageRecord,
};
pub use config::{BindingConfig, InstrumentConfig, ScoringTable, SCORING_TABLE_VERSION};
pub use error::{ErrorKind, InstrumentError, InstrumentResult};
pub use measurement::{
    Capabilities, Measurement, MeasurementRequest, ScoreReceipt, ServiceStatus, StatusReport,
};
pub use score::{
    AtomicScore, BridgeSpec, BubbleClass, Dimension, NonFinite, PrecisionClassification,
    RawValue, ScoreInput, ScoreTrace, Tier, Toggle, Toggles,
};
pub use verify::{VerificationRequest, VerificationResponse, VerificationResult, VerificationStatus};

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Kernel Facade
// ─────────────────────────────────────────────────────────────────────
//! One validated configuration, every component built from it.
//!
//! `InstrumentKernel` holds no mutable state; wrap it in an `Arc` to
//! share across threads.

use std::sync::Arc;

use serde_json::Value;

use instrument_types::{
    AtomicScore, BindRequestOptions, CoreOutput, InstrumentConfig, InstrumentResult, Measurement,
    MeasurementRequest, ScoreInput, ScoreReceipt, StateImageBinding, StateImageRecord,
    StatusReport, VerificationResult,
};

use crate::measure;
use crate::scorer::ScoreEngine;
use crate::state_image::{NonceSource, StateImageBinder};
use crate::verify::VerificationService;

pub struct InstrumentKernel {
    config: InstrumentConfig,
    engine: ScoreEngine,
    binder: StateImageBinder,
    verifier: VerificationService,
}

impl InstrumentKernel {
    pub fn new(config: InstrumentConfig) -> InstrumentResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: ScoreEngine::new(config.scoring.clone())?,
            binder: StateImageBinder::new(config.binding.clone())?,
            verifier: VerificationService::new(),
            config,
        })
    }

    /// Kernel whose binder draws `stateId` nonces from `nonces`.
    pub fn with_nonce_source(
        config: InstrumentConfig,
        nonces: Arc<dyn NonceSource>,
    ) -> InstrumentResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: ScoreEngine::new(config.scoring.clone())?,
            binder: StateImageBinder::with_nonce_source(config.binding.clone(), nonces)?,
            verifier: VerificationService::new(),
            config,
        })
    }

    pub fn from_json(json: &str) -> InstrumentResult<Self> {
        Self::new(InstrumentConfig::from_json(json)?)
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    pub fn binder(&self) -> &StateImageBinder {
        &self.binder
    }

    pub fn compute_score(&self, input: &ScoreInput) -> AtomicScore {
        self.engine.compute_score(input)
    }

    pub fn score(&self, input: &ScoreInput) -> InstrumentResult<ScoreReceipt> {
        self.engine.issue(input)
    }

    pub fn measure(&self, request: &MeasurementRequest) -> InstrumentResult<Measurement> {
        measure::measure(&self.engine, request)
    }

    pub fn bind(
        &self,
        image: &[u8],
        core_output: &CoreOutput,
        options: &BindRequestOptions,
    ) -> InstrumentResult<StateImageRecord> {
        self.binder.bind_request(image, core_output, options)
    }

    pub fn bind_and_verify(
        &self,
        image: &[u8],
        core_output: &CoreOutput,
        options: &BindRequestOptions,
    ) -> InstrumentResult<StateImageBinding> {
        self.binder.bind_and_verify(image, core_output, options)
    }

    pub fn verify(
        &self,
        subject_id: &str,
        claimed_hash: &str,
        original_data: Option<&Value>,
    ) -> InstrumentResult<VerificationResult> {
        self.verifier.verify(subject_id, claimed_hash, original_data)
    }

    pub fn status(&self) -> StatusReport {
        measure::status(&self.engine)
    }
}

impl Default for InstrumentKernel {
    fn default() -> Self {
        Self {
            config: InstrumentConfig::default(),
            engine: ScoreEngine::default(),
            binder: StateImageBinder::default(),
            verifier: VerificationService::new(),
        }
    }
}

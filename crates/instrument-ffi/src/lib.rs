// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied — PyO3 proc macros generate
// unsafe blocks internally. All hand-written code in this crate is safe.
//! Python-callable wrappers around the Instrumentation Kernel.
//!
//! Exposes `InstrumentKernel`, `InstrumentConfig`, `AtomicScore` and
//! `StateImageRecord`, plus module-level `digest` helpers.
//!
//! # FFI Boundary
//!
//! - Structured payloads cross as JSON strings; results come back as
//!   typed wrappers or JSON strings with the kernel's field names.
//! - Caller errors raise `ValueError` with the error's public message.
//!   Internal faults raise `RuntimeError` with a fixed message.
//! - All config validated before storage (`InstrumentConfig::validate()`).
//!
//! Install: `pip install -e crates/instrument-ffi` (requires maturin).
//!
//! Usage from Python:
//! ```python
//! from instrument_kernel import InstrumentKernel
//!
//! kernel = InstrumentKernel()
//! score = kernel.compute_score(0.8, 0.6, 0.7, 0.9, seed=True)
//! record = kernel.bind_state_image(png_bytes, '{"submissionHash": "abc"}')
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::Serialize;
use serde_json::Value;

use instrument_core::{digest as hash_binder, InstrumentKernel, ScoreEngine};
use instrument_types::{
    AtomicScore, BindRequestOptions, BridgeSpec, CoreOutput, InstrumentConfig, InstrumentError,
    MeasurementRequest, ScoreInput, StateImageRecord, Toggles,
};

fn to_py_err(err: InstrumentError) -> PyErr {
    if err.is_caller_error() {
        PyValueError::new_err(err.public_message())
    } else {
        PyRuntimeError::new_err(err.public_message())
    }
}

fn parse_json(label: &str, json: &str) -> PyResult<Value> {
    serde_json::from_str(json).map_err(|e| PyValueError::new_err(format!("invalid {label}: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

fn build_input(
    novelty: f64,
    density: f64,
    coherence: f64,
    alignment: f64,
    toggles: Toggles,
    bridge_spec: Option<&str>,
) -> PyResult<ScoreInput> {
    let input = ScoreInput::new(novelty, density, coherence, alignment).with_toggles(toggles);
    Ok(match bridge_spec {
        Some(json) => input.with_bridge_spec(BridgeSpec::new(parse_json("bridge_spec", json)?)),
        None => input,
    })
}

// ─── PyInstrumentConfig ─────────────────────────────────────────────

/// Python-visible kernel configuration.
#[pyclass(name = "InstrumentConfig")]
#[derive(Clone)]
struct PyInstrumentConfig {
    inner: InstrumentConfig,
}

#[pymethods]
impl PyInstrumentConfig {
    #[new]
    #[pyo3(signature = (default_iterations = 10_000, default_key_length = 256))]
    fn new(default_iterations: u32, default_key_length: u32) -> PyResult<Self> {
        let mut config = InstrumentConfig::default();
        config.binding.default_iterations = default_iterations;
        config.binding.default_key_length_bits = default_key_length;
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    /// Construct from JSON string.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let config = InstrumentConfig::from_json(json).map_err(to_py_err)?;
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    fn to_json(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    #[getter]
    fn scoring_table_version(&self) -> &str {
        &self.inner.scoring.version
    }

    fn __repr__(&self) -> String {
        format!(
            "InstrumentConfig(table={}, iterations={}, key_length={})",
            self.inner.scoring.version,
            self.inner.binding.default_iterations,
            self.inner.binding.default_key_length_bits
        )
    }
}

// ─── PyAtomicScore ──────────────────────────────────────────────────

/// Python-visible atomic score with its trace.
#[pyclass(name = "AtomicScore")]
#[derive(Clone)]
struct PyAtomicScore {
    inner: AtomicScore,
}

#[pymethods]
impl PyAtomicScore {
    /// The `final` field; renamed because `final` reads poorly in Python.
    #[getter]
    fn final_score(&self) -> f64 {
        self.inner.final_score
    }

    #[getter]
    fn n_hat(&self) -> f64 {
        self.inner.precision().n_hat
    }

    #[getter]
    fn bubble_class(&self) -> &'static str {
        self.inner.precision().bubble_class.as_str()
    }

    #[getter]
    fn tier(&self) -> &'static str {
        self.inner.precision().tier.as_str()
    }

    #[getter]
    fn version(&self) -> &str {
        &self.inner.trace.version
    }

    #[getter]
    fn clamp_count(&self) -> usize {
        self.inner.trace.clamps.len()
    }

    /// Digest of the canonical score, as returned in score receipts.
    fn integrity_hash(&self) -> PyResult<String> {
        hash_binder::digest(&self.inner).map_err(to_py_err)
    }

    /// Full score and trace as JSON.
    fn to_json(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let precision = self.inner.precision();
        let dict = PyDict::new(py);
        dict.set_item("final", self.inner.final_score)?;
        dict.set_item("n_hat", precision.n_hat)?;
        dict.set_item("bubble_class", precision.bubble_class.as_str())?;
        dict.set_item("tier", precision.tier.as_str())?;
        dict.set_item("version", &self.inner.trace.version)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        let precision = self.inner.precision();
        format!(
            "AtomicScore(final={:.4}, n_hat={:.4}, bubble_class={}, tier={})",
            self.inner.final_score,
            precision.n_hat,
            precision.bubble_class.as_str(),
            precision.tier.as_str()
        )
    }
}

// ─── PyStateImageRecord ─────────────────────────────────────────────

/// Python-visible binding record. Carries digests only.
#[pyclass(name = "StateImageRecord")]
#[derive(Clone)]
struct PyStateImageRecord {
    inner: StateImageRecord,
}

#[pymethods]
impl PyStateImageRecord {
    #[getter]
    fn state_id(&self) -> &str {
        &self.inner.state_id
    }

    #[getter]
    fn state_hash(&self) -> &str {
        &self.inner.state_hash
    }

    #[getter]
    fn encryption_key_hash(&self) -> &str {
        &self.inner.encryption_key_hash
    }

    #[getter]
    fn core_output_hash(&self) -> &str {
        &self.inner.core_output_hash
    }

    #[getter]
    fn submission_hash(&self) -> &str {
        &self.inner.submission_hash
    }

    fn to_json(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("stateId", &self.inner.state_id)?;
        dict.set_item("stateHash", &self.inner.state_hash)?;
        dict.set_item("encryptionKeyHash", &self.inner.encryption_key_hash)?;
        dict.set_item("coreOutputHash", &self.inner.core_output_hash)?;
        dict.set_item("submissionHash", &self.inner.submission_hash)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "StateImageRecord(state_id={}, submission_hash={})",
            self.inner.state_id, self.inner.submission_hash
        )
    }
}

// ─── PyInstrumentKernel ─────────────────────────────────────────────

/// Scoring, binding and verification behind one validated config.
#[pyclass(name = "InstrumentKernel")]
struct PyInstrumentKernel {
    inner: InstrumentKernel,
}

#[pymethods]
impl PyInstrumentKernel {
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<PyInstrumentConfig>) -> PyResult<Self> {
        let config = config.map(|c| c.inner).unwrap_or_default();
        let inner = InstrumentKernel::new(config).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let inner = InstrumentKernel::from_json(json).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[pyo3(signature = (
        novelty,
        density,
        coherence,
        alignment,
        seed = false,
        edge = false,
        overlap = false,
        bridge_spec = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn compute_score(
        &self,
        novelty: f64,
        density: f64,
        coherence: f64,
        alignment: f64,
        seed: bool,
        edge: bool,
        overlap: bool,
        bridge_spec: Option<&str>,
    ) -> PyResult<PyAtomicScore> {
        let toggles = Toggles {
            seed,
            edge,
            overlap,
        };
        let input = build_input(novelty, density, coherence, alignment, toggles, bridge_spec)?;
        Ok(PyAtomicScore {
            inner: self.inner.compute_score(&input),
        })
    }

    /// Score a JSON `ScoreInput`; returns the receipt as JSON.
    fn score(&self, input_json: &str) -> PyResult<String> {
        let input = ScoreInput::from_json(input_json).map_err(to_py_err)?;
        to_json(&self.inner.score(&input).map_err(to_py_err)?)
    }

    /// Issue a measurement for a JSON request; returns JSON.
    fn measure(&self, request_json: &str) -> PyResult<String> {
        let request = MeasurementRequest::from_json(request_json).map_err(to_py_err)?;
        to_json(&self.inner.measure(&request).map_err(to_py_err)?)
    }

    /// Bind image bytes to a JSON core output.
    #[pyo3(signature = (image, core_output, options = None))]
    fn bind_state_image(
        &self,
        image: &[u8],
        core_output: &str,
        options: Option<&str>,
    ) -> PyResult<PyStateImageRecord> {
        let core_output = CoreOutput::from_json(core_output).map_err(to_py_err)?;
        let options = match options {
            Some(json) => BindRequestOptions::from_json(json).map_err(to_py_err)?,
            None => BindRequestOptions::default(),
        };
        let inner = self
            .inner
            .bind(image, &core_output, &options)
            .map_err(to_py_err)?;
        Ok(PyStateImageRecord { inner })
    }

    /// Bind and re-verify; returns `{stateImage, verification}` as JSON.
    #[pyo3(signature = (image, core_output, options = None))]
    fn bind_and_verify(
        &self,
        image: &[u8],
        core_output: &str,
        options: Option<&str>,
    ) -> PyResult<String> {
        let core_output = CoreOutput::from_json(core_output).map_err(to_py_err)?;
        let options = match options {
            Some(json) => BindRequestOptions::from_json(json).map_err(to_py_err)?,
            None => BindRequestOptions::default(),
        };
        to_json(
            &self
                .inner
                .bind_and_verify(image, &core_output, &options)
                .map_err(to_py_err)?,
        )
    }

    /// Verify `claimed_hash`, optionally against the original JSON data.
    #[pyo3(signature = (subject_id, claimed_hash, original_data = None))]
    fn verify<'py>(
        &self,
        py: Python<'py>,
        subject_id: &str,
        claimed_hash: &str,
        original_data: Option<&str>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let data = original_data
            .map(|json| parse_json("original_data", json))
            .transpose()?;
        let result = self
            .inner
            .verify(subject_id, claimed_hash, data.as_ref())
            .map_err(to_py_err)?;
        let dict = PyDict::new(py);
        dict.set_item("subject_id", &result.subject_id)?;
        dict.set_item("computed_hash", result.computed_hash.as_deref())?;
        dict.set_item("matches", result.matches)?;
        dict.set_item("verified", result.verified())?;
        dict.set_item("status", to_json(&result.status)?.trim_matches('"'))?;
        Ok(dict)
    }

    fn status(&self) -> PyResult<String> {
        to_json(&self.inner.status())
    }

    fn __repr__(&self) -> String {
        format!(
            "InstrumentKernel(table={})",
            self.inner.config().scoring.version
        )
    }
}

// ─── Module Functions ───────────────────────────────────────────────

/// Canonical digest of a JSON value (sorted keys, compact form).
#[pyfunction]
fn digest(json: &str) -> PyResult<String> {
    let value = parse_json("json", json)?;
    hash_binder::digest(&value).map_err(to_py_err)
}

/// SHA-256 hex digest of raw bytes.
#[pyfunction]
fn digest_bytes(data: &[u8]) -> String {
    hash_binder::digest_bytes(data)
}

/// Score with the default table.
#[pyfunction]
#[pyo3(signature = (
    novelty,
    density,
    coherence,
    alignment,
    seed = false,
    edge = false,
    overlap = false,
    bridge_spec = None,
))]
#[allow(clippy::too_many_arguments)]
fn compute_score(
    novelty: f64,
    density: f64,
    coherence: f64,
    alignment: f64,
    seed: bool,
    edge: bool,
    overlap: bool,
    bridge_spec: Option<&str>,
) -> PyResult<PyAtomicScore> {
    let toggles = Toggles {
        seed,
        edge,
        overlap,
    };
    let input = build_input(novelty, density, coherence, alignment, toggles, bridge_spec)?;
    Ok(PyAtomicScore {
        inner: ScoreEngine::default().compute_score(&input),
    })
}

// ─── Module Registration ────────────────────────────────────────────

/// Instrumentation Kernel: deterministic scoring and state-image binding.
///
/// - `InstrumentConfig` — configuration
/// - `InstrumentKernel` — scoring, measurement, binding, verification
/// - `AtomicScore` — score result with trace
/// - `StateImageRecord` — binding digests
/// - `digest`, `digest_bytes`, `compute_score` — stateless helpers
#[pymodule]
fn instrument_kernel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyInstrumentConfig>()?;
    m.add_class::<PyInstrumentKernel>()?;
    m.add_class::<PyAtomicScore>()?;
    m.add_class::<PyStateImageRecord>()?;
    m.add_function(wrap_pyfunction!(digest, m)?)?;
    m.add_function(wrap_pyfunction!(digest_bytes, m)?)?;
    m.add_function(wrap_pyfunction!(compute_score, m)?)?;
    log::debug!("instrument_kernel module initialised");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Deterministic scoring, canonical hashing, state-image binding and
//! verification for tamper-evident quality scores.
//!
//! # Invariants
//!
//! 1. **Scores are pure**: `ScoreEngine::compute_score` reads no clock,
//!    randomness or shared state. Identical inputs yield bit-identical
//!    `AtomicScore`s, trace included.
//!
//! 2. **One digest path**: every hash in the kernel goes through
//!    [`digest`]. Structured values are canonicalized (sorted keys,
//!    compact JSON) before SHA-256, so field order never changes a hash.
//!
//! 3. **Keys never leave the binder**: `StateImageBinder::bind` returns
//!    digests of the fingerprint and derived key, never the values.
//!
//! 4. **Comparisons are constant-time**: verification compares digests
//!    with `subtle`, so timing does not reveal the first differing byte.
//!
//! 5. **No hidden globals**: every component is an immutable value built
//!    from an explicit configuration and is `Send + Sync`.

pub mod digest;
pub mod kernel;
pub mod measure;
pub mod scorer;
pub mod state_image;
pub mod verify;

pub use kernel::InstrumentKernel;
pub use scorer::{compute_score, ScoreEngine};
pub use state_image::{NonceSource, OsNonce, SequenceNonce, StateImageBinder};
pub use verify::{constant_time_eq, VerificationService};

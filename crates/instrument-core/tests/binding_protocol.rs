// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — End-to-End Binding Protocol
// ─────────────────────────────────────────────────────────────────────

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

use instrument_core::{constant_time_eq, digest, InstrumentKernel, SequenceNonce};
use instrument_types::{
    BindRequestOptions, CoreOutput, InstrumentConfig, InstrumentError, ScoreInput,
    VerificationStatus,
};

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(16, 12, |x, y| Rgb([(x * 15) as u8, (y * 20) as u8, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn fast_options(channels: &str) -> BindRequestOptions {
    BindRequestOptions {
        channels: Some(channels.into()),
        iterations: Some(1000),
        ..Default::default()
    }
}

#[test]
fn score_bind_verify() {
    let kernel = InstrumentKernel::default();
    let score = kernel.compute_score(&ScoreInput::new(0.8, 0.6, 0.7, 0.9));
    let core_output = CoreOutput::from_score("sub-e2e", &score).unwrap();

    let binding = kernel
        .bind_and_verify(&encode(ImageFormat::Png), &core_output, &fast_options("rgb"))
        .unwrap();
    let record = &binding.state_image;
    assert_eq!(record.submission_hash, "sub-e2e");
    assert!(binding.verification.integrity_verified);

    for hash in [
        &record.state_id,
        &record.state_hash,
        &record.encryption_key_hash,
        &record.core_output_hash,
    ] {
        assert!(digest::is_well_formed(hash), "{hash}");
    }

    let result = kernel
        .verify(&record.state_id, &record.core_output_hash, Some(core_output.as_value()))
        .unwrap();
    assert!(result.verified());

    // A payload whose embedded score was edited no longer verifies.
    let mut tampered = core_output.as_value().clone();
    tampered["atomicScore"]["final"] = json!(0.99);
    let result = kernel
        .verify(&record.state_id, &record.core_output_hash, Some(&tampered))
        .unwrap();
    assert_eq!(result.status, VerificationStatus::Mismatch);
}

#[test]
fn grayscale_and_rgb_bind_differently() {
    let kernel = InstrumentKernel::default();
    let core_output = CoreOutput::new(json!({"submissionHash": "sub-gray"}));
    let img = encode(ImageFormat::Png);
    let rgb = kernel.bind(&img, &core_output, &fast_options("rgb")).unwrap();
    let gray = kernel.bind(&img, &core_output, &fast_options("grayscale")).unwrap();
    assert_ne!(rgb.state_hash, gray.state_hash);
    assert_ne!(rgb.encryption_key_hash, gray.encryption_key_hash);
    assert_eq!(rgb.core_output_hash, gray.core_output_hash);
}

#[test]
fn jpeg_artifacts_decode() {
    let kernel = InstrumentKernel::default();
    let core_output = CoreOutput::new(json!({"submissionHash": "sub-jpeg"}));
    let jpeg = encode(ImageFormat::Jpeg);
    let a = kernel.bind(&jpeg, &core_output, &fast_options("rgb")).unwrap();
    let b = kernel.bind(&jpeg, &core_output, &fast_options("rgb")).unwrap();
    assert_eq!(a.state_hash, b.state_hash);
}

#[test]
fn replayable_state_ids() {
    let run = || {
        let kernel = InstrumentKernel::with_nonce_source(
            InstrumentConfig::default(),
            Arc::new(SequenceNonce::starting_at(0)),
        )
        .unwrap();
        let core_output = CoreOutput::new(json!({"submissionHash": "sub-replay"}));
        kernel
            .bind(&encode(ImageFormat::Png), &core_output, &fast_options("rgb"))
            .unwrap()
            .state_id
    };
    assert_eq!(run(), run());
}

#[test]
fn rejections_surface_as_caller_errors() {
    let kernel = InstrumentKernel::default();
    let img = encode(ImageFormat::Png);

    let err = kernel
        .bind(&img, &CoreOutput::new(json!({})), &fast_options("rgb"))
        .unwrap_err();
    assert!(matches!(err, InstrumentError::MissingField(_)));
    assert!(err.is_caller_error());

    let err = kernel
        .bind(
            &img,
            &CoreOutput::new(json!({"submissionHash": "s"})),
            &BindRequestOptions {
                key_length: Some(100),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, InstrumentError::UnsupportedOption { .. }));

    let err = kernel
        .bind(b"GIF89a-truncated", &CoreOutput::new(json!({"submissionHash": "s"})), &fast_options("rgb"))
        .unwrap_err();
    assert!(matches!(err, InstrumentError::InvalidImage(_)));
    assert!(err.is_caller_error());
}

#[test]
#[ignore = "timing-sensitive; run manually on a quiet machine"]
fn constant_time_comparison_is_position_independent() {
    const ROUNDS: u32 = 200_000;
    let base = digest::digest_bytes(b"timing").into_bytes();
    let mut early = base.clone();
    early[0] ^= 0x01;
    let mut late = base.clone();
    late[63] ^= 0x01;

    let time = |other: &[u8]| {
        let start = Instant::now();
        for _ in 0..ROUNDS {
            std::hint::black_box(constant_time_eq(
                std::hint::black_box(base.as_slice()),
                std::hint::black_box(other),
            ));
        }
        start.elapsed().as_secs_f64()
    };

    let t_early = time(&early);
    let t_late = time(&late);
    let ratio = t_early.max(t_late) / t_early.min(t_late);
    assert!(ratio < 1.5, "early={t_early:.4}s late={t_late:.4}s");
}

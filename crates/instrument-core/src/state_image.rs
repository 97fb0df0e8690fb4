// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — State-Image Binder
// ─────────────────────────────────────────────────────────────────────
//! Binds an image artifact to a score payload.
//!
//! 1. Decode the image and extract a fingerprint from the selected
//!    channels (dimensions, per-channel sums, a 16-bin intensity
//!    histogram, and the digest of the pixel plane).
//! 2. Derive a key from the canonical fingerprint with
//!    PBKDF2-HMAC-SHA256 (`iterations` rounds, `keyLength` bits).
//! 3. Emit digests of the fingerprint, the key and the core output.
//!    Neither the key nor the fingerprint leaves this module.
//! 4. Derive `stateId` from the three digests, plus a fresh nonce in
//!    [`StateIdMode::Nonce`].

use std::io::Cursor;
use std::num::NonZeroU32;
use std::sync::Arc;

use image::{DynamicImage, ImageReader, Limits};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::pbkdf2;
use serde::Serialize;
use serde_json::json;

use instrument_types::{
    BindOptions, BindRequestOptions, BindingConfig, BindingVerification, Channels, CoreOutput,
    InstrumentError, InstrumentResult, StateIdMode, StateImageBinding, StateImageRecord,
};

use crate::digest;
use crate::verify::VerificationService;

/// Fixed salt; the fingerprint alone determines the key.
const KDF_SALT: &[u8] = b"instrument-kernel/state-image/kdf/v1";

const HISTOGRAM_BINS: usize = 16;

pub const NONCE_LEN: usize = 16;

/// Source of per-call nonces for `stateId` derivation.
pub trait NonceSource: Send + Sync {
    fn nonce(&self) -> InstrumentResult<[u8; NONCE_LEN]>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsNonce;

impl NonceSource for OsNonce {
    fn nonce(&self) -> InstrumentResult<[u8; NONCE_LEN]> {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| InstrumentError::internal(format!("nonce generation failed: {e}")))?;
        Ok(bytes)
    }
}

/// Counter-based nonces for replay harnesses and tests.
///
/// Distinct per call, reproducible across runs.
pub struct SequenceNonce {
    next: Mutex<u64>,
}

impl SequenceNonce {
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl NonceSource for SequenceNonce {
    fn nonce(&self) -> InstrumentResult<[u8; NONCE_LEN]> {
        let mut next = self.next.lock();
        let value = *next;
        *next = next.wrapping_add(1);
        let mut bytes = [0u8; NONCE_LEN];
        bytes[NONCE_LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Ok(bytes)
    }
}

/// Deterministic summary of an image's pixel data for one channel set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct StateFingerprint {
    width: u32,
    height: u32,
    channels: Channels,
    channel_sums: Vec<u64>,
    histogram: [u64; HISTOGRAM_BINS],
    plane_digest: String,
}

/// Upper bound on decoder bytes per pixel (four `f32` channels).
const MAX_BYTES_PER_PIXEL: u64 = 16;

/// Allocation headroom for decoder state independent of image size.
const DECODER_ALLOC_FLOOR: u64 = 16 * 1024 * 1024;

/// Decode `image`, rejecting anything above `max_pixels` before the pixel
/// buffer is allocated.
fn decode_bounded(image: &[u8], max_pixels: u64) -> InstrumentResult<DynamicImage> {
    let reader = || {
        ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| InstrumentError::InvalidImage(format!("cannot read image header: {e}")))
    };
    let (width, height) = reader()?
        .into_dimensions()
        .map_err(|e| InstrumentError::InvalidImage(format!("cannot decode pixel data: {e}")))?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(InstrumentError::InvalidImage(format!(
            "image is {width}x{height}, above the {max_pixels}-pixel limit"
        )));
    }

    let mut limits = Limits::default();
    limits.max_alloc = Some(
        max_pixels
            .saturating_mul(MAX_BYTES_PER_PIXEL)
            .max(DECODER_ALLOC_FLOOR),
    );
    let mut decoder = reader()?;
    decoder.limits(limits);
    decoder
        .decode()
        .map_err(|e| InstrumentError::InvalidImage(format!("cannot decode pixel data: {e}")))
}

fn extract_fingerprint(
    image: &[u8],
    channels: Channels,
    max_pixels: u64,
) -> InstrumentResult<StateFingerprint> {
    if image.is_empty() {
        return Err(InstrumentError::InvalidImage("empty image artifact".to_string()));
    }
    let decoded = decode_bounded(image, max_pixels)?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(InstrumentError::InvalidImage(format!(
            "image has no pixels ({width}x{height})"
        )));
    }

    let plane = match channels {
        Channels::Rgb => decoded.to_rgb8().into_raw(),
        Channels::Grayscale => decoded.to_luma8().into_raw(),
    };

    let n = channels.count();
    let mut channel_sums = vec![0u64; n];
    let mut histogram = [0u64; HISTOGRAM_BINS];
    for pixel in plane.chunks_exact(n) {
        let mut total = 0u32;
        for (sum, &value) in channel_sums.iter_mut().zip(pixel) {
            *sum += u64::from(value);
            total += u32::from(value);
        }
        let intensity = total / n as u32;
        histogram[(intensity >> 4) as usize] += 1;
    }

    Ok(StateFingerprint {
        width,
        height,
        channels,
        channel_sums,
        histogram,
        plane_digest: digest::digest_bytes(&plane),
    })
}

fn derive_key(material: &[u8], options: &BindOptions) -> InstrumentResult<Vec<u8>> {
    let iterations = NonZeroU32::new(options.iterations)
        .ok_or_else(|| InstrumentError::unsupported("iterations", options.iterations))?;
    let mut key = vec![0u8; options.key_length_bytes()];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        KDF_SALT,
        material,
        &mut key,
    );
    Ok(key)
}

/// Stateless binder; shareable across threads.
pub struct StateImageBinder {
    config: BindingConfig,
    nonces: Arc<dyn NonceSource>,
}

impl Default for StateImageBinder {
    fn default() -> Self {
        Self {
            config: BindingConfig::default(),
            nonces: Arc::new(OsNonce),
        }
    }
}

impl StateImageBinder {
    pub fn new(config: BindingConfig) -> InstrumentResult<Self> {
        Self::with_nonce_source(config, Arc::new(OsNonce))
    }

    pub fn with_nonce_source(
        config: BindingConfig,
        nonces: Arc<dyn NonceSource>,
    ) -> InstrumentResult<Self> {
        config.validate()?;
        Ok(Self { config, nonces })
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Bind `image` to `core_output`.
    ///
    /// Fails with `MissingField` when `submissionHash` is absent,
    /// `UnsupportedOption` when `options` fall outside the configured
    /// limits, and `InvalidImage` when the artifact does not decode or
    /// exceeds `max_image_pixels`.
    pub fn bind(
        &self,
        image: &[u8],
        core_output: &CoreOutput,
        options: &BindOptions,
    ) -> InstrumentResult<StateImageRecord> {
        let submission_hash = core_output.submission_hash()?.to_string();
        self.check_options(options)?;

        let fingerprint =
            extract_fingerprint(image, options.channels, self.config.max_image_pixels)?;
        let material = digest::canonical_bytes(&fingerprint)?;
        let key = derive_key(&material, options)?;

        let state_hash = digest::digest(&fingerprint)?;
        let encryption_key_hash = digest::digest_bytes(&key);
        let core_output_hash = digest::digest(core_output)?;

        let state_id = match options.state_id_mode {
            StateIdMode::Nonce => {
                let nonce = self.nonces.nonce()?;
                digest::digest(&json!({
                    "nonce": hex::encode(nonce),
                    "stateHash": state_hash,
                    "encryptionKeyHash": encryption_key_hash,
                    "coreOutputHash": core_output_hash,
                }))?
            }
            StateIdMode::Content => digest::digest(&json!({
                "stateHash": state_hash,
                "encryptionKeyHash": encryption_key_hash,
                "coreOutputHash": core_output_hash,
            }))?,
        };

        log::debug!(
            "bound state image {}x{} ({}) for submission {submission_hash}",
            fingerprint.width,
            fingerprint.height,
            options.channels
        );

        Ok(StateImageRecord {
            state_id,
            state_hash,
            encryption_key_hash,
            core_output_hash,
            submission_hash,
        })
    }

    /// Resolve raw request options against the configured defaults, then bind.
    pub fn bind_request(
        &self,
        image: &[u8],
        core_output: &CoreOutput,
        options: &BindRequestOptions,
    ) -> InstrumentResult<StateImageRecord> {
        core_output.submission_hash()?;
        let resolved = options.resolve(&self.config)?;
        self.bind(image, core_output, &resolved)
    }

    /// Bind, then re-check `coreOutputHash` against the payload.
    pub fn bind_and_verify(
        &self,
        image: &[u8],
        core_output: &CoreOutput,
        options: &BindRequestOptions,
    ) -> InstrumentResult<StateImageBinding> {
        let record = self.bind_request(image, core_output, options)?;
        let check = VerificationService.verify(
            &record.state_id,
            &record.core_output_hash,
            Some(core_output.as_value()),
        )?;
        if !check.verified() {
            return Err(InstrumentError::internal(
                "core output hash did not re-verify after binding",
            ));
        }
        Ok(StateImageBinding {
            state_image: record,
            verification: BindingVerification {
                integrity_verified: true,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        })
    }

    fn check_options(&self, options: &BindOptions) -> InstrumentResult<()> {
        let bits = options.key_length_bits;
        if bits % 8 != 0
            || !(self.config.min_key_length_bits..=self.config.max_key_length_bits).contains(&bits)
        {
            return Err(InstrumentError::unsupported("keyLength", bits));
        }
        if options.iterations == 0 || options.iterations > self.config.max_iterations {
            return Err(InstrumentError::unsupported("iterations", options.iterations));
        }
        Ok(())
    }
}

//! Voice signature matcher.
//!
//! A best-effort local gate, not a biometric security boundary: enrollment
//! stores one unit-length signature on the profile, verification captures a
//! fresh one and compares the two by dot product.

mod capture;
mod features;

pub use capture::{
    capture_signature, AudioDevice, AudioStream, CaptureConfig, PcmDevice, DEFAULT_CAPTURE,
    DEFAULT_FFT_SIZE, DEFAULT_FRAME_INTERVAL,
};
pub use features::{
    FeatureExtractor, FeatureLayout, FeatureVector, Frame, DEFAULT_ENERGY_BUCKETS,
    DEFAULT_SPECTRAL_BINS,
};

use tracing::info;

use crate::error::VoiceError;
use crate::store::Store;

/// Dot product over the common prefix. Both inputs are unit vectors, so this
/// is their cosine similarity, in [-1, 1].
pub fn score(template: &FeatureVector, sample: &FeatureVector) -> f32 {
    template
        .as_slice()
        .iter()
        .zip(sample.as_slice())
        .map(|(a, b)| a * b)
        .sum()
}

pub fn passes(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Result of one verification attempt. Only the matcher can build one, which
/// is what makes it usable as proof for unlocking a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    score: f32,
    threshold: f32,
}

impl Verification {
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn accepted(&self) -> bool {
        passes(self.score, self.threshold)
    }
}

pub struct VoiceMatcher {
    capture: CaptureConfig,
    threshold: f32,
}

impl VoiceMatcher {
    pub fn new(capture: CaptureConfig, threshold: f32) -> Result<Self, VoiceError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(VoiceError::InvalidThreshold(threshold));
        }
        if capture.frame_interval.is_zero() {
            return Err(VoiceError::InvalidFrameInterval);
        }
        Ok(Self { capture, threshold })
    }

    pub fn capture_config(&self) -> &CaptureConfig {
        &self.capture
    }

    /// Capture a signature and store it, with the configured threshold, as
    /// the profile template. Creates the profile if it does not exist.
    pub async fn enroll(
        &self,
        store: &Store,
        device: &dyn AudioDevice,
    ) -> Result<FeatureVector, VoiceError> {
        let signature = capture_signature(device, &self.capture).await?;
        let mut profile = store.profiles().get_or_default().await?;
        profile.voice_template = Some(signature.clone());
        profile.threshold = self.threshold;
        store.profiles().save(&profile).await?;
        info!(len = signature.len(), threshold = self.threshold, "voice template enrolled");
        Ok(signature)
    }

    /// Score a fresh capture against the enrolled template. The threshold
    /// comes from the profile, as stored at enrollment.
    pub async fn verify(
        &self,
        store: &Store,
        device: &dyn AudioDevice,
    ) -> Result<Verification, VoiceError> {
        let profile = store.profiles().get().await?;
        let (template, threshold) = match profile {
            Some(p) => match p.voice_template {
                Some(t) => (t, p.threshold),
                None => return Err(VoiceError::NoTemplate),
            },
            None => return Err(VoiceError::NoTemplate),
        };
        let sample = capture_signature(device, &self.capture).await?;
        let verification = Verification {
            score: score(&template, &sample),
            threshold,
        };
        info!(
            accepted = verification.accepted(),
            score = verification.score,
            "voice verification"
        );
        Ok(verification)
    }
}

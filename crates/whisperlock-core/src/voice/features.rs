//! Feature extraction for the voice gate.
//!
//! A signature is a spectral fingerprint (frame-averaged mean magnitude per
//! contiguous frequency bin) followed by an energy envelope (per-frame RMS,
//! block-averaged into a fixed number of buckets), scaled to unit length.
//! The layout fixes the vector length regardless of how many frames were
//! actually captured.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SPECTRAL_BINS: usize = 32;
pub const DEFAULT_ENERGY_BUCKETS: usize = 20;

/// Unit-length feature vector. Serialised as a plain array of floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Zero non-finite components and scale to unit L2 norm. An all-zero
    /// vector is left as is (the divisor falls back to 1).
    pub fn normalized(mut values: Vec<f32>) -> Self {
        for v in values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        let mut norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            norm = 1.0;
        }
        for v in values.iter_mut() {
            *v /= norm;
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub spectral_bins: usize,
    pub energy_buckets: usize,
}

impl FeatureLayout {
    pub fn len(&self) -> usize {
        self.spectral_bins + self.energy_buckets
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            spectral_bins: DEFAULT_SPECTRAL_BINS,
            energy_buckets: DEFAULT_ENERGY_BUCKETS,
        }
    }
}

/// One sampling tick: a linear magnitude spectrum and the matching
/// time-domain waveform.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub spectrum: Vec<f32>,
    pub waveform: Vec<f32>,
}

/// Accumulates frames and produces the final signature.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    layout: FeatureLayout,
    spectral: Vec<f32>,
    energy: Vec<f32>,
    frames: usize,
}

impl FeatureExtractor {
    pub fn new(layout: FeatureLayout) -> Self {
        Self {
            layout,
            spectral: vec![0.0; layout.spectral_bins],
            energy: Vec::new(),
            frames: 0,
        }
    }

    pub fn push_frame(&mut self, frame: &Frame) {
        let len = frame.spectrum.len();
        let step = len / self.layout.spectral_bins.max(1);
        for (b, acc) in self.spectral.iter_mut().enumerate() {
            let (from, to) = span(b, self.layout.spectral_bins, step, len);
            let sum: f32 = frame.spectrum.get(from..to).map_or(0.0, |s| s.iter().sum());
            *acc += sum / to.saturating_sub(from).max(1) as f32;
        }
        self.energy.push(rms(&frame.waveform));
        self.frames += 1;
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn finish(self) -> FeatureVector {
        let frames = self.frames.max(1) as f32;
        let mut values: Vec<f32> = self.spectral.iter().map(|v| v / frames).collect();
        values.extend(energy_buckets(&self.energy, self.layout.energy_buckets));
        FeatureVector::normalized(values)
    }
}

/// Bounds of bin `index` out of `count` bins of width `step` over `len`
/// values. The final bin absorbs whatever the uneven division leaves over.
fn span(index: usize, count: usize, step: usize, len: usize) -> (usize, usize) {
    let from = index * step;
    let to = if index + 1 == count {
        len
    } else {
        (index + 1) * step
    };
    (from, to)
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Block-average a per-frame series into exactly `buckets` values.
fn energy_buckets(series: &[f32], buckets: usize) -> Vec<f32> {
    let chunk = (series.len() / buckets.max(1)).max(1);
    (0..buckets)
        .map(|i| {
            let (from, to) = span(i, buckets, chunk, series.len());
            let sum: f32 = (from..to).map(|k| series.get(k).copied().unwrap_or(0.0)).sum();
            sum / to.saturating_sub(from).max(1) as f32
        })
        .collect()
}

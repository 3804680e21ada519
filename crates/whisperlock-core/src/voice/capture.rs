//! Timed capture from an audio input.
//!
//! The capture loop is cooperative: it reads at most one frame per tick and
//! suspends in between until the duration window closes. The stream handle is
//! owned by the loop, so the input is released on every exit path when it
//! drops.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::features::{FeatureExtractor, FeatureLayout, FeatureVector, Frame};
use crate::error::VoiceError;

pub const DEFAULT_CAPTURE: Duration = Duration::from_millis(2000);
/// One display-refresh tick at 60 Hz.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// An open input. Dropping it releases the device.
pub trait AudioStream: Send {
    /// Next frame, or `None` when the source has nothing for this tick.
    fn read_frame(&mut self) -> Option<Frame>;
}

pub trait AudioDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioStream>, VoiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub duration: Duration,
    pub frame_interval: Duration,
    pub layout: FeatureLayout,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_CAPTURE,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            layout: FeatureLayout::default(),
        }
    }
}

impl CaptureConfig {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Capture for `config.duration` and reduce the frames to a signature.
pub async fn capture_signature(
    device: &dyn AudioDevice,
    config: &CaptureConfig,
) -> Result<FeatureVector, VoiceError> {
    if config.frame_interval.is_zero() {
        return Err(VoiceError::InvalidFrameInterval);
    }
    let mut stream = device.open()?;
    let mut extractor = FeatureExtractor::new(config.layout);
    let mut ticker = time::interval(config.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start = Instant::now();
    while start.elapsed() < config.duration {
        if let Some(frame) = stream.read_frame() {
            extractor.push_frame(&frame);
        }
        ticker.tick().await;
    }
    drop(stream);

    debug!(frames = extractor.frame_count(), "voice capture finished");
    Ok(extractor.finish())
}

/// Exclusive hold on a device; cleared when the stream drops.
struct Lease(Arc<AtomicBool>);

impl Lease {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Raw mono PCM input: little-endian `f32` samples read from a file or a
/// device node. Each frame consumes `fft_size` samples and derives the
/// magnitude spectrum with a forward FFT.
pub struct PcmDevice {
    path: PathBuf,
    fft_size: usize,
    in_use: Arc<AtomicBool>,
}

impl PcmDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fft_size: DEFAULT_FFT_SIZE,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

impl AudioDevice for PcmDevice {
    fn open(&self) -> Result<Box<dyn AudioStream>, VoiceError> {
        let lease = Lease::acquire(&self.in_use)
            .ok_or_else(|| VoiceError::MicUnavailable("input already in use".to_string()))?;
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => VoiceError::MicDenied,
            _ => VoiceError::MicUnavailable(format!("{}: {e}", self.path.display())),
        })?;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(self.fft_size);
        Ok(Box::new(PcmStream {
            reader: BufReader::new(file),
            fft,
            fft_size: self.fft_size,
            _lease: lease,
        }))
    }
}

struct PcmStream {
    reader: BufReader<File>,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    _lease: Lease,
}

impl AudioStream for PcmStream {
    fn read_frame(&mut self) -> Option<Frame> {
        let mut raw = vec![0u8; self.fft_size * 4];
        self.reader.read_exact(&mut raw).ok()?;
        let waveform: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Some(Frame {
            spectrum: magnitude_spectrum(self.fft.as_ref(), &waveform),
            waveform,
        })
    }
}

/// Linear magnitudes of the positive-frequency half, scaled by the FFT size.
fn magnitude_spectrum(fft: &dyn Fft<f32>, samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    let mut buf: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buf);
    buf.iter().take(n / 2).map(|c| c.norm() / n as f32).collect()
}

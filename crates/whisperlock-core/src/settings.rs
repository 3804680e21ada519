use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::DEFAULT_THRESHOLD;
use crate::paths::settings_path;
use crate::voice::{CaptureConfig, FeatureLayout, DEFAULT_ENERGY_BUCKETS, DEFAULT_SPECTRAL_BINS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_capture_ms")]
    pub capture_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_spectral_bins")]
    pub spectral_bins: usize,
    #[serde(default = "default_energy_buckets")]
    pub energy_buckets: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_retry_poll_secs")]
    pub retry_poll_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            capture_ms: default_capture_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            spectral_bins: default_spectral_bins(),
            energy_buckets: default_energy_buckets(),
            threshold: default_threshold(),
            retry_poll_secs: default_retry_poll_secs(),
        }
    }
}

impl Settings {
    /// Read `settings.json` from the data directory; a missing file yields
    /// the defaults.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = settings_path(data_dir);
        let settings = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, data_dir: &Path) -> anyhow::Result<()> {
        self.validate()?;
        crate::json_file::write_atomic(&settings_path(data_dir), self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold must be between 0 and 1");
        }
        if self.spectral_bins == 0 || self.energy_buckets == 0 {
            anyhow::bail!("spectral bins and energy buckets must be at least 1");
        }
        if self.capture_ms == 0 || self.frame_interval_ms == 0 {
            anyhow::bail!("capture duration and frame interval must be positive");
        }
        if self.server_url.trim().is_empty() {
            anyhow::bail!("server url must not be empty");
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            duration: Duration::from_millis(self.capture_ms),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            layout: FeatureLayout {
                spectral_bins: self.spectral_bins,
                energy_buckets: self.energy_buckets,
            },
        }
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.retry_poll_secs.max(1))
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_capture_ms() -> u64 {
    2000
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_spectral_bins() -> usize {
    DEFAULT_SPECTRAL_BINS
}
fn default_energy_buckets() -> usize {
    DEFAULT_ENERGY_BUCKETS
}
fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}
fn default_retry_poll_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.capture_config().layout.len(), 52);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            settings_path(dir.path()),
            r#"{"server_url":"http://vault.local:8080","threshold":0.8}"#,
        )
        .unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s.server_url, "http://vault.local:8080");
        assert_eq!(s.capture_ms, 2000);
        assert!((s.threshold - 0.8).abs() < 1e-6);
    }

    #[test]
    fn saved_settings_reload() {
        let dir = tempdir().unwrap();
        let s = Settings {
            retry_poll_secs: 5,
            ..Settings::default()
        };
        s.save(dir.path()).unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap(), s);
        assert_eq!(s.retry_poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let s = Settings {
            threshold: 1.5,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::fft::{MAX_FFT_SIZE, MIN_FFT_SIZE};
use crate::capture::CaptureConstraints;
use crate::platform::{AnalyserOptions, SyntheticConfig};
use crate::recording::{RecordingOptions, DEFAULT_MIME_PREFERENCES};
use crate::session::ControllerOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/mic-check";
pub const ENV_PREFIX: &str = "MIC_CHECK";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub recording: RecordingConfig,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mic-check".to_string(),
            log_level: "info".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Requested capture constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: Option<u32>,
    pub sample_size: Option<u16>,
    pub channel_count: Option<u16>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = CaptureConstraints::default();
        Self {
            echo_cancellation: defaults.echo_cancellation,
            noise_suppression: defaults.noise_suppression,
            auto_gain_control: defaults.auto_gain_control,
            sample_rate: defaults.sample_rate,
            sample_size: defaults.sample_size,
            channel_count: defaults.channel_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub bucket_count: usize,
    pub tick_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let analyser = AnalyserOptions::default();
        Self {
            fft_size: analyser.fft_size,
            smoothing: analyser.smoothing,
            bucket_count: crate::session::DEFAULT_BUCKET_COUNT,
            tick_interval_ms: crate::analysis::DEFAULT_TICK_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Chunk delivery interval
    pub timeslice_ms: u64,
    pub audio_bits_per_second: u32,
    pub mime_preferences: Vec<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: 1000,
            audio_bits_per_second: 128_000,
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load from `path` (any format the config crate knows, extension
    /// optional) layered under `MIC_CHECK__SECTION__KEY` variables.
    /// A missing file is not an error.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but the file must exist
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let path = path
            .to_str()
            .with_context(|| format!("Config path is not UTF-8: {}", path.display()))?;
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if !analysis.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&analysis.fft_size)
        {
            bail!(
                "analysis.fft_size must be a power of two in [{}, {}], got {}",
                MIN_FFT_SIZE,
                MAX_FFT_SIZE,
                analysis.fft_size
            );
        }
        if !(0.0..1.0).contains(&analysis.smoothing) {
            bail!("analysis.smoothing must be in [0, 1), got {}", analysis.smoothing);
        }
        if analysis.bucket_count == 0 || analysis.bucket_count > analysis.fft_size / 2 {
            bail!(
                "analysis.bucket_count must be in [1, {}], got {}",
                analysis.fft_size / 2,
                analysis.bucket_count
            );
        }
        if !(1..=1000).contains(&analysis.tick_interval_ms) {
            bail!(
                "analysis.tick_interval_ms must be in [1, 1000], got {}",
                analysis.tick_interval_ms
            );
        }

        if !(1..=1000).contains(&self.recording.timeslice_ms) {
            bail!(
                "recording.timeslice_ms must be in [1, 1000], got {}",
                self.recording.timeslice_ms
            );
        }
        if self.recording.audio_bits_per_second == 0 {
            bail!("recording.audio_bits_per_second must be positive");
        }

        if self.capture.channel_count == Some(0) || self.capture.sample_size == Some(0) {
            bail!("capture.channel_count and capture.sample_size must be at least 1");
        }

        let synthetic = &self.synthetic;
        if !(0.0..=1.0).contains(&synthetic.amplitude) {
            bail!("synthetic.amplitude must be in [0, 1], got {}", synthetic.amplitude);
        }
        if synthetic.tone_hz <= 0.0 || synthetic.tone_hz >= synthetic.sample_rate as f32 / 2.0 {
            bail!(
                "synthetic.tone_hz must be between 0 and half the sample rate, got {}",
                synthetic.tone_hz
            );
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            device_id: None,
            echo_cancellation: self.capture.echo_cancellation,
            noise_suppression: self.capture.noise_suppression,
            auto_gain_control: self.capture.auto_gain_control,
            sample_rate: self.capture.sample_rate,
            sample_size: self.capture.sample_size,
            channel_count: self.capture.channel_count,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            constraints: self.constraints(),
            analyser: AnalyserOptions {
                fft_size: self.analysis.fft_size,
                smoothing: self.analysis.smoothing,
            },
            bucket_count: self.analysis.bucket_count,
            tick_interval: Duration::from_millis(self.analysis.tick_interval_ms),
            recording: RecordingOptions {
                timeslice: Duration::from_millis(self.recording.timeslice_ms),
                audio_bits_per_second: self.recording.audio_bits_per_second,
                mime_preferences: self.recording.mime_preferences.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:3000");

        let options = cfg.controller_options();
        assert_eq!(options.recording.timeslice, Duration::from_millis(1000));
        assert_eq!(options.analyser.fft_size, 2048);
        assert_eq!(options.bucket_count, 32);
        assert_eq!(options.constraints.sample_rate, Some(48000));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.analysis.fft_size = 1000;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.recording.timeslice_ms = 5000;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.analysis.bucket_count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.synthetic.tone_hz = 30_000.0;
        assert!(cfg.validate().is_err());
    }
}

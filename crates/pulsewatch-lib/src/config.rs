use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Invalid monitor parameters. Raised once at startup, never from the tick loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0} Hz")]
    SampleRate(f64),
    #[error("band-pass lowcut {lowcut_hz} Hz must be positive and below highcut {highcut_hz} Hz")]
    CutoffOrder { lowcut_hz: f64, highcut_hz: f64 },
    #[error("{name} of {value_hz} Hz is not below the Nyquist frequency {nyquist_hz} Hz")]
    AboveNyquist {
        name: &'static str,
        value_hz: f64,
        nyquist_hz: f64,
    },
    #[error("filter order must be at least 1, got {0}")]
    Order(usize),
    #[error("notch quality factor must be positive, got {0}")]
    NotchQ(f64),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Full configuration surface of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Nominal sampling rate of the device (Hz)
    pub sample_rate_hz: f64,
    pub buffer: BufferConfig,
    pub filter: FilterConfig,
    pub quality: QualityConfig,
    pub detector: DetectorConfig,
    pub rhythm: RhythmConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 200.0,
            buffer: BufferConfig::default(),
            filter: FilterConfig::default(),
            quality: QualityConfig::default(),
            detector: DetectorConfig::default(),
            rhythm: RhythmConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn nyquist_hz(&self) -> f64 {
        0.5 * self.sample_rate_hz
    }

    /// Check every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::SampleRate(self.sample_rate_hz));
        }
        self.buffer.validate()?;
        self.filter.validate(self.sample_rate_hz)?;
        self.quality.validate()?;
        self.detector.validate()?;
        self.rhythm.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(text).context("parsing monitor config")?;
        config.validate()?;
        Ok(config)
    }
}

/// Read a TOML config from disk and validate it.
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    MonitorConfig::from_toml_str(&contents)
        .with_context(|| format!("loading config {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Rolling window capacity in samples.
    pub window_samples: usize,
    /// Below this many samples only raw passthrough is produced.
    pub min_analysis_samples: usize,
    /// Clean samples required after a degraded stretch before detection resumes.
    pub recovery_settle_samples: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_samples: 1500,
            min_analysis_samples: 100,
            recovery_settle_samples: 400,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_samples < 2 {
            return Err(invalid("buffer.window_samples", "must be at least 2"));
        }
        if self.min_analysis_samples < 2 || self.min_analysis_samples > self.window_samples {
            return Err(invalid(
                "buffer.min_analysis_samples",
                format!("must lie in [2, {}]", self.window_samples),
            ));
        }
        if self.recovery_settle_samples < self.min_analysis_samples
            || self.recovery_settle_samples > self.window_samples
        {
            return Err(invalid(
                "buffer.recovery_settle_samples",
                format!(
                    "must lie in [{}, {}]",
                    self.min_analysis_samples, self.window_samples
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub lowcut_hz: f64,
    pub highcut_hz: f64,
    /// Butterworth prototype order; the band-pass has `2 * order` poles.
    pub order: usize,
    /// Mains frequency to notch out (e.g. 50 or 60 Hz); `None` disables the notch.
    pub notch_hz: Option<f64>,
    pub notch_q: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 0.5,
            highcut_hz: 25.0,
            order: 4,
            notch_hz: None,
            notch_q: 30.0,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self, sample_rate_hz: f64) -> Result<(), ConfigError> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(ConfigError::SampleRate(sample_rate_hz));
        }
        let nyquist_hz = 0.5 * sample_rate_hz;
        if self.order < 1 {
            return Err(ConfigError::Order(self.order));
        }
        if !(self.lowcut_hz > 0.0 && self.lowcut_hz < self.highcut_hz) {
            return Err(ConfigError::CutoffOrder {
                lowcut_hz: self.lowcut_hz,
                highcut_hz: self.highcut_hz,
            });
        }
        if self.highcut_hz >= nyquist_hz {
            return Err(ConfigError::AboveNyquist {
                name: "highcut",
                value_hz: self.highcut_hz,
                nyquist_hz,
            });
        }
        if let Some(notch_hz) = self.notch_hz {
            if !(notch_hz > 0.0) {
                return Err(invalid("filter.notch_hz", "must be positive"));
            }
            if notch_hz >= nyquist_hz {
                return Err(ConfigError::AboveNyquist {
                    name: "notch",
                    value_hz: notch_hz,
                    nyquist_hz,
                });
            }
            if !(self.notch_q > 0.0 && self.notch_q.is_finite()) {
                return Err(ConfigError::NotchQ(self.notch_q));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Newest |raw| above this many counts means the amplifier is saturated.
    pub rail_threshold: u32,
    /// Standard deviation (counts) below which the recent signal counts as flat.
    pub flatline_std: f64,
    /// Number of newest samples inspected by the flatline test.
    pub flat_window: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            rail_threshold: 1000,
            flatline_std: 2.0,
            flat_window: 50,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.flatline_std.is_finite() && self.flatline_std >= 0.0) {
            return Err(invalid("quality.flatline_std", "must be finite and >= 0"));
        }
        if self.flat_window < 2 {
            return Err(invalid("quality.flat_window", "must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Fraction of the adaptive ceiling used as the beat threshold.
    pub threshold_fraction: f64,
    /// Percentile of the filtered window used as the adaptive ceiling.
    pub ceiling_percentile: f64,
    /// Minimum time between beat candidates (seconds).
    pub refractory_s: f64,
    /// Plausible instantaneous heart-rate band (exclusive bounds).
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Without an accepted beat for this long the BPM reading goes stale.
    pub stale_timeout_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_fraction: 0.65,
            ceiling_percentile: 95.0,
            refractory_s: 0.4,
            min_bpm: 30.0,
            max_bpm: 200.0,
            stale_timeout_s: 4.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold_fraction > 0.0 && self.threshold_fraction <= 1.0) {
            return Err(invalid("detector.threshold_fraction", "must lie in (0, 1]"));
        }
        if !(self.ceiling_percentile > 0.0 && self.ceiling_percentile <= 100.0) {
            return Err(invalid("detector.ceiling_percentile", "must lie in (0, 100]"));
        }
        if !(self.refractory_s > 0.0 && self.refractory_s.is_finite()) {
            return Err(invalid("detector.refractory_s", "must be positive"));
        }
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(invalid(
                "detector.min_bpm",
                format!("need 0 < min_bpm < max_bpm ({})", self.max_bpm),
            ));
        }
        if !(self.stale_timeout_s > 0.0) {
            return Err(invalid("detector.stale_timeout_s", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    pub bpm_history_len: usize,
    /// While the BPM history is shorter than this, every beat is accepted.
    pub bpm_bootstrap: usize,
    /// Maximum deviation (BPM) from the running median for a beat to enter the history.
    pub bpm_tolerance: f64,
    pub rr_history_len: usize,
    /// Interval below `premature_ratio * mean(RR)` flags a premature beat.
    pub premature_ratio: f64,
    /// SDNN is reported once the RR history holds more than this many intervals.
    pub hrv_min_intervals: usize,
    pub poincare_len: usize,
    /// Alert emphasis lost per tick after a premature beat.
    pub alert_decay_per_tick: f64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            bpm_history_len: 10,
            bpm_bootstrap: 5,
            bpm_tolerance: 30.0,
            rr_history_len: 30,
            premature_ratio: 0.8,
            hrv_min_intervals: 10,
            poincare_len: 30,
            alert_decay_per_tick: 0.05,
        }
    }
}

impl RhythmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bpm_history_len < 1 {
            return Err(invalid("rhythm.bpm_history_len", "must be at least 1"));
        }
        if self.bpm_bootstrap < 1 || self.bpm_bootstrap > self.bpm_history_len {
            return Err(invalid(
                "rhythm.bpm_bootstrap",
                format!("must lie in [1, {}]", self.bpm_history_len),
            ));
        }
        if !(self.bpm_tolerance > 0.0) {
            return Err(invalid("rhythm.bpm_tolerance", "must be positive"));
        }
        if self.rr_history_len < 2 {
            return Err(invalid("rhythm.rr_history_len", "must be at least 2"));
        }
        if !(self.premature_ratio > 0.0 && self.premature_ratio <= 1.0) {
            return Err(invalid("rhythm.premature_ratio", "must lie in (0, 1]"));
        }
        if self.hrv_min_intervals < 1 || self.hrv_min_intervals >= self.rr_history_len {
            return Err(invalid(
                "rhythm.hrv_min_intervals",
                format!("must lie in [1, {})", self.rr_history_len),
            ));
        }
        if self.poincare_len < 1 {
            return Err(invalid("rhythm.poincare_len", "must be at least 1"));
        }
        if !(self.alert_decay_per_tick > 0.0 && self.alert_decay_per_tick <= 1.0) {
            return Err(invalid("rhythm.alert_decay_per_tick", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

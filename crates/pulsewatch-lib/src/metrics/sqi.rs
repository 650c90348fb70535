use crate::{config::QualityConfig, signal::RawSample, stats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lead status derived from the newest raw samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityState {
    #[default]
    Ok,
    /// Amplifier saturated: newest |raw| above the rail threshold.
    Railed,
    /// Lead disconnected or shorted: recent variance collapsed.
    Flat,
}

impl QualityState {
    pub fn is_degraded(self) -> bool {
        !matches!(self, QualityState::Ok)
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityState::Ok => "OK",
            QualityState::Railed => "RAILED",
            QualityState::Flat => "FLAT",
        }
    }
}

impl fmt::Display for QualityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub state: QualityState,
    pub newest: i32,
    /// Population standard deviation of the flatline sub-window (counts).
    pub recent_std: f64,
}

/// Lead-off / saturation classifier run before any detection.
#[derive(Debug, Clone)]
pub struct SignalQualityGate {
    rail_threshold: u32,
    flatline_std: f64,
    flat_window: usize,
}

impl SignalQualityGate {
    pub fn new(cfg: &QualityConfig) -> Self {
        Self {
            rail_threshold: cfg.rail_threshold,
            flatline_std: cfg.flatline_std,
            flat_window: cfg.flat_window.max(1),
        }
    }

    pub fn assess(&self, window: &[RawSample]) -> QualityState {
        self.inspect(window).state
    }

    /// Classify `window`. RAILED takes precedence over FLAT; an empty window is FLAT.
    pub fn inspect(&self, window: &[RawSample]) -> QualityReport {
        let Some(newest) = window.last() else {
            return QualityReport {
                state: QualityState::Flat,
                newest: 0,
                recent_std: 0.0,
            };
        };
        let recent_std = recent_std_dev(window, self.flat_window);
        let state = if i64::from(newest.value).unsigned_abs() > u64::from(self.rail_threshold) {
            QualityState::Railed
        } else if recent_std < self.flatline_std {
            QualityState::Flat
        } else {
            QualityState::Ok
        };
        QualityReport {
            state,
            newest: newest.value,
            recent_std,
        }
    }
}

/// Standard deviation of the newest `n` raw values (fewer during warm-up).
pub fn recent_std_dev(window: &[RawSample], n: usize) -> f64 {
    let start = window.len().saturating_sub(n);
    let values: Vec<f64> = window[start..].iter().map(|s| s.value as f64).collect();
    stats::population_std_dev(&values).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SignalQualityGate {
        SignalQualityGate::new(&QualityConfig::default())
    }

    fn window(values: &[i32]) -> Vec<RawSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| RawSample::new(v, i as f64 * 0.005))
            .collect()
    }

    fn noisy(n: usize) -> Vec<i32> {
        (0..n).map(|i| 500 + ((i * 37) % 41) as i32 - 20).collect()
    }

    #[test]
    fn constant_window_is_flat() {
        for level in [0, 300, -512, 999] {
            assert_eq!(gate().assess(&window(&[level; 200])), QualityState::Flat);
        }
    }

    #[test]
    fn large_newest_sample_is_railed_regardless_of_history() {
        let mut values = noisy(200);
        values.push(1_000_000);
        assert_eq!(gate().assess(&window(&values)), QualityState::Railed);

        let mut flat = vec![0; 200];
        flat.push(-1_000_000);
        assert_eq!(gate().assess(&window(&flat)), QualityState::Railed);

        assert_eq!(gate().assess(&window(&[i32::MIN])), QualityState::Railed);
    }

    #[test]
    fn varied_signal_is_ok() {
        let report = gate().inspect(&window(&noisy(200)));
        assert_eq!(report.state, QualityState::Ok);
        assert!(report.recent_std > 2.0);
    }

    #[test]
    fn flatline_only_looks_at_recent_samples() {
        let mut values = noisy(200);
        values.extend(std::iter::repeat(480).take(60));
        assert_eq!(gate().assess(&window(&values)), QualityState::Flat);
    }

    #[test]
    fn empty_window_is_flat() {
        assert_eq!(gate().assess(&[]), QualityState::Flat);
    }

    #[test]
    fn degraded_states() {
        assert!(!QualityState::Ok.is_degraded());
        assert!(QualityState::Railed.is_degraded());
        assert!(QualityState::Flat.is_degraded());
        assert_eq!(QualityState::Railed.to_string(), "RAILED");
    }
}

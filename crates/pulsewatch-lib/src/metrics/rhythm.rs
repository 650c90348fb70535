use crate::{
    buffer::BoundedHistory,
    config::RhythmConfig,
    detectors::ecg::BeatCandidate,
    metrics::hrv::{hrv_summary, HrvSummary},
    signal::{PoincarePair, RRSeries},
    stats,
};
use serde::{Deserialize, Serialize};

/// An accepted beat, immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// Detection time (seconds, monitor clock)
    pub t: f64,
    pub instant_bpm: f64,
    /// Seconds since the previous beat candidate
    pub interval_s: f64,
    pub premature: bool,
    /// Whether the instantaneous rate entered the smoothing history.
    pub smoothed: bool,
}

/// Beat-interval bookkeeping: BPM smoothing, RR history, SDNN and Poincaré pairs.
#[derive(Debug, Clone)]
pub struct RhythmAnalyzer {
    cfg: RhythmConfig,
    bpm_history: BoundedHistory<f64>,
    rr_history: BoundedHistory<f64>,
    pairs: BoundedHistory<PoincarePair>,
}

impl RhythmAnalyzer {
    pub fn new(cfg: &RhythmConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            bpm_history: BoundedHistory::new(cfg.bpm_history_len),
            rr_history: BoundedHistory::new(cfg.rr_history_len),
            pairs: BoundedHistory::new(cfg.poincare_len),
        }
    }

    /// Fold one accepted beat candidate into the histories.
    pub fn on_beat(&mut self, candidate: &BeatCandidate) -> BeatEvent {
        let interval = candidate.interval_s;
        let premature = self.is_premature(interval);

        let previous = self.rr_history.last().copied();
        self.rr_history.push(interval);
        if let Some(prev) = previous {
            self.pairs.push(PoincarePair {
                prev,
                next: interval,
            });
        }

        let smoothed = self.accepts_bpm(candidate.instant_bpm);
        if smoothed {
            self.bpm_history.push(candidate.instant_bpm);
        }

        BeatEvent {
            t: candidate.t,
            instant_bpm: candidate.instant_bpm,
            interval_s: interval,
            premature,
            smoothed,
        }
    }

    /// Interval shorter than `premature_ratio` times the mean of the RR history so far.
    pub fn is_premature(&self, interval_s: f64) -> bool {
        let history = self.rr_history.to_vec();
        match stats::mean(&history) {
            Some(mean) => interval_s < self.cfg.premature_ratio * mean,
            None => false,
        }
    }

    fn accepts_bpm(&self, bpm: f64) -> bool {
        if self.bpm_history.len() < self.cfg.bpm_bootstrap {
            return true;
        }
        let history = self.bpm_history.to_vec();
        match stats::median(&history) {
            Some(median) => (bpm - median).abs() < self.cfg.bpm_tolerance,
            None => true,
        }
    }

    /// Median of the BPM history once it holds `bpm_bootstrap` entries.
    pub fn reported_bpm(&self) -> Option<f64> {
        if self.bpm_history.len() < self.cfg.bpm_bootstrap {
            return None;
        }
        stats::median(&self.bpm_history.to_vec())
    }

    /// SDNN in milliseconds once the RR history holds more than `hrv_min_intervals`.
    pub fn sdnn_ms(&self) -> Option<f64> {
        if self.rr_history.len() <= self.cfg.hrv_min_intervals {
            return None;
        }
        stats::sample_std_dev(&self.rr_history.to_vec()).map(|sd| sd * 1000.0)
    }

    /// Full time-domain and Poincaré summary, gated like [`Self::sdnn_ms`].
    pub fn hrv(&self) -> Option<HrvSummary> {
        if self.rr_history.len() <= self.cfg.hrv_min_intervals {
            return None;
        }
        Some(hrv_summary(&self.rr_series(), &self.pairs.to_vec()))
    }

    /// Drop smoothed BPM values so a stale rate cannot resume after lead-off.
    pub fn clear_bpm_history(&mut self) {
        self.bpm_history.clear();
    }

    pub fn bpm_history(&self) -> Vec<f64> {
        self.bpm_history.to_vec()
    }

    pub fn rr_series(&self) -> RRSeries {
        RRSeries {
            rr: self.rr_history.to_vec(),
        }
    }

    pub fn poincare_pairs(&self) -> Vec<PoincarePair> {
        self.pairs.to_vec()
    }
}

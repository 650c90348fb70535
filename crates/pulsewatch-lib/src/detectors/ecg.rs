use crate::{config::DetectorConfig, stats};
use log::debug;
use serde::{Deserialize, Serialize};

/// A threshold crossing that survived refractory gating and the plausibility band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatCandidate {
    pub t: f64,
    pub interval_s: f64,
    pub instant_bpm: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    #[default]
    AwaitingBeat,
    Refractory,
}

/// Adaptive-threshold R-peak detector working on the newest filtered sample.
///
/// The threshold is `threshold_fraction` times the `ceiling_percentile` of the
/// current filtered window, so it follows electrode contact and amplitude
/// changes. A crossing only counts once `refractory_s` has passed since the
/// previous crossing.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    cfg: DetectorConfig,
    last_beat: Option<f64>,
    state: DetectorState,
    threshold: Option<f64>,
}

impl BeatDetector {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            last_beat: None,
            state: DetectorState::AwaitingBeat,
            threshold: None,
        }
    }

    /// Inspect the newest sample of `filtered` at time `now`.
    ///
    /// Every crossing outside the refractory period moves the last-beat time,
    /// including the very first one (which has no interval) and ones whose rate
    /// falls outside the plausible band; only in-band crossings are returned.
    pub fn detect(&mut self, filtered: &[f64], now: f64) -> Option<BeatCandidate> {
        self.update_state(now);
        let &newest = filtered.last()?;
        let ceiling = stats::percentile(filtered, self.cfg.ceiling_percentile)?;
        if ceiling <= 0.0 {
            self.threshold = None;
            return None;
        }
        let threshold = ceiling * self.cfg.threshold_fraction;
        self.threshold = Some(threshold);

        if newest <= threshold || self.state == DetectorState::Refractory {
            return None;
        }

        let previous = self.last_beat.replace(now);
        self.state = DetectorState::Refractory;
        let Some(previous) = previous else {
            debug!("first threshold crossing at {now:.3}s primes the detector");
            return None;
        };

        let interval_s = now - previous;
        let instant_bpm = 60.0 / interval_s;
        if instant_bpm > self.cfg.min_bpm && instant_bpm < self.cfg.max_bpm {
            debug!("beat at {now:.3}s: interval {interval_s:.3}s, {instant_bpm:.1} BPM");
            Some(BeatCandidate {
                t: now,
                interval_s,
                instant_bpm,
            })
        } else {
            debug!("discarding implausible candidate at {now:.3}s ({instant_bpm:.1} BPM)");
            None
        }
    }

    fn update_state(&mut self, now: f64) {
        self.state = match self.last_beat {
            Some(last) if now - last <= self.cfg.refractory_s => DetectorState::Refractory,
            _ => DetectorState::AwaitingBeat,
        };
    }

    /// Forget the previous crossing so the next one only primes the detector.
    pub fn reset(&mut self) {
        self.last_beat = None;
        self.state = DetectorState::AwaitingBeat;
        self.threshold = None;
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    /// Threshold used on the most recent call, if the window had a positive ceiling.
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 200.0;

    /// Narrow positive spikes on a flat baseline, one per entry of `beat_times`.
    fn spike_train(beat_times: &[f64], duration: f64) -> Vec<f64> {
        let samples = (duration * FS) as usize;
        (0..samples)
            .map(|i| {
                let t = i as f64 / FS;
                beat_times
                    .iter()
                    .map(|&bt| 1000.0 * (-0.5 * ((t - bt) / 0.015).powi(2)).exp())
                    .sum::<f64>()
            })
            .collect()
    }

    /// Slide a 1500-sample window over `signal`, calling `detect` for each new
    /// sample from `start_s` on.
    fn run(detector: &mut BeatDetector, signal: &[f64], start_s: f64) -> Vec<BeatCandidate> {
        let mut beats = Vec::new();
        let first = ((start_s * FS) as usize).max(1);
        for end in first..=signal.len() {
            let start = end.saturating_sub(1500);
            let now = (end - 1) as f64 / FS;
            if let Some(beat) = detector.detect(&signal[start..end], now) {
                beats.push(beat);
            }
        }
        beats
    }

    #[test]
    fn detects_regular_beats() {
        let times: Vec<f64> = (0..10).map(|i| 0.5 + i as f64 * 0.8).collect();
        let signal = spike_train(&times, 8.5);
        let mut detector = BeatDetector::new(&DetectorConfig::default());
        let beats = run(&mut detector, &signal, 1.0);
        // the beat at 0.5 s precedes detection; the next crossing only primes
        assert_eq!(beats.len(), times.len() - 2);
        for beat in &beats {
            assert!((beat.instant_bpm - 75.0).abs() < 1.0, "{beat:?}");
        }
    }

    #[test]
    fn never_accepts_beats_inside_refractory_period() {
        let cfg = DetectorConfig::default();
        let signal: Vec<f64> = (0..(FS as usize * 20))
            .map(|i| {
                let t = i as f64 / FS;
                // fast oscillation would cross the threshold every 0.2 s without gating
                500.0 * (2.0 * PI * 5.0 * t).sin() + 200.0 * (2.0 * PI * 1.3 * t).sin()
            })
            .collect();
        let mut detector = BeatDetector::new(&cfg);
        let beats = run(&mut detector, &signal, 0.0);
        assert!(!beats.is_empty());
        for pair in beats.windows(2) {
            assert!(pair[1].t - pair[0].t >= cfg.refractory_s);
        }
        for beat in &beats {
            assert!(beat.interval_s >= cfg.refractory_s);
        }
    }

    #[test]
    fn implausible_rate_is_dropped_but_advances_last_beat() {
        let cfg = DetectorConfig::default();
        // 3 s gap -> 20 BPM, below the 30 BPM floor
        let signal = spike_train(&[0.5, 1.3, 4.3, 5.1], 6.0);
        let mut detector = BeatDetector::new(&cfg);
        let beats = run(&mut detector, &signal, 1.0);
        assert_eq!(beats.len(), 1);
        assert!((beats[0].interval_s - 0.8).abs() < 0.02);
    }

    #[test]
    fn flat_or_negative_window_never_fires() {
        let mut detector = BeatDetector::new(&DetectorConfig::default());
        assert!(detector.detect(&[0.0; 300], 1.0).is_none());
        assert!(detector.detect(&[-5.0; 300], 2.0).is_none());
        assert!(detector.detect(&[], 3.0).is_none());
        assert_eq!(detector.last_beat(), None);
    }

    #[test]
    fn threshold_tracks_amplitude() {
        let mut detector = BeatDetector::new(&DetectorConfig::default());
        let small: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        detector.detect(&small, 0.0);
        let low = detector.threshold().unwrap();
        let large: Vec<f64> = small.iter().map(|v| v * 10.0).collect();
        detector.detect(&large, 10.0);
        let high = detector.threshold().unwrap();
        assert!((low - 0.65 * 95.0).abs() < 1e-9);
        assert!((high - 10.0 * low).abs() < 1e-9);
    }

    #[test]
    fn reset_forgets_previous_crossing() {
        let mut detector = BeatDetector::new(&DetectorConfig::default());
        let window: Vec<f64> = (1..=200).map(|v| v as f64).collect();
        assert!(detector.detect(&window, 1.0).is_none());
        let beat = detector.detect(&window, 2.0).expect("second crossing is a beat");
        assert!((beat.interval_s - 1.0).abs() < 1e-12);

        detector.reset();
        assert_eq!(detector.last_beat(), None);
        assert_eq!(detector.state(), DetectorState::AwaitingBeat);
        // a crossing 3.5 s after the forgotten one would otherwise be 17 BPM
        assert!(detector.detect(&window, 5.5).is_none());
        assert_eq!(detector.last_beat(), Some(5.5));
        let beat = detector.detect(&window, 6.3).expect("beat after re-priming");
        assert!((beat.interval_s - 0.8).abs() < 1e-9);
    }

    #[test]
    fn state_machine_enters_and_leaves_refractory() {
        let mut detector = BeatDetector::new(&DetectorConfig::default());
        let mut window: Vec<f64> = (1..=200).map(|v| v as f64).collect();
        window.push(500.0);
        detector.detect(&window, 1.0);
        assert_eq!(detector.state(), DetectorState::Refractory);
        detector.detect(&window, 1.2);
        assert_eq!(detector.state(), DetectorState::Refractory);
        window.push(0.0);
        detector.detect(&window, 1.5);
        assert_eq!(detector.state(), DetectorState::AwaitingBeat);
    }
}

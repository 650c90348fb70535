use crate::{
    buffer::SampleBuffer,
    config::{ConfigError, MonitorConfig},
    detectors::ecg::{BeatCandidate, BeatDetector},
    filters::FilterBank,
    metrics::{
        hrv::HrvSummary,
        rhythm::{BeatEvent, RhythmAnalyzer},
        sqi::{QualityState, SignalQualityGate},
    },
    signal::{PoincarePair, RawSample},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Heart-rate display state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BpmReading {
    /// Fewer than the bootstrap number of rates have been smoothed.
    #[default]
    Unavailable,
    /// No accepted beat within the stale timeout; `last_bpm` is kept for context only.
    Stale { last_bpm: f64 },
    Current { bpm: f64 },
}

impl BpmReading {
    pub fn current(&self) -> Option<f64> {
        match self {
            BpmReading::Current { bpm } => Some(*bpm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorCounters {
    pub ticks: u64,
    pub beats: u64,
    pub premature_beats: u64,
    pub degraded_ticks: u64,
    pub sanitized_samples: u64,
}

/// Read-only projection of the pipeline after the most recent tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tick time (seconds, monitor clock)
    pub t: f64,
    /// Cleaned waveform for the retained window, oldest first.
    pub waveform: Vec<f64>,
    pub quality: QualityState,
    /// Buffer still below the analysis minimum, or settling after a degraded
    /// stretch; `waveform` is raw passthrough.
    pub warming_up: bool,
    pub bpm: BpmReading,
    pub sdnn_ms: Option<f64>,
    pub hrv: Option<HrvSummary>,
    pub last_beat: Option<BeatEvent>,
    /// 1.0 right after a premature beat, fading linearly to 0.0.
    pub alert_weight: f64,
    pub poincare: Vec<PoincarePair>,
    pub counters: MonitorCounters,
}

impl MetricsSnapshot {
    pub fn premature(&self) -> bool {
        self.last_beat.is_some_and(|b| b.premature)
    }
}

/// One row's worth of per-tick state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub t: f64,
    pub raw: i32,
    pub filtered: f64,
    pub bpm: Option<f64>,
    pub quality: QualityState,
}

/// Discrete output of a tick, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    Tick(TickRecord),
    Beat(BeatEvent),
    PrematureBeat(BeatEvent),
    QualityChanged {
        t: f64,
        from: QualityState,
        to: QualityState,
    },
}

impl MonitorEvent {
    /// Event column used by the CSV log.
    pub fn status_tag(&self) -> &'static str {
        match self {
            MonitorEvent::Tick(record) if record.quality.is_degraded() => "LEADS_OFF",
            MonitorEvent::Tick(_) => "",
            MonitorEvent::Beat(_) => "BEAT",
            MonitorEvent::PrematureBeat(_) => "PVC_DETECTED",
            MonitorEvent::QualityChanged { to, .. } if to.is_degraded() => "LEADS_OFF",
            MonitorEvent::QualityChanged { .. } => "",
        }
    }
}

/// The live ECG pipeline.
///
/// Owns the rolling window, filter, quality gate, detector and rhythm
/// histories. Samples are pushed in by the transport side; `tick` runs one
/// processing cycle over everything buffered so far.
#[derive(Debug, Clone)]
pub struct Monitor {
    cfg: MonitorConfig,
    buffer: SampleBuffer,
    filter_bank: FilterBank,
    gate: SignalQualityGate,
    detector: BeatDetector,
    rhythm: RhythmAnalyzer,
    quality: QualityState,
    alert_weight: f64,
    last_accepted: Option<f64>,
    last_beat: Option<BeatEvent>,
    /// Newest sample time of the last degraded (or recovery) tick.
    settle_from: Option<f64>,
    counters: MonitorCounters,
    snapshot: MetricsSnapshot,
}

impl Monitor {
    pub fn new(cfg: MonitorConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let filter_bank = FilterBank::configure(&cfg.filter, cfg.sample_rate_hz)?;
        Ok(Self {
            buffer: SampleBuffer::new(cfg.buffer.window_samples),
            filter_bank,
            gate: SignalQualityGate::new(&cfg.quality),
            detector: BeatDetector::new(&cfg.detector),
            rhythm: RhythmAnalyzer::new(&cfg.rhythm),
            quality: QualityState::Ok,
            alert_weight: 0.0,
            last_accepted: None,
            last_beat: None,
            settle_from: None,
            counters: MonitorCounters::default(),
            snapshot: MetricsSnapshot::default(),
            cfg,
        })
    }

    pub fn push(&mut self, sample: RawSample) {
        self.buffer.push(sample);
    }

    pub fn extend<I: IntoIterator<Item = RawSample>>(&mut self, samples: I) {
        self.buffer.extend(samples);
    }

    /// Run one processing cycle at time `now`.
    ///
    /// Detection timing follows the newest sample's timestamp; BPM staleness
    /// is measured against `now`. The first event is always the tick record
    /// unless the buffer is still empty.
    ///
    /// A degraded tick resets the detector. Once the lead recovers, filtering
    /// and detection only see samples newer than the recovery tick, and wait
    /// for `recovery_settle_samples` of them.
    pub fn tick(&mut self, now: f64) -> Vec<MonitorEvent> {
        self.counters.ticks += 1;
        self.alert_weight = (self.alert_weight - self.cfg.rhythm.alert_decay_per_tick).max(0.0);
        let filled = self.buffer.has_at_least(self.cfg.buffer.min_analysis_samples);

        let window = self.buffer.window();
        let Some(&newest) = window.last() else {
            self.snapshot.t = now;
            self.snapshot.alert_weight = self.alert_weight;
            self.snapshot.counters = self.counters.clone();
            return Vec::new();
        };

        let mut events = Vec::new();
        let report = self.gate.inspect(window);
        if report.state != self.quality {
            info!(
                "signal quality {} -> {} at {now:.2}s (newest {}, recent std {:.2})",
                self.quality, report.state, report.newest, report.recent_std
            );
            events.push(MonitorEvent::QualityChanged {
                t: now,
                from: self.quality,
                to: report.state,
            });
            if self.quality.is_degraded() {
                // samples up to the recovery tick may still hold the lead-off level
                self.settle_from = Some(newest.t);
            }
            self.quality = report.state;
        }

        let degraded = report.state.is_degraded();
        if degraded {
            self.settle_from = Some(newest.t);
        }
        // analysis only covers samples newer than the last degraded stretch
        let clean_start = match self.settle_from {
            Some(t) => window.partition_point(|s| s.t <= t),
            None => 0,
        };
        if clean_start == 0 && !degraded {
            self.settle_from = None;
        }
        let clean = &window[clean_start..];
        let warming_up = !degraded
            && if clean_start > 0 {
                clean.len() < self.cfg.buffer.recovery_settle_samples
            } else {
                !filled
            };

        let filtered: Vec<f64> = if degraded {
            vec![0.0; window.len()]
        } else if warming_up {
            window.iter().map(|s| s.value as f64).collect()
        } else {
            let mut out = vec![0.0; clean_start];
            out.extend(self.filter_bank.filter(clean));
            out
        };

        if degraded {
            self.counters.degraded_ticks += 1;
            self.rhythm.clear_bpm_history();
            self.detector.reset();
        } else if !warming_up {
            if let Some(candidate) = self.detector.detect(&filtered[clean_start..], newest.t) {
                self.accept(&candidate, &mut events);
            }
        }

        let bpm = self.bpm_reading(now);
        let record = TickRecord {
            t: now,
            raw: newest.value,
            filtered: filtered.last().copied().unwrap_or(0.0),
            bpm: bpm.current(),
            quality: self.quality,
        };
        events.insert(0, MonitorEvent::Tick(record));

        self.counters.sanitized_samples = self.filter_bank.sanitized_total();
        self.snapshot = MetricsSnapshot {
            t: now,
            waveform: filtered,
            quality: self.quality,
            warming_up,
            bpm,
            sdnn_ms: self.rhythm.sdnn_ms(),
            hrv: self.rhythm.hrv(),
            last_beat: self.last_beat,
            alert_weight: self.alert_weight,
            poincare: self.rhythm.poincare_pairs(),
            counters: self.counters.clone(),
        };
        events
    }

    fn accept(&mut self, candidate: &BeatCandidate, events: &mut Vec<MonitorEvent>) {
        let beat = self.rhythm.on_beat(candidate);
        self.counters.beats += 1;
        self.last_accepted = Some(beat.t);
        self.last_beat = Some(beat);
        events.push(MonitorEvent::Beat(beat));
        if beat.premature {
            debug!(
                "premature beat at {:.3}s (interval {:.3}s)",
                beat.t, beat.interval_s
            );
            self.counters.premature_beats += 1;
            self.alert_weight = 1.0;
            events.push(MonitorEvent::PrematureBeat(beat));
        }
    }

    fn bpm_reading(&self, now: f64) -> BpmReading {
        let Some(bpm) = self.rhythm.reported_bpm() else {
            return BpmReading::Unavailable;
        };
        match self.last_accepted {
            Some(last) if now - last <= self.cfg.detector.stale_timeout_s => {
                BpmReading::Current { bpm }
            }
            _ => BpmReading::Stale { last_bpm: bpm },
        }
    }

    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }

    pub fn quality(&self) -> QualityState {
        self.quality
    }

    pub fn rhythm(&self) -> &RhythmAnalyzer {
        &self.rhythm
    }
}

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Synthetic single-lead recording description, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSpec {
    pub name: String,
    pub sample_rate_hz: f64,
    pub duration_s: f64,
    pub heart_rate_bpm: f64,
    /// Uniform RR jitter, +/- this many milliseconds per beat.
    pub rr_jitter_ms: f64,
    pub dc_offset: f64,
    /// Peak of the QRS complex above the baseline (counts).
    pub qrs_amplitude: f64,
    /// Uniform noise, +/- this many counts.
    pub noise_amplitude: f64,
    pub mains_hz: Option<f64>,
    pub mains_amplitude: f64,
    pub seed: Option<u64>,
    /// Beat indices that arrive early (0-based, first beat is 0).
    pub premature_beats: Vec<usize>,
    /// Interval before a premature beat, as a fraction of the nominal RR.
    pub premature_ratio: f64,
    pub segments: Vec<Segment>,
}

impl Default for ScenarioSpec {
    fn default() -> Self {
        Self {
            name: "sinus".into(),
            sample_rate_hz: 200.0,
            duration_s: 30.0,
            heart_rate_bpm: 72.0,
            rr_jitter_ms: 15.0,
            dc_offset: 512.0,
            qrs_amplitude: 350.0,
            noise_amplitude: 6.0,
            mains_hz: None,
            mains_amplitude: 0.0,
            seed: None,
            premature_beats: Vec::new(),
            premature_ratio: 0.6,
            segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Electrode off: the line sits at a constant level.
    LeadOff,
    /// Amplifier saturated at the top of its range.
    Railed,
}

/// Stretch of the recording overridden by a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start_s: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub level: Option<i32>,
}

impl Segment {
    fn level(&self) -> i32 {
        self.level.unwrap_or(match self.kind {
            SegmentKind::LeadOff => 0,
            SegmentKind::Railed => 1023,
        })
    }

    fn contains(&self, t: f64) -> bool {
        t >= self.start_s && t < self.start_s + self.duration_s
    }
}

impl ScenarioSpec {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            bail!("sample_rate_hz must be positive, got {}", self.sample_rate_hz);
        }
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            bail!("duration_s must be positive, got {}", self.duration_s);
        }
        if !(20.0..=250.0).contains(&self.heart_rate_bpm) {
            bail!("heart_rate_bpm must lie in 20..=250, got {}", self.heart_rate_bpm);
        }
        let nominal_ms = 60_000.0 / self.heart_rate_bpm;
        if self.rr_jitter_ms < 0.0 || self.rr_jitter_ms >= 0.5 * nominal_ms {
            bail!("rr_jitter_ms must be in [0, {:.0}), got {}", 0.5 * nominal_ms, self.rr_jitter_ms);
        }
        if !(self.premature_ratio > 0.0 && self.premature_ratio < 1.0) {
            bail!("premature_ratio must be in (0, 1), got {}", self.premature_ratio);
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if segment.start_s < 0.0 || segment.duration_s <= 0.0 {
                bail!("segment {idx} must start at >= 0 s and last > 0 s");
            }
        }
        Ok(())
    }

    pub fn nominal_rr_s(&self) -> f64 {
        60.0 / self.heart_rate_bpm
    }
}

/// Generated samples plus the ground truth used to produce them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedRecording {
    pub sample_rate_hz: f64,
    pub values: Vec<i32>,
    pub beat_times: Vec<f64>,
    pub premature_times: Vec<f64>,
}

impl SimulatedRecording {
    pub fn duration_s(&self) -> f64 {
        self.values.len() as f64 / self.sample_rate_hz
    }
}

pub fn read_scenario(path: &Path) -> Result<ScenarioSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let spec: ScenarioSpec =
        toml::from_str(&contents).with_context(|| format!("parsing scenario {}", path.display()))?;
    spec.validate()
        .with_context(|| format!("invalid scenario {}", path.display()))?;
    Ok(spec)
}

/// Beat schedule: jittered RR intervals, shortened before premature beats.
fn schedule_beats(spec: &ScenarioSpec, rng: &mut StdRng) -> (Vec<f64>, Vec<f64>) {
    let nominal = spec.nominal_rr_s();
    let jitter = spec.rr_jitter_ms / 1000.0;
    let mut beats = Vec::new();
    let mut premature = Vec::new();
    let mut t = 0.4;
    let mut index = 0;
    while t < spec.duration_s {
        beats.push(t);
        index += 1;
        let mut rr = nominal;
        if jitter > 0.0 {
            rr += rng.gen_range(-jitter..=jitter);
        }
        if spec.premature_beats.contains(&index) {
            rr = nominal * spec.premature_ratio;
            if t + rr < spec.duration_s {
                premature.push(t + rr);
            }
        }
        t += rr;
    }
    (beats, premature)
}

fn gaussian(t: f64, centre: f64, width: f64, amplitude: f64) -> f64 {
    amplitude * (-0.5 * ((t - centre) / width).powi(2)).exp()
}

/// P, QRS and T deflections of one beat centred on its R peak.
fn beat_shape(t: f64, r_peak: f64, qrs_amplitude: f64) -> f64 {
    gaussian(t, r_peak - 0.16, 0.025, 0.12 * qrs_amplitude)
        + gaussian(t, r_peak - 0.03, 0.01, -0.1 * qrs_amplitude)
        + gaussian(t, r_peak, 0.022, qrs_amplitude)
        + gaussian(t, r_peak + 0.035, 0.012, -0.15 * qrs_amplitude)
        + gaussian(t, r_peak + 0.26, 0.05, 0.25 * qrs_amplitude)
}

/// Render `spec` into integer samples.
pub fn simulate(spec: &ScenarioSpec) -> Result<SimulatedRecording> {
    spec.validate()?;
    let seed = spec.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let (beat_times, premature_times) = schedule_beats(spec, &mut rng);

    let fs = spec.sample_rate_hz;
    let samples = (spec.duration_s * fs).round() as usize;
    let mut values = Vec::with_capacity(samples);
    for i in 0..samples {
        let t = i as f64 / fs;
        if let Some(segment) = spec.segments.iter().find(|s| s.contains(t)) {
            values.push(segment.level());
            continue;
        }
        // beats more than 0.6 s away contribute nothing measurable
        let first = beat_times.partition_point(|&b| b < t - 0.6);
        let mut v = spec.dc_offset;
        for &r_peak in beat_times[first..].iter().take_while(|&&b| b < t + 0.6) {
            v += beat_shape(t, r_peak, spec.qrs_amplitude);
        }
        if let Some(mains) = spec.mains_hz {
            v += spec.mains_amplitude * (2.0 * std::f64::consts::PI * mains * t).sin();
        }
        if spec.noise_amplitude > 0.0 {
            v += rng.gen_range(-spec.noise_amplitude..=spec.noise_amplitude);
        }
        values.push(v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32);
    }

    Ok(SimulatedRecording {
        sample_rate_hz: fs,
        values,
        beat_times,
        premature_times,
    })
}

/// Write one sample per line, the format the monitor reads.
pub fn write_samples(path: &Path, values: &[i32]) -> Result<()> {
    fs::write(path, render_samples(values))
        .with_context(|| format!("failed to write samples {}", path.display()))
}

pub fn render_samples(values: &[i32]) -> String {
    let mut out = String::with_capacity(values.len() * 5);
    for v in values {
        let _ = writeln!(out, "{v}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded() -> ScenarioSpec {
        ScenarioSpec {
            seed: Some(7),
            duration_s: 20.0,
            ..ScenarioSpec::default()
        }
    }

    #[test]
    fn same_seed_same_recording() {
        let a = simulate(&seeded()).unwrap();
        let b = simulate(&seeded()).unwrap();
        assert_eq!(a, b);
        let c = simulate(&ScenarioSpec {
            seed: Some(8),
            ..seeded()
        })
        .unwrap();
        assert_ne!(a.values, c.values);
    }

    #[test]
    fn beat_count_follows_heart_rate() {
        let rec = simulate(&seeded()).unwrap();
        assert_eq!(rec.values.len(), 4000);
        // 20 s at 72 BPM, first beat at 0.4 s
        assert!((23..=25).contains(&rec.beat_times.len()), "{}", rec.beat_times.len());
        for w in rec.beat_times.windows(2) {
            let rr = w[1] - w[0];
            assert!((rr - 60.0 / 72.0).abs() <= 0.015 + 1e-9);
        }
    }

    #[test]
    fn premature_beats_arrive_early() {
        let spec = ScenarioSpec {
            premature_beats: vec![10],
            ..seeded()
        };
        let rec = simulate(&spec).unwrap();
        assert_eq!(rec.premature_times.len(), 1);
        let rr = rec.beat_times[10] - rec.beat_times[9];
        assert!((rr - 0.6 * spec.nominal_rr_s()).abs() < 1e-9);
        assert_eq!(rec.premature_times[0], rec.beat_times[10]);
    }

    #[test]
    fn segments_override_signal() {
        let spec = ScenarioSpec {
            segments: vec![
                Segment {
                    kind: SegmentKind::LeadOff,
                    start_s: 2.0,
                    duration_s: 1.0,
                    level: None,
                },
                Segment {
                    kind: SegmentKind::Railed,
                    start_s: 5.0,
                    duration_s: 0.5,
                    level: None,
                },
            ],
            ..seeded()
        };
        let rec = simulate(&spec).unwrap();
        assert!(rec.values[400..600].iter().all(|&v| v == 0));
        assert!(rec.values[1000..1100].iter().all(|&v| v == 1023));
        assert!(rec.values[600..1000].iter().any(|&v| v != 0));
    }

    #[test]
    fn rejects_bad_scenarios() {
        for spec in [
            ScenarioSpec {
                sample_rate_hz: 0.0,
                ..ScenarioSpec::default()
            },
            ScenarioSpec {
                heart_rate_bpm: 400.0,
                ..ScenarioSpec::default()
            },
            ScenarioSpec {
                rr_jitter_ms: 500.0,
                ..ScenarioSpec::default()
            },
            ScenarioSpec {
                premature_ratio: 1.2,
                ..ScenarioSpec::default()
            },
        ] {
            assert!(simulate(&spec).is_err(), "{spec:?}");
        }
    }

    #[test]
    fn reads_scenario_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pvc.toml");
        fs::write(
            &path,
            r#"
name = "pvc"
heart_rate_bpm = 60.0
seed = 3
premature_beats = [5, 12]

[[segments]]
kind = "lead_off"
start_s = 20.0
duration_s = 2.0
"#,
        )
        .unwrap();
        let spec = read_scenario(&path).unwrap();
        assert_eq!(spec.name, "pvc");
        assert_eq!(spec.sample_rate_hz, 200.0);
        assert_eq!(spec.premature_beats, vec![5, 12]);
        assert_eq!(spec.segments[0].kind, SegmentKind::LeadOff);
    }

    #[test]
    fn writes_one_sample_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ecg.txt");
        write_samples(&path, &[512, -3, 700]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "512\n-3\n700\n");
    }
}

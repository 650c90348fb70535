use crate::signal::{PoincarePair, RRSeries};
use serde::{Deserialize, Serialize};

/// Time-domain HRV over an RR series (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

/// Poincaré ellipse descriptors (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoincareDescriptors {
    /// Short-term variability, spread across the identity line.
    pub sd1: f64,
    /// Long-term variability, spread along the identity line.
    pub sd2: f64,
}

/// Display-oriented HRV summary, durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub n: usize,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub avnn_ms: f64,
    pub pnn50: f64,
    pub sd1_ms: Option<f64>,
    pub sd2_ms: Option<f64>,
}

pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    let n = rr.rr.len();
    let avnn = if n > 0 {
        rr.rr.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let sdnn = if n > 1 {
        let mean = avnn;
        (rr.rr.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let rmssd = if n > 1 {
        let diffs = rr.rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = rr
            .rr
            .windows(2)
            .filter(|w| (w[1] - w[0]).abs() > 0.050)
            .count();
        (count as f64) / (n as f64 - 1.0)
    } else {
        0.0
    };

    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}

pub fn poincare_descriptors(pairs: &[PoincarePair]) -> Option<PoincareDescriptors> {
    if pairs.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = pairs.iter().map(|p| p.next - p.prev).collect();
    let sums: Vec<f64> = pairs.iter().map(|p| p.next + p.prev).collect();
    Some(PoincareDescriptors {
        sd1: (0.5 * variance(&diffs)).sqrt(),
        sd2: (0.5 * variance(&sums)).sqrt(),
    })
}

pub fn hrv_summary(rr: &RRSeries, pairs: &[PoincarePair]) -> HrvSummary {
    let time = hrv_time(rr);
    let poincare = poincare_descriptors(pairs);
    HrvSummary {
        n: time.n,
        sdnn_ms: time.sdnn * 1000.0,
        rmssd_ms: time.rmssd * 1000.0,
        avnn_ms: time.avnn * 1000.0,
        pnn50: time.pnn50,
        sd1_ms: poincare.map(|p| p.sd1 * 1000.0),
        sd2_ms: poincare.map(|p| p.sd2 * 1000.0),
    }
}

fn variance(data: &[f64]) -> f64 {
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rr_series() -> RRSeries {
        let data = [
            0.82, 0.78, 0.80, 0.79, 0.83, 0.77, 0.84, 0.88, 0.86, 0.81, 0.79, 0.82, 0.85, 0.78,
            0.80, 0.79, 0.83, 0.84, 0.82, 0.81,
        ];
        RRSeries { rr: data.to_vec() }
    }

    fn pairs(rr: &RRSeries) -> Vec<PoincarePair> {
        rr.rr
            .windows(2)
            .map(|w| PoincarePair {
                prev: w[0],
                next: w[1],
            })
            .collect()
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn constant_rhythm_has_no_variability() {
        let rr = RRSeries { rr: vec![0.8; 12] };
        let time = hrv_time(&rr);
        assert_eq!(time.n, 12);
        assert_close(time.avnn, 0.8, 1e-12);
        assert_close(time.sdnn, 0.0, 1e-12);
        assert_close(time.rmssd, 0.0, 1e-12);
        assert_close(time.pnn50, 0.0, 1e-12);
    }

    #[test]
    fn alternating_rhythm() {
        let rr = RRSeries {
            rr: vec![0.7, 0.9, 0.7, 0.9],
        };
        let time = hrv_time(&rr);
        assert_close(time.avnn, 0.8, 1e-12);
        // sample std of [0.7, 0.9, 0.7, 0.9]
        assert_close(time.sdnn, (0.04f64 / 3.0).sqrt(), 1e-12);
        assert_close(time.rmssd, 0.2, 1e-12);
        assert_close(time.pnn50, 1.0, 1e-12);
    }

    #[test]
    fn poincare_matches_series_variability() {
        let rr = rr_series();
        let desc = poincare_descriptors(&pairs(&rr)).expect("enough pairs");
        assert!(desc.sd1 > 0.0);
        assert!(desc.sd2 > 0.0);
        // SD1 is the spread of successive differences scaled by 1/sqrt(2)
        let time = hrv_time(&rr);
        assert!(desc.sd1 < time.rmssd);
    }

    #[test]
    fn poincare_needs_two_pairs() {
        assert!(poincare_descriptors(&[]).is_none());
        assert!(poincare_descriptors(&[PoincarePair {
            prev: 0.8,
            next: 0.8
        }])
        .is_none());
    }

    #[test]
    fn summary_is_in_milliseconds() {
        let rr = rr_series();
        let summary = hrv_summary(&rr, &pairs(&rr));
        let time = hrv_time(&rr);
        assert_eq!(summary.n, rr.len());
        assert_close(summary.sdnn_ms, time.sdnn * 1000.0, 1e-9);
        assert_close(summary.avnn_ms, time.avnn * 1000.0, 1e-9);
        assert!(summary.sd1_ms.is_some());
    }
}

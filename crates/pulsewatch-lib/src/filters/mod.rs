pub mod iir;

pub use iir::{butterworth_bandpass, Biquad, SosCascade};

use crate::{
    config::{ConfigError, FilterConfig},
    signal::RawSample,
};
use log::warn;

/// Band-pass plus optional mains notch, applied to the whole retained window.
///
/// Every call primes the delay lines at the steady state of the window's first
/// sample and then filters the window front to back, so the same window always
/// yields the same output.
#[derive(Debug, Clone)]
pub struct FilterBank {
    cascade: SosCascade,
    sample_rate_hz: f64,
    has_notch: bool,
    sanitized_total: u64,
}

impl FilterBank {
    pub fn configure(cfg: &FilterConfig, sample_rate_hz: f64) -> Result<Self, ConfigError> {
        cfg.validate(sample_rate_hz)?;
        let mut cascade = SosCascade::new(butterworth_bandpass(
            cfg.order,
            cfg.lowcut_hz,
            cfg.highcut_hz,
            sample_rate_hz,
        ));
        if let Some(notch_hz) = cfg.notch_hz {
            cascade.push_section(Biquad::notch(sample_rate_hz, notch_hz, cfg.notch_q));
        }
        Ok(Self {
            cascade,
            sample_rate_hz,
            has_notch: cfg.notch_hz.is_some(),
            sanitized_total: 0,
        })
    }

    /// Filter `window`; non-finite outputs are replaced by zero.
    pub fn filter(&mut self, window: &[RawSample]) -> Vec<f64> {
        let mut out: Vec<f64> = window.iter().map(|s| s.value as f64).collect();
        let Some(&first) = out.first() else {
            return out;
        };
        self.cascade.prime(first);
        self.cascade.process_block(&mut out);

        let sanitized = sanitize(&mut out);
        if sanitized > 0 {
            self.sanitized_total += sanitized as u64;
            warn!(
                "filter produced {} non-finite value(s) in a {}-sample window; zeroed",
                sanitized,
                out.len()
            );
        }
        out
    }

    pub fn has_notch(&self) -> bool {
        self.has_notch
    }

    /// Total number of output values zeroed because they were not finite.
    pub fn sanitized_total(&self) -> u64 {
        self.sanitized_total
    }

    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        self.cascade.magnitude_at(freq_hz, self.sample_rate_hz)
    }
}

/// Replace NaN/Inf in place, returning how many values were touched.
pub fn sanitize(values: &mut [f64]) -> usize {
    let mut count = 0;
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
            count += 1;
        }
    }
    count
}

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One raw amplitude reading as handed over by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Amplitude in ADC counts
    pub value: i32,
    /// Arrival time in seconds on the monitor clock
    pub t: f64,
}

impl RawSample {
    pub fn new(value: i32, t: f64) -> Self {
        Self { value, t }
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

/// Consecutive interval pair (RR[n-1], RR[n]) in seconds, one point of a Poincaré plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoincarePair {
    pub prev: f64,
    pub next: f64,
}

/// Monotonic clock shared by the transport thread and the tick driver.
///
/// Readings are seconds since the clock was started, so sample stamps and
/// tick times live on the same axis.
#[derive(Debug, Clone, Copy)]
pub struct MonitorClock {
    start: Instant,
}

impl MonitorClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for MonitorClock {
    fn default() -> Self {
        Self::start()
    }
}

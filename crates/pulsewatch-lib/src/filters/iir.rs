use num_complex::Complex64;
use std::f64::consts::PI;

/// Second-order IIR section with `a0` normalised to 1.
///
/// Implements the difference equation:
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    pub const fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Band-pass section with zeros at DC and Nyquist and the given digital pole pair.
    fn band_section(p1: Complex64, p2: Complex64) -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: -1.0,
            a1: -(p1 + p2).re,
            a2: (p1 * p2).re,
        }
    }

    /// Second-order notch at `freq_hz`; bandwidth is `freq_hz / q`.
    pub fn notch(sample_rate_hz: f64, freq_hz: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
        let bw = w0 / q;
        let gain = 1.0 / (1.0 + (bw / 2.0).tan());
        let cos_w0 = w0.cos();
        Self {
            b0: gain,
            b1: -2.0 * gain * cos_w0,
            b2: gain,
            a1: -2.0 * gain * cos_w0,
            a2: 2.0 * gain - 1.0,
        }
    }

    /// Complex frequency response at normalised angular frequency `omega` (rad/sample).
    pub fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        let num = Complex64::new(self.b0, 0.0) + z1 * self.b1 + z2 * self.b2;
        let den = Complex64::new(1.0, 0.0) + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    pub fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < 1e-12 {
            return 0.0;
        }
        (self.b0 + self.b1 + self.b2) / den
    }

    fn scaled(self, k: f64) -> Self {
        Self {
            b0: self.b0 * k,
            b1: self.b1 * k,
            b2: self.b2 * k,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SectionState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

/// Cascade of biquad sections, each with its own Direct Form I delay line.
#[derive(Debug, Clone)]
pub struct SosCascade {
    sections: Vec<Biquad>,
    state: Vec<SectionState>,
}

impl SosCascade {
    pub fn new(sections: Vec<Biquad>) -> Self {
        let state = vec![SectionState::default(); sections.len()];
        Self { sections, state }
    }

    pub fn push_section(&mut self, section: Biquad) {
        self.sections.push(section);
        self.state.push(SectionState::default());
    }

    /// Load the delay lines with the steady state reached after `level` has
    /// been applied forever, so a signal starting at `level` produces no step
    /// transient.
    pub fn prime(&mut self, level: f64) {
        let mut x = level;
        for (coeffs, state) in self.sections.iter().zip(self.state.iter_mut()) {
            let y = coeffs.dc_gain() * x;
            *state = SectionState {
                x1: x,
                x2: x,
                y1: y,
                y2: y,
            };
            x = y;
        }
    }

    #[inline]
    pub fn process_sample(&mut self, input: f64) -> f64 {
        let mut x = input;
        for (c, s) in self.sections.iter().zip(self.state.iter_mut()) {
            let y = c.b0 * x + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
            s.x2 = s.x1;
            s.x1 = x;
            s.y2 = s.y1;
            s.y1 = y;
            x = y;
        }
        x
    }

    pub fn process_block(&mut self, samples: &mut [f64]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Magnitude of the cascade response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate_hz;
        self.sections
            .iter()
            .map(|s| s.response(omega).norm())
            .product()
    }
}

/// Butterworth band-pass of prototype order `order`, as `order` cascaded biquads.
///
/// Analog low-pass prototype poles are moved to the pre-warped band with the
/// low-pass to band-pass transform, mapped through the bilinear transform, and
/// paired into conjugate sections. Each section is scaled to unity gain at the
/// band centre, so the cascade passes the centre frequency unchanged and sits
/// at -3 dB on both cutoffs.
///
/// Callers validate `0 < low_hz < high_hz < fs / 2` and `order >= 1`.
pub fn butterworth_bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate_hz: f64) -> Vec<Biquad> {
    let fs2 = 2.0 * sample_rate_hz;
    let wl = fs2 * (PI * low_hz / sample_rate_hz).tan();
    let wh = fs2 * (PI * high_hz / sample_rate_hz).tan();
    let bw = wh - wl;
    let w0_sq = wl * wh;
    let bilinear = |s: Complex64| (fs2 + s) / (fs2 - s);

    let mut sections = Vec::with_capacity(order);
    for k in 0..order {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        let pole = Complex64::from_polar(1.0, theta);
        if pole.im < -1e-9 {
            // conjugate of an upper-half pole already handled
            continue;
        }
        let half = pole * (bw / 2.0);
        let disc = (half * half - w0_sq).sqrt();
        let s1 = half + disc;
        let s2 = half - disc;
        if pole.im.abs() <= 1e-9 {
            sections.push(Biquad::band_section(bilinear(s1), bilinear(s2)));
        } else {
            let z1 = bilinear(s1);
            let z2 = bilinear(s2);
            sections.push(Biquad::band_section(z1, z1.conj()));
            sections.push(Biquad::band_section(z2, z2.conj()));
        }
    }

    let omega_c = 2.0 * (w0_sq.sqrt() / fs2).atan();
    sections
        .into_iter()
        .map(|section| {
            let gain = section.response(omega_c).norm();
            if gain > 0.0 && gain.is_finite() {
                section.scaled(1.0 / gain)
            } else {
                section
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 200.0;

    fn bandpass(order: usize) -> SosCascade {
        SosCascade::new(butterworth_bandpass(order, 0.5, 25.0, FS))
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn section_count_matches_order() {
        for order in 1..=6 {
            assert_eq!(butterworth_bandpass(order, 0.5, 25.0, FS).len(), order);
        }
    }

    #[test]
    fn cutoffs_sit_at_half_power() {
        for order in [1, 2, 3, 4] {
            let cascade = bandpass(order);
            let edge = std::f64::consts::FRAC_1_SQRT_2;
            assert_close(cascade.magnitude_at(0.5, FS), edge, 1e-6);
            assert_close(cascade.magnitude_at(25.0, FS), edge, 1e-6);
        }
    }

    #[test]
    fn passband_is_flat_and_stopband_attenuated() {
        let cascade = bandpass(4);
        assert_close(cascade.magnitude_at(5.0, FS), 1.0, 1e-3);
        assert!(cascade.magnitude_at(0.05, FS) < 1e-3);
        assert!(cascade.magnitude_at(80.0, FS) < 1e-3);
    }

    #[test]
    fn poles_are_stable() {
        for section in butterworth_bandpass(4, 0.5, 25.0, FS) {
            // |a2| is the squared pole radius for a conjugate pair
            assert!(section.a2.abs() < 1.0, "unstable section {section:?}");
        }
    }

    #[test]
    fn primed_cascade_rejects_dc() {
        let mut cascade = bandpass(4);
        cascade.prime(512.0);
        for _ in 0..500 {
            let y = cascade.process_sample(512.0);
            assert!(y.abs() < 1e-9, "DC leaked: {y}");
        }
    }

    #[test]
    fn passes_in_band_sine() {
        let mut cascade = bandpass(4);
        let freq = 5.0;
        let mut peak: f64 = 0.0;
        for i in 0..(FS as usize * 10) {
            let t = i as f64 / FS;
            let y = cascade.process_sample((2.0 * PI * freq * t).sin());
            if t > 5.0 {
                peak = peak.max(y.abs());
            }
        }
        assert_close(peak, 1.0, 0.02);
    }

    #[test]
    fn notch_removes_mains_and_keeps_dc() {
        let notch = Biquad::notch(FS, 50.0, 30.0);
        assert!(notch.response(2.0 * PI * 50.0 / FS).norm() < 1e-9);
        assert_close(notch.dc_gain(), 1.0, 1e-12);
        assert_close(notch.response(2.0 * PI * 10.0 / FS).norm(), 1.0, 1e-2);
    }

    #[test]
    fn passthrough_is_identity() {
        let mut cascade = SosCascade::new(vec![Biquad::passthrough()]);
        assert_eq!(cascade.process_sample(1.0), 1.0);
        assert_eq!(cascade.process_sample(-2.5), -2.5);
    }
}

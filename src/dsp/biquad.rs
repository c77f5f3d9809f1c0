//! Pass-through biquad sections, direct form 1.
//!
//! Coefficient equations taken from the
//! [Audio EQ Cookbook by Robert Bristow-Johnson](https://www.w3.org/TR/audio-eq-cookbook/).

use std::f64::consts::{FRAC_1_SQRT_2, TAU};

/// Filter coefficients.
#[derive(Debug, Clone, Copy)]
struct Coefs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefs {
    /// A coefficient state which leaves the input signal unaffected.
    fn identity() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

impl Default for Coefs {
    fn default() -> Self {
        Self::identity()
    }
}

/// The second-order sections available as time-domain pass-through
/// stages ahead of the spectral filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiquadKind {
    #[default]
    Allpass,
    Lowpass,
    Highpass,
}

/// Parameters for one pass-through section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadParams {
    pub freq: f64,
    pub q: f64,
    pub kind: BiquadKind,
}

impl Default for BiquadParams {
    fn default() -> Self {
        Self { freq: 1000.0, q: FRAC_1_SQRT_2, kind: BiquadKind::default() }
    }
}

/// A single biquad section. Coefficients are recomputed lazily, only
/// when a parameter has changed between processed samples.
#[derive(Debug, Clone, Default)]
pub struct BiquadFilter {
    coefs: Coefs,
    delayed_in: (f64, f64),
    delayed_out: (f64, f64),

    params: BiquadParams,
    sample_rate: f64,

    needs_recompute: bool,
}

impl BiquadFilter {
    #[must_use]
    pub fn new(params: BiquadParams, sample_rate: f64) -> Self {
        Self {
            coefs: Coefs::identity(),
            delayed_in: (0.0, 0.0),
            delayed_out: (0.0, 0.0),
            params,
            sample_rate,
            needs_recompute: true,
        }
    }

    pub fn params(&self) -> BiquadParams {
        self.params
    }

    pub fn set_params(&mut self, params: BiquadParams) {
        self.params = params;
        self.needs_recompute = true;
    }

    /// Clears the delay state without touching parameters.
    pub fn reset(&mut self) {
        self.delayed_in = (0.0, 0.0);
        self.delayed_out = (0.0, 0.0);
    }

    /// Processes a single sample and returns the new sample.
    pub fn process(&mut self, sample: f64) -> f64 {
        if self.needs_recompute {
            self.recompute_coefs();
            self.needs_recompute = false;
        }

        let Coefs { b0, b1, b2, a1, a2 } = self.coefs;
        let (x1, x2) = self.delayed_in;
        let (y1, y2) = self.delayed_out;

        let out = b0 * sample + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;

        self.delayed_in = (sample, x1);
        self.delayed_out = (out, y1);

        out
    }

    fn recompute_coefs(&mut self) {
        let w = TAU * self.params.freq / self.sample_rate;
        let (sin_w, cos_w) = w.sin_cos();
        let alpha = sin_w / (2.0 * self.params.q.max(1e-3));
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match self.params.kind {
            BiquadKind::Lowpass => {
                let b1 = 1.0 - cos_w;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            BiquadKind::Highpass => {
                let b1 = -(1.0 + cos_w);
                (-b1 / 2.0, b1, -b1 / 2.0)
            }
            BiquadKind::Allpass => (1.0 - alpha, -2.0 * cos_w, 1.0 + alpha),
        };

        self.coefs = Coefs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;

    #[test]
    fn lowpass_passes_dc() {
        let mut filter = BiquadFilter::new(
            BiquadParams { freq: 1000.0, q: FRAC_1_SQRT_2, kind: BiquadKind::Lowpass },
            44_100.0,
        );

        let mut out = 0.0;
        for _ in 0..10_000 {
            out = filter.process(1.0);
        }
        assert!(within_tolerance(out, 1.0, 1e-6));
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut filter = BiquadFilter::new(
            BiquadParams { freq: 1000.0, q: FRAC_1_SQRT_2, kind: BiquadKind::Highpass },
            44_100.0,
        );

        let mut out = 1.0;
        for _ in 0..10_000 {
            out = filter.process(1.0);
        }
        assert!(out.abs() < 1e-6);
    }

    #[test]
    fn allpass_preserves_energy() {
        let mut filter = BiquadFilter::new(BiquadParams::default(), 44_100.0);
        let mut noise = crate::dsp::noise::Lcg::new(99);

        let mut in_energy = 0.0;
        let mut out_energy = 0.0;
        // skip the transient, then compare energies
        for i in 0..50_000 {
            let x = noise.next_sample();
            let y = filter.process(x);
            if i >= 1000 {
                in_energy += x * x;
                out_energy += y * y;
            }
        }

        let ratio = out_energy / in_energy;
        assert!((0.9..1.1).contains(&ratio), "energy ratio {ratio}");
    }
}

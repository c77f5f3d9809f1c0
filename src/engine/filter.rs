//! Spectral filter configuration and mask generation.
//!
//! Three spectral shapes are available: a plateau (flat top with cosine
//! rolloff), a generalised Gaussian with skew and kurtosis, and a
//! parabola with skew and flatness. A configuration renders to a
//! [`SpectralMask`] at any FFT size and sample rate.

use crate::dsp::mask::SpectralMask;
use crate::error::{Error, Result};
use crate::util::{db_to_level, erf};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

pub const CENTER_FREQ_RANGE: (f64, f64) = (20.0, 20_000.0);
pub const WIDTH_RANGE: (f64, f64) = (50.0, 10_000.0);
pub const GAIN_DB_RANGE: (f64, f64) = (-40.0, 40.0);
pub const FLAT_WIDTH_RANGE: (f64, f64) = (10.0, 2_000.0);
pub const SKEW_RANGE: (f64, f64) = (-5.0, 5.0);
pub const KURTOSIS_RANGE: (f64, f64) = (0.2, 5.0);
pub const FLATNESS_RANGE: (f64, f64) = (0.5, 3.0);

/// Guard against division by zero in the Gaussian width term.
const WIDTH_EPSILON: f64 = 1e-10;

/// The available spectral filter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Plateau,
    Gaussian,
    Parabolic,
}

/// A complete parameter set for one spectral filter.
///
/// All numeric parameters are clamped to their documented ranges when
/// set; the clamped values are visible on read-back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterConfig {
    Plateau {
        center_freq: f64,
        width: f64,
        gain_db: f64,
        flat_width: f64,
    },
    Gaussian {
        center_freq: f64,
        width: f64,
        gain_db: f64,
        skew: f64,
        kurtosis: f64,
    },
    Parabolic {
        center_freq: f64,
        width: f64,
        gain_db: f64,
        skew: f64,
        flatness: f64,
    },
}

impl FilterConfig {
    /// The default configuration for each shape: a unit-gain band around
    /// 1 kHz.
    #[must_use]
    pub fn default_for(kind: FilterKind) -> Self {
        match kind {
            FilterKind::Plateau => Self::Plateau {
                center_freq: 1000.0,
                width: 500.0,
                gain_db: 0.0,
                flat_width: 100.0,
            },
            FilterKind::Gaussian => Self::Gaussian {
                center_freq: 1000.0,
                width: 500.0,
                gain_db: 0.0,
                skew: 0.0,
                kurtosis: 1.0,
            },
            FilterKind::Parabolic => Self::Parabolic {
                center_freq: 1000.0,
                width: 500.0,
                gain_db: 0.0,
                skew: 0.0,
                flatness: 1.0,
            },
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Plateau { .. } => FilterKind::Plateau,
            Self::Gaussian { .. } => FilterKind::Gaussian,
            Self::Parabolic { .. } => FilterKind::Parabolic,
        }
    }

    pub fn center_freq(&self) -> f64 {
        match self {
            Self::Plateau { center_freq, .. }
            | Self::Gaussian { center_freq, .. }
            | Self::Parabolic { center_freq, .. } => *center_freq,
        }
    }

    pub fn width(&self) -> f64 {
        match self {
            Self::Plateau { width, .. }
            | Self::Gaussian { width, .. }
            | Self::Parabolic { width, .. } => *width,
        }
    }

    pub fn gain_db(&self) -> f64 {
        match self {
            Self::Plateau { gain_db, .. }
            | Self::Gaussian { gain_db, .. }
            | Self::Parabolic { gain_db, .. } => *gain_db,
        }
    }

    /// Returns this configuration with every field clamped into range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.clamp_fields();
        self
    }

    /// Sets one parameter by name, clamping the value into the
    /// parameter's range. Out-of-range values are clamped, never
    /// rejected; the clamped value is observable via
    /// [`parameter()`][Self::parameter].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] if `key` does not name a
    /// parameter of this shape.
    pub fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match (key, &mut *self) {
            ("center_freq", cfg) => match cfg {
                Self::Plateau { center_freq, .. }
                | Self::Gaussian { center_freq, .. }
                | Self::Parabolic { center_freq, .. } => *center_freq = value,
            },
            ("width", cfg) => match cfg {
                Self::Plateau { width, .. }
                | Self::Gaussian { width, .. }
                | Self::Parabolic { width, .. } => *width = value,
            },
            ("gain_db", cfg) => match cfg {
                Self::Plateau { gain_db, .. }
                | Self::Gaussian { gain_db, .. }
                | Self::Parabolic { gain_db, .. } => *gain_db = value,
            },
            ("flat_width", Self::Plateau { flat_width, .. }) => {
                *flat_width = value;
            }
            ("skew", Self::Gaussian { skew, .. })
            | ("skew", Self::Parabolic { skew, .. }) => *skew = value,
            ("kurtosis", Self::Gaussian { kurtosis, .. }) => *kurtosis = value,
            ("flatness", Self::Parabolic { flatness, .. }) => {
                *flatness = value;
            }
            (key, cfg) => {
                return Err(Error::BadParameter(format!(
                    "unknown parameter {key:?} for {:?} filter",
                    cfg.kind()
                )));
            }
        }

        self.clamp_fields();
        Ok(())
    }

    /// Reads one parameter by name. Reflects any clamping applied by
    /// [`set_parameter()`][Self::set_parameter].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] if `key` does not name a
    /// parameter of this shape.
    pub fn parameter(&self, key: &str) -> Result<f64> {
        let value = match (key, self) {
            ("center_freq", _) => self.center_freq(),
            ("width", _) => self.width(),
            ("gain_db", _) => self.gain_db(),
            ("flat_width", Self::Plateau { flat_width, .. }) => *flat_width,
            ("skew", Self::Gaussian { skew, .. })
            | ("skew", Self::Parabolic { skew, .. }) => *skew,
            ("kurtosis", Self::Gaussian { kurtosis, .. }) => *kurtosis,
            ("flatness", Self::Parabolic { flatness, .. }) => *flatness,
            (key, cfg) => {
                return Err(Error::BadParameter(format!(
                    "unknown parameter {key:?} for {:?} filter",
                    cfg.kind()
                )));
            }
        };

        Ok(value)
    }

    fn clamp_fields(&mut self) {
        let clamp = |v: &mut f64, range: (f64, f64)| {
            *v = v.clamp(range.0, range.1);
        };

        match self {
            Self::Plateau { center_freq, width, gain_db, flat_width } => {
                clamp(center_freq, CENTER_FREQ_RANGE);
                clamp(width, WIDTH_RANGE);
                clamp(gain_db, GAIN_DB_RANGE);
                clamp(flat_width, FLAT_WIDTH_RANGE);
                // the flat region may not exceed the full width
                *flat_width = flat_width.min(*width);
            }
            Self::Gaussian { center_freq, width, gain_db, skew, kurtosis } => {
                clamp(center_freq, CENTER_FREQ_RANGE);
                clamp(width, WIDTH_RANGE);
                clamp(gain_db, GAIN_DB_RANGE);
                clamp(skew, SKEW_RANGE);
                clamp(kurtosis, KURTOSIS_RANGE);
            }
            Self::Parabolic { center_freq, width, gain_db, skew, flatness } => {
                clamp(center_freq, CENTER_FREQ_RANGE);
                clamp(width, WIDTH_RANGE);
                clamp(gain_db, GAIN_DB_RANGE);
                clamp(skew, SKEW_RANGE);
                clamp(flatness, FLATNESS_RANGE);
            }
        }
    }

    /// Unit-gain magnitude response at frequency `freq` (Hz). The shape
    /// is evaluated against the absolute frequency, which keeps masks
    /// conjugate-symmetric across the negative-frequency bins.
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        match *self {
            Self::Plateau { center_freq, width, flat_width, .. } => {
                plateau(freq, center_freq, width, flat_width)
            }
            Self::Gaussian { center_freq, width, skew, kurtosis, .. } => {
                gaussian(freq, center_freq, width, skew, kurtosis)
            }
            Self::Parabolic { center_freq, width, skew, flatness, .. } => {
                parabolic(freq, center_freq, width, skew, flatness)
            }
        }
    }

    /// Renders this filter's gain mask (shape times linear gain) into
    /// `mask` at the provided sample rate.
    pub fn write_mask(&self, mask: &mut SpectralMask, sample_rate: f64) {
        let size = mask.size();
        let gain = db_to_level(self.gain_db());

        for i in 0..size {
            let freq = SpectralMask::bin_freq(i, size, sample_rate).abs();
            mask[i] = self.magnitude_at(freq) * gain;
        }
    }
}

fn plateau(freq: f64, center: f64, width: f64, flat_width: f64) -> f64 {
    let d = (freq - center).abs();

    // degenerate rolloff region: a pure plateau
    if width <= flat_width {
        return if d <= width / 2.0 { 1.0 } else { 0.0 };
    }

    if d < flat_width / 2.0 {
        1.0
    }
    else if d <= width / 2.0 {
        let rolloff = (width - flat_width) / 2.0;
        0.5 * (1.0 + (PI * (d - flat_width / 2.0) / rolloff).cos())
    }
    else {
        0.0
    }
}

fn gaussian(freq: f64, center: f64, width: f64, skew: f64, kurtosis: f64) -> f64 {
    let z = (freq - center) / (width + WIDTH_EPSILON);
    let base = (-(z * z).powf(kurtosis) / 2.0).exp();

    if skew == 0.0 {
        return base;
    }

    base * (1.0 + erf(skew * z * FRAC_1_SQRT_2)).max(0.0)
}

fn parabolic(freq: f64, center: f64, width: f64, skew: f64, flatness: f64) -> f64 {
    let delta = freq - center;
    let n = delta.abs() / width;

    if n > 1.0 {
        return 0.0;
    }

    if skew == 0.0 || delta == 0.0 {
        return 1.0 - n.powf(2.0 / flatness);
    }

    let s = 1.0 + skew.abs() / 5.0;
    let exponent = if skew.signum() == delta.signum() {
        2.0 * s / flatness
    }
    else {
        2.0 / (flatness * s)
    };

    1.0 - n.powf(exponent)
}

/// One filter slot in a chain: a configuration plus its bypass flag.
/// Disabled instances pass signal through untouched and are excluded
/// from the chain's composite mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInstance {
    pub config: FilterConfig,
    pub enabled: bool,
}

impl FilterInstance {
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self { config: config.clamped(), enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;
    use crate::error::Error;

    #[test]
    fn masks_are_nonnegative_and_symmetric() {
        let sr = 44_100.0;
        let size = 1024;

        let configs = [
            FilterConfig::Plateau {
                center_freq: 1000.0,
                width: 400.0,
                gain_db: 6.0,
                flat_width: 200.0,
            },
            FilterConfig::Gaussian {
                center_freq: 3000.0,
                width: 800.0,
                gain_db: -12.0,
                skew: 2.5,
                kurtosis: 0.7,
            },
            FilterConfig::Parabolic {
                center_freq: 500.0,
                width: 900.0,
                gain_db: 0.0,
                skew: -4.0,
                flatness: 2.0,
            },
        ];

        for config in configs {
            let mut mask = SpectralMask::new(size);
            config.write_mask(&mut mask, sr);

            for i in 0..size {
                assert!(mask[i] >= 0.0);
            }
            for i in 1..size / 2 {
                assert!(
                    within_tolerance(mask[i], mask[size - i], 1e-12),
                    "{config:?} bin {i}"
                );
            }
        }
    }

    #[test]
    fn full_flat_width_plateau_is_rectangular() {
        let sr = 44_100.0;
        let size = 4096;
        let config = FilterConfig::Plateau {
            center_freq: 1000.0,
            width: 400.0,
            gain_db: 0.0,
            flat_width: 400.0,
        };

        let mut mask = SpectralMask::new(size);
        config.write_mask(&mut mask, sr);

        for i in 0..size {
            let freq = SpectralMask::bin_freq(i, size, sr).abs();
            let expected =
                if (freq - 1000.0).abs() <= 200.0 { 1.0 } else { 0.0 };
            assert!(
                within_tolerance(mask[i], expected, 1e-12),
                "bin {i} at {freq} Hz"
            );
        }
    }

    #[test]
    fn gain_scales_the_mask_linearly() {
        let sr = 44_100.0;
        let size = 1024;

        let flat = FilterConfig::Plateau {
            center_freq: 1000.0,
            width: 400.0,
            gain_db: 0.0,
            flat_width: 200.0,
        };
        let mut boosted = flat;
        boosted.set_parameter("gain_db", 6.0).unwrap();

        let mut mask_flat = SpectralMask::new(size);
        let mut mask_boost = SpectralMask::new(size);
        flat.write_mask(&mut mask_flat, sr);
        boosted.write_mask(&mut mask_boost, sr);

        let expected = db_to_level(6.0);
        for i in 0..size {
            assert!(within_tolerance(
                mask_boost[i],
                mask_flat[i] * expected,
                1e-12,
            ));
        }
    }

    #[test]
    fn clamping_is_observable_and_idempotent() {
        let mut config = FilterConfig::default_for(FilterKind::Gaussian);

        config.set_parameter("center_freq", 100_000.0).unwrap();
        assert!(within_tolerance(
            config.parameter("center_freq").unwrap(),
            CENTER_FREQ_RANGE.1,
            0.0,
        ));

        // a second set with the same post-clamp value changes nothing
        let before = config;
        config.set_parameter("center_freq", CENTER_FREQ_RANGE.1).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn flat_width_is_limited_by_width() {
        let mut config = FilterConfig::default_for(FilterKind::Plateau);
        config.set_parameter("width", 300.0).unwrap();
        config.set_parameter("flat_width", 1500.0).unwrap();
        assert!(within_tolerance(
            config.parameter("flat_width").unwrap(),
            300.0,
            0.0,
        ));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut config = FilterConfig::default_for(FilterKind::Plateau);
        assert!(matches!(
            config.set_parameter("kurtosis", 1.0),
            Err(Error::BadParameter(_))
        ));
        assert!(matches!(
            config.parameter("flatness"),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn gaussian_skew_shifts_energy() {
        let up = gaussian(1200.0, 1000.0, 500.0, 3.0, 1.0);
        let down = gaussian(800.0, 1000.0, 500.0, 3.0, 1.0);
        assert!(up > down);

        // no skew is symmetric about the center
        assert!(within_tolerance(
            gaussian(1200.0, 1000.0, 500.0, 0.0, 1.0),
            gaussian(800.0, 1000.0, 500.0, 0.0, 1.0),
            1e-12,
        ));
    }

    #[test]
    fn parabolic_support_is_bounded_by_width() {
        assert!(parabolic(2001.0, 1000.0, 1000.0, 0.0, 1.0).abs() < 1e-12);
        assert!(within_tolerance(
            parabolic(1000.0, 1000.0, 1000.0, 2.0, 1.0),
            1.0,
            1e-12,
        ));
    }
}

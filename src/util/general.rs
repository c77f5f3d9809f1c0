//! General-purpose utility functions.

/// Calculates amplitude in decibels from a linear power level.
#[inline]
pub fn level_to_db(level: f64) -> f64 {
    20.0 * level.log10()
}

/// Calculates the linear power level from amplitude as decibels.
#[inline]
pub fn db_to_level(db_value: f64) -> f64 {
    10.0f64.powf(db_value / 20.0)
}

/// A decibel reading at a presentation boundary. Silence is an explicit
/// variant so that no `-inf` sentinel escapes the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Db {
    Silent,
    Level(f64),
}

impl Db {
    /// Converts a linear level; non-positive levels are `Silent`.
    pub fn from_level(level: f64) -> Self {
        if level > 0.0 {
            Self::Level(level_to_db(level))
        }
        else {
            Self::Silent
        }
    }

    /// Resolves to a plain dB value, substituting `floor` for silence.
    pub fn or_floor(self, floor: f64) -> f64 {
        match self {
            Self::Silent => floor,
            Self::Level(db) => db.max(floor),
        }
    }
}

/// Linearly interpolates between `a` and `b`.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    t.mul_add(b - a, a)
}

/// Returns whether `value` and `target` are equal, with a tolerance of
/// [`f64::EPSILON`].
pub fn eps_eq(value: f64, target: f64) -> bool {
    (target - value).abs() < f64::EPSILON
}

/// Returns whether the difference between `value` and `target` is within
/// the provided `tolerance` value. Useful for checking approximate
/// equality.
pub fn within_tolerance(value: f64, target: f64, tolerance: f64) -> bool {
    (value - target).abs() <= tolerance
}

/// The error function, via the Abramowitz-Stegun five-term approximation
/// (formula 7.1.26). Absolute error is below 1.5e-7 over the real line.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = (P.mul_add(x, 1.0)).recip();
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;

    sign * (1.0 - poly * (-x * x).exp())
}

/// Returns a normalised value representing the logarithmic position of a
/// frequency between `start_hz` and `end_hz`, such that octaves are evenly
/// spaced.
///
/// # Panics
///
/// Panics if `start_hz` is zero or negative.
pub fn freq_log_norm(freq_hz: f64, start_hz: f64, end_hz: f64) -> f64 {
    assert!(start_hz > 0.0);
    let log_start = start_hz.log10();
    let norm = (end_hz.log10() - log_start).recip();

    norm * (freq_hz.log10() - log_start)
}

/// The inverse of [`freq_log_norm()`](freq_log_norm): maps a normalised
/// position back to its frequency.
///
/// # Panics
///
/// Panics if `start_hz` is zero or negative.
pub fn freq_lin_from_log(norm_pos: f64, start_hz: f64, end_hz: f64) -> f64 {
    assert!(start_hz > 0.0);
    let log_start = start_hz.log10();
    let log = norm_pos.mul_add(end_hz.log10() - log_start, log_start);

    10.0_f64.powf(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erf_reference_points() {
        assert!(within_tolerance(erf(0.0), 0.0, 1e-7));
        assert!(within_tolerance(erf(1.0), 0.842_700_79, 1.5e-7));
        assert!(within_tolerance(erf(2.0), 0.995_322_27, 1.5e-7));
        assert!(within_tolerance(erf(-1.0), -erf(1.0), 1e-12));
    }

    #[test]
    fn log_frequency_round_trip() {
        for freq in [20.0, 440.0, 1000.0, 19_999.0] {
            let norm = freq_log_norm(freq, 20.0, 20_000.0);
            assert!(within_tolerance(
                freq_lin_from_log(norm, 20.0, 20_000.0),
                freq,
                1e-6,
            ));
        }
    }
}

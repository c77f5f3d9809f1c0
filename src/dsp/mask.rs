//! Spectral frequency masking.

use std::ops::{Deref, DerefMut};

/// A "spectral mask": one non-negative real gain per FFT bin, applied by
/// pointwise multiplication onto a complex spectrum. Essentially a
/// wrapper around `Vec<f64>`.
///
/// The mask covers the full FFT length using the standard layout where
/// bin `i <= N/2` carries frequency `i * sr / N` and bin `i > N/2`
/// carries `(i - N) * sr / N`. Masks generated from magnitude responses
/// of `|f|` are conjugate-symmetric by construction, so real-FFT
/// consumers only read the first `N/2 + 1` bins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralMask {
    points: Vec<f64>,
}

impl Deref for SpectralMask {
    type Target = Vec<f64>;

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for SpectralMask {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl SpectralMask {
    /// Creates a zeroed mask.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two());
        Self { points: vec![0.0; size] }
    }

    /// Creates a pass-through mask of all ones.
    #[must_use]
    pub fn unity(size: usize) -> Self {
        let mut mask = Self::new(size);
        mask.points.fill(1.0);
        mask
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// Returns the frequency of bin `idx`, negative above Nyquist.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn bin_freq(idx: usize, size: usize, sample_rate: f64) -> f64 {
        assert!(idx < size);
        let k = idx as f64;
        let n = size as f64;

        if idx <= size / 2 {
            k * sample_rate / n
        }
        else {
            (k - n) * sample_rate / n
        }
    }

    /// Pointwise product with another mask of the same size.
    ///
    /// # Panics
    ///
    /// Panics if the sizes differ.
    pub fn multiply(&mut self, other: &SpectralMask) {
        assert_eq!(self.size(), other.size());
        self.points
            .iter_mut()
            .zip(other.iter())
            .for_each(|(a, b)| *a *= *b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;

    #[test]
    fn bin_frequencies_follow_fft_layout() {
        let sr = 48_000.0;
        let n = 8;

        assert!(within_tolerance(SpectralMask::bin_freq(0, n, sr), 0.0, 0.0));
        assert!(within_tolerance(
            SpectralMask::bin_freq(1, n, sr),
            6000.0,
            1e-9,
        ));
        // Nyquist
        assert!(within_tolerance(
            SpectralMask::bin_freq(4, n, sr),
            24_000.0,
            1e-9,
        ));
        // negative frequencies above Nyquist
        assert!(within_tolerance(
            SpectralMask::bin_freq(5, n, sr),
            -18_000.0,
            1e-9,
        ));
        assert!(within_tolerance(
            SpectralMask::bin_freq(7, n, sr),
            -6000.0,
            1e-9,
        ));
    }

    #[test]
    fn multiply_is_pointwise() {
        let mut a = SpectralMask::unity(4);
        let mut b = SpectralMask::unity(4);
        b[2] = 0.5;
        a[2] = 0.5;

        a.multiply(&b);
        assert!(within_tolerance(a[2], 0.25, 1e-15));
        assert!(within_tolerance(a[1], 1.0, 1e-15));
    }
}

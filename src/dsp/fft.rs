//! Planned real FFT kernel with pre-allocated scratch space.

use realfft::{
    num_complex::Complex, ComplexToReal, RealFftPlanner, RealToComplex,
};
use std::sync::Arc;

/// A forward/inverse FFT pair of one power-of-two size. All working
/// buffers are allocated at construction; `forward()` and `inverse()` do
/// not allocate, so the kernel is safe to drive from the audio thread.
///
/// The inverse transform is scaled by `1/N`, so a forward/inverse round
/// trip reproduces its input to within FFT numerical noise.
pub struct FftKernel {
    size: usize,
    fft: Arc<dyn RealToComplex<f64>>,
    ifft: Arc<dyn ComplexToReal<f64>>,
    fwd_scratch: Vec<Complex<f64>>,
    inv_scratch: Vec<Complex<f64>>,
}

impl FftKernel {
    /// # Panics
    ///
    /// Panics if `size` is not a power of two, or is less than `2`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two() && size >= 2);

        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        let fwd_scratch = fft.make_scratch_vec();
        let inv_scratch = ifft.make_scratch_vec();

        Self { size, fft, ifft, fwd_scratch, inv_scratch }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of complex bins produced by the forward transform
    /// (`size / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Returns a zeroed spectrum buffer of the correct length.
    pub fn make_spectrum_vec(&self) -> Vec<Complex<f64>> {
        self.fft.make_output_vec()
    }

    /// Computes the forward transform of `time` into `spectrum`.
    ///
    /// `time` is used as working storage and its contents are not
    /// preserved.
    ///
    /// # Panics
    ///
    /// Panics if `time.len() != size` or `spectrum.len() != size / 2 + 1`.
    pub fn forward(&mut self, time: &mut [f64], spectrum: &mut [Complex<f64>]) {
        self.fft
            .process_with_scratch(time, spectrum, &mut self.fwd_scratch)
            .unwrap();
    }

    /// Computes the inverse transform of `spectrum` into `time`, scaled by
    /// `1/N`. `spectrum` is used as working storage.
    ///
    /// # Panics
    ///
    /// Panics if the buffer lengths do not match the kernel size, or if
    /// the DC or Nyquist bins carry non-zero imaginary parts (they never
    /// do for spectra produced by [`forward()`][Self::forward] and scaled
    /// by real gains).
    pub fn inverse(&mut self, spectrum: &mut [Complex<f64>], time: &mut [f64]) {
        self.ifft
            .process_with_scratch(spectrum, time, &mut self.inv_scratch)
            .unwrap();

        let scale = (self.size as f64).recip();
        time.iter_mut().for_each(|x| *x *= scale);
    }
}

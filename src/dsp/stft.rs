//! Streaming spectral filter: Hann-windowed overlap-add STFT.
//!
//! Adapts the host's small fixed block size to the internal analysis
//! block size by ring-buffering input and output around a windowed
//! FFT -> mask -> IFFT core, overlapping analysis frames four-fold.

use super::{fft::FftKernel, mask::SpectralMask};
use crate::settings::OVERLAP_FACTOR;
use crate::util::window::{hann, multiply_buffers};
use realfft::num_complex::Complex;

/// Sum of the squared Hann window across a four-fold overlap. Dividing
/// the synthesis window by this yields unity throughput for a unity
/// mask.
const OLA_GAIN: f64 = 1.5;

/// A mono streaming spectral processor.
///
/// Input samples are gathered into overlapping Hann-windowed analysis
/// frames of `block_size` samples, hopping by `block_size / 4`. Each
/// frame is transformed, multiplied by the active mask, transformed
/// back, windowed again and overlap-added into the output stream. The
/// processor introduces exactly one analysis block of latency.
///
/// All buffers are allocated at construction; processing never
/// allocates, blocks, or fails.
pub struct SpectralProcessor {
    input_ring: Vec<f64>,
    output_ring: Vec<f64>,
    frame: Vec<f64>,

    /// The current position in the ring buffers. A new frame is
    /// processed whenever this reaches a multiple of the hop size.
    current_pos: usize,

    window: Vec<f64>,
    synthesis_window: Vec<f64>,

    spectrum: Vec<Complex<f64>>,
    fft: FftKernel,
}

impl SpectralProcessor {
    /// # Panics
    ///
    /// Panics if `block_size` is not a power of two, or is smaller than
    /// the overlap factor.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        assert!(block_size.is_power_of_two() && block_size >= OVERLAP_FACTOR);

        let window = hann(block_size);
        let synthesis_window =
            window.iter().map(|w| w / OLA_GAIN).collect::<Vec<_>>();

        Self {
            input_ring: vec![0.0; block_size],
            output_ring: vec![0.0; block_size],
            frame: vec![0.0; block_size],
            current_pos: 0,
            window,
            synthesis_window,
            spectrum: vec![Complex::default(); block_size / 2 + 1],
            fft: FftKernel::new(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.input_ring.len()
    }

    /// Interval between analysis frames, in samples.
    pub fn hop_size(&self) -> usize {
        self.block_size() / OVERLAP_FACTOR
    }

    /// Amount of latency produced by the overlap-add process, in
    /// samples.
    pub fn latency_samples(&self) -> usize {
        self.block_size()
    }

    /// Clears the internal buffers, meaning the next block will be
    /// silent.
    pub fn clear(&mut self) {
        self.input_ring.fill(0.0);
        self.output_ring.fill(0.0);
        self.frame.fill(0.0);
        self.current_pos = 0;
    }

    /// Processes `buffer` in place against `mask`. The mask is read per
    /// analysis frame, so a swapped-in mask takes effect at the next
    /// frame boundary.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the mask size does not match the block
    /// size.
    pub fn process_block(&mut self, buffer: &mut [f64], mask: &SpectralMask) {
        debug_assert_eq!(mask.size(), self.block_size());

        let block_size = self.block_size();
        let hop = self.hop_size();
        let mut processed = 0;

        while processed < buffer.len() {
            let until_next_frame = hop - (self.current_pos % hop);
            let n = until_next_frame.min(buffer.len() - processed);

            for offset in 0..n {
                let pos = self.current_pos + offset;
                let sample = &mut buffer[processed + offset];

                self.input_ring[pos] = *sample;
                *sample = self.output_ring[pos];
                // consumed output must be cleared before frames add
                // into this region again
                self.output_ring[pos] = 0.0;
            }

            processed += n;
            self.current_pos = (self.current_pos + n) % block_size;

            if n == until_next_frame {
                self.process_frame(mask);
            }
        }
    }

    fn process_frame(&mut self, mask: &SpectralMask) {
        copy_ring_to_frame(&mut self.frame, self.current_pos, &self.input_ring);

        multiply_buffers(&mut self.frame, &self.window);

        self.fft.forward(&mut self.frame, &mut self.spectrum);

        // the real spectrum only spans the non-negative frequency bins
        for (bin, &gain) in self.spectrum.iter_mut().zip(mask.iter()) {
            *bin *= gain;
        }

        self.fft.inverse(&mut self.spectrum, &mut self.frame);

        multiply_buffers(&mut self.frame, &self.synthesis_window);

        add_frame_to_ring(&self.frame, self.current_pos, &mut self.output_ring);
    }
}

/// Copies content from a ring buffer into a linear frame, starting at the
/// current position.
#[inline]
fn copy_ring_to_frame(frame: &mut [f64], current_pos: usize, ring: &[f64]) {
    let block_size = ring.len();
    let num_before_wrap = block_size - current_pos;

    frame[..num_before_wrap].copy_from_slice(&ring[current_pos..]);
    frame[num_before_wrap..].copy_from_slice(&ring[..current_pos]);
}

/// Adds a linear frame into a ring buffer, starting at the current
/// position.
#[inline]
fn add_frame_to_ring(frame: &[f64], current_pos: usize, ring: &mut [f64]) {
    let block_size = ring.len();
    let num_before_wrap = block_size - current_pos;

    for (frame, ring) in
        frame[..num_before_wrap].iter().zip(&mut ring[current_pos..])
    {
        *ring += *frame;
    }
    for (frame, ring) in
        frame[num_before_wrap..].iter().zip(&mut ring[..current_pos])
    {
        *ring += *frame;
    }
}

//! Real-time spectrum analysis of the mix bus.
//!
//! The audio thread taps the pre-master-gain mix into a bounded channel
//! of fixed-size blocks; the analyzer drains the channel on the display
//! thread, windows the most recent samples and produces dB magnitude
//! spectra with optional exponential smoothing and frame averaging.

use crate::dsp::fft::FftKernel;
use crate::error::{Error, Result};
use crate::prelude::*;
use crate::util::window::{hann, multiply_buffers, WindowType};
use realfft::num_complex::Complex;

/// The FFT sizes the analyzer may be configured with.
pub const ANALYZER_FFT_SIZES: [usize; 5] = [512, 1024, 2048, 4096, 8192];

const DEFAULT_FFT_SIZE: usize = 2048;

/// One host block of mix samples, copied into a fixed-size body so the
/// audio thread can send it without allocating.
#[derive(Debug, Clone, Copy)]
pub struct TapBlock {
    pub data: [f64; MAX_HOST_BLOCK_SIZE],
    pub len: usize,
}

impl Default for TapBlock {
    fn default() -> Self {
        Self { data: [0.0; MAX_HOST_BLOCK_SIZE], len: 0 }
    }
}

/// How pixel columns map to frequencies in
/// [`display_data()`](SpectrumAnalyzer::display_data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyScale {
    #[default]
    Logarithmic,
    Linear,
}

/// Windowed magnitude-spectrum analyzer over the latest mix samples.
pub struct SpectrumAnalyzer {
    tap: CCReceiver<TapBlock>,
    sample_rate: f64,

    /// Rolling history of the most recent mix samples, sized to the
    /// largest supported FFT.
    ring: Vec<f64>,
    write_pos: usize,

    fft_size: usize,
    fft: FftKernel,
    window: Vec<f64>,
    window_sum: f64,
    frame: Vec<f64>,
    spectrum: Vec<Complex<f64>>,

    /// The last few raw dB frames, for the moving average.
    history: Vec<Vec<f64>>,
    history_pos: usize,
    history_filled: usize,

    /// Exponentially smoothed output frame.
    smoothed: Vec<f64>,
    primed: bool,

    smoothing: f64,
    average_frames: usize,
    scale: FrequencyScale,

    /// Display metadata only; analysis frames always use Hann.
    window_type: WindowType,
}

impl SpectrumAnalyzer {
    pub(crate) fn new(tap: CCReceiver<TapBlock>, sample_rate: f64) -> Self {
        let fft_size = DEFAULT_FFT_SIZE;
        let window = hann(fft_size);
        let window_sum = window.iter().sum();

        Self {
            tap,
            sample_rate,
            ring: vec![0.0; MAX_ANALYZER_FFT_SIZE],
            write_pos: 0,
            fft_size,
            fft: FftKernel::new(fft_size),
            window,
            window_sum,
            frame: vec![0.0; fft_size],
            spectrum: vec![Complex::default(); fft_size / 2 + 1],
            history: vec![vec![MINUS_INFINITY_DB; fft_size / 2 + 1]],
            history_pos: 0,
            history_filled: 0,
            smoothed: vec![MINUS_INFINITY_DB; fft_size / 2 + 1],
            primed: false,
            smoothing: 0.0,
            average_frames: 1,
            scale: FrequencyScale::default(),
            window_type: WindowType::default(),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Reconfigures the FFT size and resets all averaging state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] if `size` is not one of
    /// [`ANALYZER_FFT_SIZES`].
    pub fn set_fft_size(&mut self, size: usize) -> Result<()> {
        if !ANALYZER_FFT_SIZES.contains(&size) {
            return Err(Error::BadParameter(format!(
                "unsupported analyzer FFT size {size}"
            )));
        }

        self.fft_size = size;
        self.fft = FftKernel::new(size);
        self.window = hann(size);
        self.window_sum = self.window.iter().sum();
        self.frame = vec![0.0; size];
        self.spectrum = vec![Complex::default(); size / 2 + 1];
        self.reset_averaging();
        Ok(())
    }

    /// Sets the exponential smoothing time constant, clamped to
    /// `[0, 0.95]`. Zero disables smoothing.
    pub fn set_smoothing(&mut self, tau: f64) {
        self.smoothing = tau.clamp(0.0, 0.95);
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Sets the moving-average length in frames, clamped to `[1, 10]`.
    pub fn set_averaging(&mut self, frames: usize) {
        self.average_frames = frames.clamp(1, 10);
        self.reset_averaging();
    }

    pub fn averaging(&self) -> usize {
        self.average_frames
    }

    pub fn set_scale(&mut self, scale: FrequencyScale) {
        self.scale = scale;
    }

    pub fn scale(&self) -> FrequencyScale {
        self.scale
    }

    /// The display window type. Metadata for the display pipeline; the
    /// analyzer's own frames are always Hann-windowed.
    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn set_window_type(&mut self, window_type: WindowType) {
        self.window_type = window_type;
    }

    /// Drains pending mix blocks and recomputes the output spectrum.
    pub fn update(&mut self) {
        let mut received = false;

        while let Ok(block) = self.tap.try_recv() {
            received = true;
            for &sample in &block.data[..block.len] {
                self.ring[self.write_pos] = sample;
                self.write_pos = (self.write_pos + 1) % self.ring.len();
            }
        }

        if received || !self.primed {
            self.compute_frame();
        }
    }

    /// Returns one dB value per pixel column, mapping columns through
    /// the configured frequency scale over `[20, 20000]` Hz. Values are
    /// floored at -100 dB; range clipping beyond that is left to the
    /// display consumer.
    pub fn display_data(&mut self, pixel_width: usize) -> Vec<f64> {
        self.update();

        let num_bins = self.fft_size / 2 + 1;
        let mut out = Vec::with_capacity(pixel_width);

        for x in 0..pixel_width {
            let t = if pixel_width > 1 {
                x as f64 / (pixel_width - 1) as f64
            }
            else {
                0.0
            };

            let freq = match self.scale {
                FrequencyScale::Logarithmic => {
                    freq_lin_from_log(t, MIN_FILTER_FREQ, MAX_FILTER_FREQ)
                }
                FrequencyScale::Linear => {
                    lerp(MIN_FILTER_FREQ, MAX_FILTER_FREQ, t)
                }
            };

            let bin_pos = (freq / self.sample_rate * self.fft_size as f64)
                .clamp(0.0, (num_bins - 1) as f64);
            let lower = bin_pos.floor() as usize;
            let upper = (lower + 1).min(num_bins - 1);

            out.push(lerp(
                self.smoothed[lower],
                self.smoothed[upper],
                bin_pos - lower as f64,
            ));
        }

        out
    }

    fn compute_frame(&mut self) {
        let num_bins = self.fft_size / 2 + 1;

        // most recent fft_size samples, oldest first
        let ring_len = self.ring.len();
        let start = (self.write_pos + ring_len - self.fft_size) % ring_len;
        for (i, x) in self.frame.iter_mut().enumerate() {
            *x = self.ring[(start + i) % ring_len];
        }

        multiply_buffers(&mut self.frame, &self.window);
        self.fft.forward(&mut self.frame, &mut self.spectrum);

        // amplitude-corrected magnitudes in dB
        let norm = 2.0 / self.window_sum;
        let raw = &mut self.history[self.history_pos];
        for (db, bin) in raw.iter_mut().zip(self.spectrum.iter()) {
            *db = Db::from_level(bin.norm() * norm)
                .or_floor(MINUS_INFINITY_DB);
        }

        self.history_pos = (self.history_pos + 1) % self.history.len();
        self.history_filled = (self.history_filled + 1).min(self.history.len());

        for i in 0..num_bins {
            let mut sum = 0.0;
            for frame in self.history.iter().take(self.history_filled) {
                sum += frame[i];
            }
            let averaged = sum / self.history_filled as f64;

            self.smoothed[i] = if self.primed {
                self.smoothing
                    .mul_add(self.smoothed[i], (1.0 - self.smoothing) * averaged)
            }
            else {
                averaged
            };
        }

        self.primed = true;
    }

    fn reset_averaging(&mut self) {
        let num_bins = self.fft_size / 2 + 1;
        self.history =
            vec![vec![MINUS_INFINITY_DB; num_bins]; self.average_frames];
        self.history_pos = 0;
        self.history_filled = 0;
        self.smoothed = vec![MINUS_INFINITY_DB; num_bins];
        self.primed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn feed_sine(
        tx: &CCSender<TapBlock>,
        freq: f64,
        sample_rate: f64,
        num_blocks: usize,
    ) {
        let mut n = 0usize;
        for _ in 0..num_blocks {
            let mut block = TapBlock::default();
            for x in block.data.iter_mut() {
                *x = (TAU * freq * n as f64 / sample_rate).sin() * 0.5;
                n += 1;
            }
            block.len = MAX_HOST_BLOCK_SIZE;
            tx.send(block).unwrap();
        }
    }

    #[test]
    fn sine_peaks_at_its_frequency() {
        let sr = 44_100.0;
        let (tx, rx) = bounded_channel(256);
        let mut analyzer = SpectrumAnalyzer::new(rx, sr);
        analyzer.set_fft_size(4096).unwrap();

        feed_sine(&tx, 1000.0, sr, 64);

        let width = 512;
        let data = analyzer.display_data(width);
        assert_eq!(data.len(), width);

        let peak_px = data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let t = peak_px as f64 / (width - 1) as f64;
        let peak_freq = freq_lin_from_log(t, MIN_FILTER_FREQ, MAX_FILTER_FREQ);

        // within the resolution of one display column
        assert!(
            (peak_freq / 1000.0).log2().abs() < 0.05,
            "peak at {peak_freq} Hz"
        );

        // near -6 dBFS for a 0.5 amplitude sine, allowing for window
        // scalloping and inter-bin interpolation
        assert!((data[peak_px] + 6.0).abs() < 2.5, "peak {}", data[peak_px]);
    }

    #[test]
    fn silence_reads_as_the_floor() {
        let (tx, rx) = bounded_channel(16);
        let mut analyzer = SpectrumAnalyzer::new(rx, 44_100.0);

        tx.send(TapBlock { len: MAX_HOST_BLOCK_SIZE, ..TapBlock::default() })
            .unwrap();

        let data = analyzer.display_data(64);
        assert!(data.iter().all(|&db| db <= MINUS_INFINITY_DB + 1e-9));
    }

    #[test]
    fn reconfiguration_resets_state() {
        let (tx, rx) = bounded_channel(256);
        let mut analyzer = SpectrumAnalyzer::new(rx, 44_100.0);

        feed_sine(&tx, 440.0, 44_100.0, 32);
        analyzer.update();

        analyzer.set_fft_size(512).unwrap();
        assert_eq!(analyzer.fft_size(), 512);

        // parameters clamp into range
        analyzer.set_smoothing(2.0);
        assert!(within_tolerance(analyzer.smoothing(), 0.95, 0.0));
        analyzer.set_averaging(50);
        assert_eq!(analyzer.averaging(), 10);

        assert!(analyzer.set_fft_size(777).is_err());
    }
}

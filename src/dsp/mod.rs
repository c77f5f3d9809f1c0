//! Digital signal processors and primitives.

pub mod biquad;
pub mod fft;
pub mod mask;
pub mod noise;
pub mod stft;

pub use biquad::{BiquadFilter, BiquadKind, BiquadParams};
pub use fft::FftKernel;
pub use mask::SpectralMask;
pub use noise::Lcg;
pub use stft::SpectralProcessor;

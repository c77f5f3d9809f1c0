//! Immutable configuration snapshots for offline rendering.
//!
//! Workers never share mutable state: every render captures the track
//! set into plain data, and each worker reads the same frozen snapshot.

use crate::dsp::{biquad::BiquadParams, mask::SpectralMask};
use crate::engine::chain::composite_of;
use crate::engine::filter::FilterInstance;

/// The frozen state of one track.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    /// Seed for the track's offline noise stream. Noise at any absolute
    /// sample offset is independent of chunking, which keeps chunked
    /// and direct renders identical for pass-through chains.
    pub seed: u32,
    /// Base position within the noise stream. Clip sequencing advances
    /// this so consecutive clips draw fresh noise.
    pub stream_offset: u64,
    pub gain: f64,
    pub muted: bool,
    pub filters: Vec<FilterInstance>,
    pub passthrough: Vec<BiquadParams>,
}

impl TrackSnapshot {
    /// Whether the track contributes to the render at all.
    pub fn is_audible(&self) -> bool {
        !self.muted && self.gain > 0.0
    }

    /// Whether any spectral filtering applies.
    pub fn has_spectral_filters(&self) -> bool {
        self.filters.iter().any(|f| f.enabled)
    }

    /// The track's composite mask at an arbitrary FFT size.
    #[must_use]
    pub fn composite_mask(
        &self,
        size: usize,
        sample_rate: f64,
    ) -> SpectralMask {
        composite_of(&self.filters, size, sample_rate)
    }
}

/// The frozen state of the whole mix. Master gain is intentionally
/// absent: export bypasses playback volume.
#[derive(Debug, Clone)]
pub struct MixSnapshot {
    pub sample_rate: f64,
    pub tracks: Vec<TrackSnapshot>,
}

impl MixSnapshot {
    /// An empty mix at the provided rate.
    #[must_use]
    pub fn empty(sample_rate: f64) -> Self {
        Self { sample_rate, tracks: Vec::new() }
    }

    /// A copy of this snapshot rendered at a different sample rate.
    /// Filter configurations are rate-independent, so only the rate
    /// changes.
    #[must_use]
    pub fn at_sample_rate(&self, sample_rate: f64) -> Self {
        Self { sample_rate, tracks: self.tracks.clone() }
    }
}

//! The control-side track model.

use super::chain::FilterChain;

/// One noise track: a noise source (audio-side), a filter chain, a
/// linear gain and a mute flag. Tracks are identified by their position
/// in the [`TrackManager`](super::manager::TrackManager).
///
/// This is the control thread's view; the audible state lives in the
/// matching [`TrackDsp`](super::audio::TrackDsp) on the audio thread and
/// follows this model through the command channel.
pub struct Track {
    chain: FilterChain,
    gain: f64,
    muted: bool,
    playing: bool,
}

impl Track {
    pub(crate) fn new(chain: FilterChain) -> Self {
        Self { chain, gain: 1.0, muted: false, playing: false }
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Mutable access to the filter chain. Chain mutations publish their
    /// composite mask to the audio thread directly.
    pub fn chain_mut(&mut self) -> &mut FilterChain {
        &mut self.chain
    }

    /// The track's linear gain in `[0, 1]`.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn set_gain(&mut self, gain: f64) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }
}

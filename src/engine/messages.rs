//! Typed messages between the control thread and the audio engine.
//!
//! The audio thread drains its command channel once per host block and
//! applies every command at the block boundary. Replies flow back over a
//! bounded channel; the audio thread only ever `try_send`s so it can
//! never block on a slow consumer.

use super::audio::TrackDsp;
use crate::dsp::biquad::BiquadParams;

/// Most pass-through sections a track carries.
pub const MAX_PASSTHROUGH_SECTIONS: usize = 4;

/// A fixed-capacity set of pass-through section parameters. Sized so
/// the audio thread can rebuild its filters without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PassthroughConfig {
    sections: [BiquadParams; MAX_PASSTHROUGH_SECTIONS],
    len: usize,
}

impl PassthroughConfig {
    /// Captures up to [`MAX_PASSTHROUGH_SECTIONS`] sections from a
    /// slice; any excess is ignored.
    pub fn from_slice(params: &[BiquadParams]) -> Self {
        let mut config = Self::default();
        for (dst, &src) in config.sections.iter_mut().zip(params) {
            *dst = src;
        }
        config.len = params.len().min(MAX_PASSTHROUGH_SECTIONS);
        config
    }

    pub fn iter(&self) -> impl Iterator<Item = &BiquadParams> {
        self.sections[..self.len].iter()
    }
}

/// Commands consumed by the audio engine.
pub enum EngineCommand {
    /// Installs a fully constructed track. The DSP state is built on the
    /// control thread so the audio thread never allocates.
    AddTrack(Box<TrackDsp>),
    /// Removes the track at `index`; later indices shift down. The
    /// removed state is sent back over the retirement channel for
    /// deallocation off the audio thread.
    RemoveTrack { index: usize },
    /// Starts playback on a track with a fresh noise seed.
    StartTrack { index: usize, seed: u32 },
    /// Ramps a track down and pauses its noise source.
    StopTrack { index: usize },
    SetTrackGain { index: usize, gain: f64 },
    SetTrackMuted { index: usize, muted: bool },
    /// Replaces a track's time-domain pass-through sections.
    SetPassthrough { index: usize, sections: PassthroughConfig },
    SetMasterGain { gain: f64 },
    GetPerformance,
    GetFftInfo,
}

/// Replies produced by the audio engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineReply {
    /// Sent once when the engine comes online.
    Initialized { sample_rate: f64, max_block_size: usize },
    Performance(PerformanceReport),
    FftInfo(FftInfo),
    /// A one-shot diagnostic from the audio thread. The block that
    /// raised it was zero-filled; the engine keeps running.
    Error(DiagnosticEvent),
}

/// Rolling DSP-load figures, as fractions of the callback deadline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceReport {
    pub average_load: f64,
    pub peak_load: f64,
}

/// Static facts about the spectral processing configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FftInfo {
    pub fft_size: usize,
    pub hop_size: usize,
    pub latency_samples: usize,
    pub sample_rate: f64,
}

/// An audio-thread error report. Carries only static strings; the audio
/// thread never formats or allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub context: &'static str,
    pub detail: &'static str,
}

//! The audio-thread half of the engine.
//!
//! [`AudioEngine::process`] is the host callback body. It drains the
//! command channel once per block, renders every track in id order into
//! the mix bus, taps the mix for the analyzer ahead of master gain, and
//! never allocates, blocks, locks, or fails loudly: internal errors
//! zero-fill the block and raise a one-shot diagnostic.

use super::analyzer::TapBlock;
use super::chain::MaskReader;
use super::messages::*;
use crate::dsp::{biquad::BiquadFilter, noise::Lcg, stft::SpectralProcessor};
use crate::prelude::*;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Instant;

/// Per-track audio-thread state. Constructed on the control thread and
/// shipped to the audio thread inside an
/// [`EngineCommand::AddTrack`]; sent back whole for deallocation when
/// the track is removed.
pub struct TrackDsp {
    noise: Lcg,
    playing: bool,
    /// Set while ramping down ahead of pausing the noise source.
    stopping: bool,
    muted: bool,

    /// The track's configured gain; `gain` ramps toward this (or zero)
    /// over the click-suppression period.
    target_gain: f64,
    gain: Smoother,

    passthrough: Vec<BiquadFilter>,
    stft: SpectralProcessor,
    mask_rx: MaskReader,
}

impl TrackDsp {
    pub(crate) fn new(sample_rate: f64, mask_rx: MaskReader) -> Self {
        Self {
            noise: Lcg::new(1),
            playing: false,
            stopping: false,
            muted: false,
            target_gain: 1.0,
            gain: Smoother::new(GAIN_RAMP_MS, 0.0, sample_rate),
            passthrough: Vec::with_capacity(MAX_PASSTHROUGH_SECTIONS),
            stft: SpectralProcessor::new(SPECTRAL_BLOCK_SIZE),
            mask_rx,
        }
    }

    fn start(&mut self, seed: u32) {
        // reseeded on every playback start
        self.noise = Lcg::new(seed);

        if !self.playing {
            self.gain.reset_to(0.0);
        }
        self.playing = true;
        self.stopping = false;
        self.retarget_gain();
    }

    fn stop(&mut self) {
        if self.playing && !self.stopping {
            self.stopping = true;
            self.gain.set_target_value(0.0);
        }
    }

    fn set_gain(&mut self, gain: f64) {
        self.target_gain = gain.clamp(0.0, 1.0);
        if self.playing && !self.stopping {
            self.retarget_gain();
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if self.playing && !self.stopping {
            self.retarget_gain();
        }
    }

    fn retarget_gain(&mut self) {
        let target = if self.muted { 0.0 } else { self.target_gain };
        self.gain.set_target_value(target);
    }

    /// Finishes a pending stop once the down-ramp has settled.
    fn settle(&mut self) {
        if self.stopping && !self.gain.is_active() {
            self.playing = false;
            self.stopping = false;
        }
    }
}

/// Rolling DSP load over the most recent callbacks, as a fraction of
/// the block deadline.
#[derive(Debug)]
struct LoadMonitor {
    window: [f64; Self::WINDOW],
    pos: usize,
    filled: usize,
}

impl LoadMonitor {
    const WINDOW: usize = 128;

    fn new() -> Self {
        Self { window: [0.0; Self::WINDOW], pos: 0, filled: 0 }
    }

    fn update(&mut self, load: f64) {
        self.window[self.pos] = load;
        self.pos = (self.pos + 1) % Self::WINDOW;
        self.filled = (self.filled + 1).min(Self::WINDOW);
    }

    fn report(&self) -> PerformanceReport {
        if self.filled == 0 {
            return PerformanceReport::default();
        }

        let window = &self.window[..self.filled];
        PerformanceReport {
            average_load: window.iter().sum::<f64>() / self.filled as f64,
            peak_load: window.iter().copied().fold(0.0, f64::max),
        }
    }
}

/// The real-time engine. Owns the track DSP states and the mix bus.
pub struct AudioEngine {
    sample_rate: f64,
    max_block_size: usize,

    tracks: Vec<Box<TrackDsp>>,
    track_scratch: Vec<f64>,
    mix: Vec<f64>,

    master_gain: Smoother,

    commands: CCReceiver<EngineCommand>,
    replies: CCSender<EngineReply>,
    retired: CCSender<Box<TrackDsp>>,
    tap: CCSender<TapBlock>,

    load: LoadMonitor,
    /// The most recent per-block load, shared with the control thread.
    load_shared: Arc<AtomicF64>,
    diagnostic_pending: bool,
}

impl AudioEngine {
    pub(crate) fn new(
        sample_rate: f64,
        max_block_size: usize,
        commands: CCReceiver<EngineCommand>,
        replies: CCSender<EngineReply>,
        retired: CCSender<Box<TrackDsp>>,
        tap: CCSender<TapBlock>,
        load_shared: Arc<AtomicF64>,
    ) -> Self {
        Self {
            sample_rate,
            max_block_size,
            tracks: Vec::with_capacity(MAX_TRACKS),
            track_scratch: vec![0.0; max_block_size],
            mix: vec![0.0; max_block_size],
            master_gain: Smoother::new(GAIN_RAMP_MS, 1.0, sample_rate),
            commands,
            replies,
            retired,
            tap,
            load: LoadMonitor::new(),
            load_shared,
            diagnostic_pending: false,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Amount of latency introduced between a track's noise source and
    /// the engine output.
    pub fn latency_samples(&self) -> usize {
        SPECTRAL_BLOCK_SIZE
    }

    /// The audio host callback. `_input` is accepted per the host
    /// contract but unused: all signal originates from the internal
    /// noise sources. Returns `true` to keep the stream running.
    pub fn process(&mut self, _input: &[f32], output: &mut [f32]) -> bool {
        let started = Instant::now();

        let block_len = output.len();
        if block_len == 0 || block_len > self.max_block_size {
            output.iter_mut().for_each(|x| *x = 0.0);
            self.diagnostic("process", "host block size out of contract");
            return true;
        }

        self.drain_commands();

        let Self { tracks, track_scratch, mix, .. } = self;
        let scratch = &mut track_scratch[..block_len];
        mix[..block_len].fill(0.0);

        // summing in track-id order keeps the mix bit-stable
        for track in tracks.iter_mut() {
            let TrackDsp {
                noise, playing, passthrough, stft, mask_rx, gain, ..
            } = track.as_mut();

            if *playing {
                for x in scratch.iter_mut() {
                    *x = noise.next_sample();
                }
            }
            else {
                scratch.fill(0.0);
            }

            for section in passthrough.iter_mut() {
                for x in scratch.iter_mut() {
                    *x = section.process(*x);
                }
            }

            stft.process_block(scratch, mask_rx.read().as_ref());

            for (out, x) in mix[..block_len].iter_mut().zip(scratch.iter()) {
                *out += x * gain.next();
            }

            track.settle();
        }

        // the analyzer taps the mix ahead of master gain, so the display
        // is invariant under playback volume
        self.send_tap(block_len);

        let Self { mix, master_gain, .. } = self;
        for (out, &sample) in output.iter_mut().zip(mix[..block_len].iter()) {
            *out = (sample * master_gain.next()) as f32;
        }

        let deadline = block_len as f64 / self.sample_rate;
        let load = started.elapsed().as_secs_f64() / deadline;
        self.load.update(load);
        self.load_shared.store(load, Relaxed);
        self.diagnostic_pending = false;

        true
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::AddTrack(track) => {
                    if self.tracks.len() < self.tracks.capacity() {
                        self.tracks.push(track);
                    }
                    else {
                        self.diagnostic("add_track", "track capacity reached");
                    }
                }
                EngineCommand::RemoveTrack { index } => {
                    if index < self.tracks.len() {
                        let track = self.tracks.remove(index);
                        // deallocate off the audio thread
                        if self.retired.try_send(track).is_err() {
                            self.diagnostic(
                                "remove_track",
                                "retirement channel full",
                            );
                        }
                    }
                }
                EngineCommand::StartTrack { index, seed } => {
                    if let Some(track) = self.tracks.get_mut(index) {
                        track.start(seed);
                    }
                }
                EngineCommand::StopTrack { index } => {
                    if let Some(track) = self.tracks.get_mut(index) {
                        track.stop();
                    }
                }
                EngineCommand::SetTrackGain { index, gain } => {
                    if let Some(track) = self.tracks.get_mut(index) {
                        track.set_gain(gain);
                    }
                }
                EngineCommand::SetTrackMuted { index, muted } => {
                    if let Some(track) = self.tracks.get_mut(index) {
                        track.set_muted(muted);
                    }
                }
                EngineCommand::SetPassthrough { index, sections } => {
                    if let Some(track) = self.tracks.get_mut(index) {
                        // capacity is pre-reserved, so this never allocates
                        track.passthrough.clear();
                        for &params in sections.iter() {
                            track.passthrough.push(BiquadFilter::new(
                                params,
                                self.sample_rate,
                            ));
                        }
                    }
                }
                EngineCommand::SetMasterGain { gain } => {
                    self.master_gain.set_target_value(gain.clamp(0.0, 1.0));
                }
                EngineCommand::GetPerformance => {
                    let _ = self
                        .replies
                        .try_send(EngineReply::Performance(self.load.report()));
                }
                EngineCommand::GetFftInfo => {
                    let _ = self.replies.try_send(EngineReply::FftInfo(FftInfo {
                        fft_size: SPECTRAL_BLOCK_SIZE,
                        hop_size: HOP_SIZE,
                        latency_samples: SPECTRAL_BLOCK_SIZE,
                        sample_rate: self.sample_rate,
                    }));
                }
            }
        }
    }

    fn send_tap(&mut self, block_len: usize) {
        let mut block = TapBlock::default();
        block.data[..block_len].copy_from_slice(&self.mix[..block_len]);
        block.len = block_len;
        let _ = self.tap.try_send(block);
    }

    fn diagnostic(&mut self, context: &'static str, detail: &'static str) {
        if !self.diagnostic_pending {
            let _ = self.replies.try_send(EngineReply::Error(
                DiagnosticEvent { context, detail },
            ));
            self.diagnostic_pending = true;
        }
    }
}

//! Track management: the control-side owner of the mix.

use super::analyzer::SpectrumAnalyzer;
use super::audio::{AudioEngine, TrackDsp};
use super::chain::{mask_channel, FilterChain};
use super::messages::*;
use super::track::Track;
use crate::dsp::noise::random_seed;
use crate::error::{Error, Result};
use crate::prelude::*;
use crate::render::snapshot::{MixSnapshot, TrackSnapshot};
use std::sync::Arc;

const COMMAND_QUEUE_CAPACITY: usize = 1024;
const REPLY_QUEUE_CAPACITY: usize = 64;

/// Owns the ordered track set and the command channel into the audio
/// engine. Track ids are positional; removing a track shifts later ids
/// down on both sides of the channel, so ids stay consistent.
pub struct TrackManager {
    tracks: Vec<Track>,
    master_gain: f64,
    playing: bool,
    sample_rate: f64,

    commands: CCSender<EngineCommand>,
    replies: CCReceiver<EngineReply>,
    retired: CCReceiver<Box<TrackDsp>>,
    load_shared: Arc<AtomicF64>,
}

impl TrackManager {
    /// Builds a connected control/audio/analyzer triple.
    ///
    /// `max_block_size` is the host's fixed callback length and must be
    /// one of 64, 128 or 256.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the host configuration is out
    /// of contract.
    pub fn build(
        sample_rate: f64,
        max_block_size: usize,
    ) -> Result<(Self, AudioEngine, SpectrumAnalyzer)> {
        if !matches!(max_block_size, 64 | 128 | 256) {
            return Err(Error::Unsupported("host block size must be 64, 128 or 256"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::Unsupported("sample rate must be positive"));
        }

        let (command_tx, command_rx) = bounded_channel(COMMAND_QUEUE_CAPACITY);
        let (reply_tx, reply_rx) = bounded_channel(REPLY_QUEUE_CAPACITY);
        let (retired_tx, retired_rx) = bounded_channel(MAX_TRACKS);
        let (tap_tx, tap_rx) = bounded_channel(ANALYZER_TAP_CAPACITY);

        let _ = reply_tx.try_send(EngineReply::Initialized {
            sample_rate,
            max_block_size,
        });

        let load_shared = Arc::new(AtomicF64::new(0.0));
        let engine = AudioEngine::new(
            sample_rate,
            max_block_size,
            command_rx,
            reply_tx,
            retired_tx,
            tap_tx,
            Arc::clone(&load_shared),
        );
        let analyzer = SpectrumAnalyzer::new(tap_rx, sample_rate);

        let manager = Self {
            tracks: Vec::new(),
            master_gain: 1.0,
            playing: false,
            sample_rate,
            commands: command_tx,
            replies: reply_rx,
            retired: retired_rx,
            load_shared,
        };

        Ok((manager, engine, analyzer))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Whether `start_all()` is in effect.
    pub fn playing(&self) -> bool {
        self.playing
    }

    /// Creates a track and returns its id. If the mix is currently
    /// playing, the new track soft-joins it immediately.
    pub fn add_track(&mut self) -> usize {
        let (mask_tx, mask_rx) = mask_channel(SPECTRAL_BLOCK_SIZE);
        let chain =
            FilterChain::new(SPECTRAL_BLOCK_SIZE, self.sample_rate, mask_tx);
        let dsp = Box::new(TrackDsp::new(self.sample_rate, mask_rx));

        self.tracks.push(Track::new(chain));
        let id = self.tracks.len() - 1;

        self.send(EngineCommand::AddTrack(dsp));

        if self.playing {
            // the engine processes commands in order, so the start lands
            // after the insertion
            let _ = self.start_track(id);
        }

        id
    }

    /// Removes the track with id `id`; later ids shift down.
    pub fn remove_track(&mut self, id: usize) -> Result<()> {
        self.check_index(id)?;
        self.tracks.remove(id);
        self.send(EngineCommand::RemoveTrack { index: id });
        Ok(())
    }

    pub fn track(&self, id: usize) -> Result<&Track> {
        self.tracks.get(id).ok_or(Error::bad_track_index(id))
    }

    pub fn track_mut(&mut self, id: usize) -> Result<&mut Track> {
        self.tracks.get_mut(id).ok_or(Error::bad_track_index(id))
    }

    /// Starts playback on one track with a fresh noise seed, ramping
    /// its gain up over the click-suppression period.
    pub fn start_track(&mut self, id: usize) -> Result<()> {
        self.check_index(id)?;
        self.tracks[id].set_playing(true);
        self.send(EngineCommand::StartTrack { index: id, seed: random_seed() });
        Ok(())
    }

    /// Ramps one track down and pauses its noise source. Idempotent.
    pub fn stop_track(&mut self, id: usize) -> Result<()> {
        self.check_index(id)?;
        self.tracks[id].set_playing(false);
        self.send(EngineCommand::StopTrack { index: id });
        Ok(())
    }

    pub fn set_gain(&mut self, id: usize, gain: f64) -> Result<()> {
        self.check_index(id)?;
        self.tracks[id].set_gain(gain);
        let clamped = self.tracks[id].gain();
        self.send(EngineCommand::SetTrackGain { index: id, gain: clamped });
        Ok(())
    }

    pub fn set_muted(&mut self, id: usize, muted: bool) -> Result<()> {
        self.check_index(id)?;
        self.tracks[id].set_muted(muted);
        self.send(EngineCommand::SetTrackMuted { index: id, muted });
        Ok(())
    }

    /// Pushes a track's pass-through sections to the audio thread.
    /// Call after mutating them via
    /// [`FilterChain::set_passthrough`].
    pub fn sync_passthrough(&mut self, id: usize) -> Result<()> {
        self.check_index(id)?;
        let sections =
            PassthroughConfig::from_slice(self.tracks[id].chain().passthrough());
        self.send(EngineCommand::SetPassthrough { index: id, sections });
        Ok(())
    }

    pub fn start_all(&mut self) {
        self.playing = true;
        for id in 0..self.tracks.len() {
            let _ = self.start_track(id);
        }
    }

    pub fn stop_all(&mut self) {
        self.playing = false;
        for id in 0..self.tracks.len() {
            let _ = self.stop_track(id);
        }
    }

    /// Master playback volume in `[0, 1]`. Applied after the analyzer
    /// tap and bypassed entirely by offline export.
    pub fn set_master_gain(&mut self, gain: f64) {
        self.master_gain = gain.clamp(0.0, 1.0);
        self.send(EngineCommand::SetMasterGain { gain: self.master_gain });
    }

    pub fn master_gain(&self) -> f64 {
        self.master_gain
    }

    /// The most recent audio-callback load as a fraction of its
    /// deadline, without a command round-trip.
    pub fn dsp_load(&self) -> f64 {
        self.load_shared.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Asks the audio thread for a performance report; the reply arrives
    /// via [`poll()`](Self::poll) after the next processed block.
    pub fn request_performance(&self) {
        self.send(EngineCommand::GetPerformance);
    }

    /// Asks the audio thread for its FFT configuration; the reply
    /// arrives via [`poll()`](Self::poll) after the next processed
    /// block.
    pub fn request_fft_info(&self) {
        self.send(EngineCommand::GetFftInfo);
    }

    /// Drains replies and diagnostics from the audio thread. Also
    /// deallocates any retired track state.
    pub fn poll(&mut self) -> Vec<EngineReply> {
        // retired DSP state is dropped here, off the audio thread
        while self.retired.try_recv().is_ok() {}

        self.replies.try_iter().collect()
    }

    /// Captures an immutable configuration snapshot for the offline
    /// renderer. Each track receives a fresh noise seed.
    pub fn snapshot(&self) -> MixSnapshot {
        MixSnapshot {
            sample_rate: self.sample_rate,
            tracks: self
                .tracks
                .iter()
                .map(|track| TrackSnapshot {
                    seed: random_seed(),
                    stream_offset: 0,
                    gain: track.gain(),
                    muted: track.muted(),
                    filters: track.chain().instances().to_vec(),
                    passthrough: track.chain().passthrough().to_vec(),
                })
                .collect(),
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.commands.try_send(command).is_err() {
            log::warn!("engine command queue is full; command dropped");
        }
    }

    fn check_index(&self, id: usize) -> Result<()> {
        if id < self.tracks.len() {
            Ok(())
        }
        else {
            Err(Error::bad_track_index(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter::FilterKind;

    const BLOCK: usize = 128;

    fn run_blocks(engine: &mut AudioEngine, num: usize) -> Vec<f32> {
        let input = [0.0f32; BLOCK];
        let mut out = Vec::with_capacity(num * BLOCK);
        for _ in 0..num {
            let mut block = [0.0f32; BLOCK];
            assert!(engine.process(&input, &mut block));
            out.extend_from_slice(&block);
        }
        out
    }

    #[test]
    fn rejects_out_of_contract_hosts() {
        assert!(matches!(
            TrackManager::build(44_100.0, 100),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            TrackManager::build(0.0, 128),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn reports_initialized_and_fft_info() {
        let (mut manager, mut engine, _analyzer) =
            TrackManager::build(48_000.0, 128).unwrap();

        manager.request_fft_info();
        run_blocks(&mut engine, 1);

        let replies = manager.poll();
        assert!(replies.iter().any(|r| matches!(
            r,
            EngineReply::Initialized { max_block_size: 128, .. }
        )));
        assert!(replies.iter().any(|r| matches!(
            r,
            EngineReply::FftInfo(info)
                if info.fft_size == SPECTRAL_BLOCK_SIZE
                    && info.hop_size == SPECTRAL_BLOCK_SIZE / 4
        )));
    }

    #[test]
    fn started_track_produces_audio_after_warmup() {
        let (mut manager, mut engine, _analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        let id = manager.add_track();
        manager.track_mut(id).unwrap().chain_mut().add_default(FilterKind::Plateau);
        manager.start_all();

        // latency is one spectral block plus the gain ramp
        let warmup_blocks = 2 * SPECTRAL_BLOCK_SIZE / BLOCK;
        run_blocks(&mut engine, warmup_blocks);

        let out = run_blocks(&mut engine, 8);
        let energy: f32 = out.iter().map(|x| x * x).sum();
        assert!(energy > 0.0, "no audio after warm-up");
    }

    #[test]
    fn muted_track_ramps_to_silence() {
        let (mut manager, mut engine, _analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        let id = manager.add_track();
        manager.start_all();
        run_blocks(&mut engine, 2 * SPECTRAL_BLOCK_SIZE / BLOCK);

        manager.set_muted(id, true).unwrap();
        // one block to apply, a few more for the ramp, one spectral
        // block of in-flight signal
        run_blocks(&mut engine, 2 * SPECTRAL_BLOCK_SIZE / BLOCK);

        let out = run_blocks(&mut engine, 4);
        assert!(out.iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn soft_join_starts_new_tracks_while_playing() {
        let (mut manager, _engine, _analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        manager.start_all();
        let id = manager.add_track();
        assert!(manager.track(id).unwrap().playing());

        manager.stop_all();
        let id2 = manager.add_track();
        assert!(!manager.track(id2).unwrap().playing());
    }

    #[test]
    fn master_gain_scales_the_sink_not_the_tap() {
        let (mut manager, mut engine, mut analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        manager.add_track();
        manager.start_all();
        manager.set_master_gain(0.0);

        run_blocks(&mut engine, 2 * SPECTRAL_BLOCK_SIZE / BLOCK);
        let out = run_blocks(&mut engine, 8);

        // sink is silent under zero master gain
        assert!(out.iter().all(|x| x.abs() < 1e-6));

        // but the analyzer tap still sees the mix
        let data = analyzer.display_data(128);
        assert!(data.iter().any(|&db| db > MINUS_INFINITY_DB + 1.0));
    }

    #[test]
    fn removing_tracks_shifts_ids() {
        let (mut manager, mut engine, _analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        manager.add_track();
        manager.add_track();
        manager.add_track();
        assert_eq!(manager.len(), 3);

        manager.remove_track(0).unwrap();
        assert_eq!(manager.len(), 2);
        assert!(matches!(
            manager.remove_track(5),
            Err(Error::BadIndex { .. })
        ));

        // the engine mirrors the removal and retires the DSP state
        run_blocks(&mut engine, 1);
        manager.poll();
    }

    #[test]
    fn oversized_host_block_is_silenced_and_reported() {
        let (mut manager, mut engine, _analyzer) =
            TrackManager::build(44_100.0, 128).unwrap();

        let input = [0.0f32; 512];
        let mut block = [1.0f32; 512];
        assert!(engine.process(&input, &mut block));
        assert!(block.iter().all(|&x| x == 0.0));

        let replies = manager.poll();
        assert!(replies
            .iter()
            .any(|r| matches!(r, EngineReply::Error(_))));
    }
}

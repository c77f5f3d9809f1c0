//! Offline rendering of a mix snapshot.
//!
//! Renders arbitrary durations of the configured mix into dense sample
//! buffers, either directly (one bulk FFT per track) or in chunks, with
//! optional parallel dispatch onto a worker pool. Post-processing and
//! clip sequencing live in [`post`].

pub mod post;
pub mod snapshot;
pub mod worker;

pub use post::{ClipPlan, ExportSettings, FadeOrder, NormalizeScope};
pub use snapshot::{MixSnapshot, TrackSnapshot};

use crate::dsp::{biquad::BiquadFilter, fft::FftKernel, mask::SpectralMask, noise::Lcg};
use crate::error::{Error, Result};
use crate::settings::*;
use realfft::num_complex::Complex;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;
use worker::{ChunkJob, WorkerPool};

/// How a render is executed, chosen from its estimated memory need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// The whole duration in one pass.
    Direct,
    /// The duration split into independently rendered chunks.
    Chunked,
}

/// How chunk boundaries are joined in chunked mode.
///
/// `Strict` concatenates independently filtered chunks; narrow filters
/// can leave audible discontinuities at the seams. `Crossfade` renders
/// each chunk with an overlapping head and blends it into the previous
/// chunk's tail, trading exact per-chunk filtering for seam continuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkSeam {
    #[default]
    Strict,
    Crossfade,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub parallel: bool,
    pub seam: ChunkSeam,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { parallel: true, seam: ChunkSeam::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Starting,
    Processing,
    Finalizing,
}

/// A progress report. The consumer returns `false` to request
/// cancellation; the request is advisory and takes effect between
/// chunks.
#[derive(Debug, Clone, Copy)]
pub struct RenderProgress {
    pub phase: RenderPhase,
    pub chunks_completed: usize,
    pub chunks_total: usize,
    pub overall_progress_pct: f64,
}

/// A cloneable handle for cancelling a render from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Relaxed)
    }
}

/// Renders a frozen mix configuration into sample buffers.
pub struct Renderer {
    snapshot: Arc<MixSnapshot>,
    options: RenderOptions,
    cancel: CancelHandle,
}

impl Renderer {
    #[must_use]
    pub fn new(snapshot: MixSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            options: RenderOptions::default(),
            cancel: CancelHandle::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// A handle that cancels this renderer's runs when triggered.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The execution mode for a render of `total_samples`, from the
    /// estimated intermediate memory (five buffers of 32-bit samples).
    pub fn mode_for(total_samples: usize) -> RenderMode {
        if total_samples.saturating_mul(5 * 4) > DIRECT_RENDER_LIMIT_BYTES {
            RenderMode::Chunked
        }
        else {
            RenderMode::Direct
        }
    }

    /// Renders `duration_secs` of the mix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if cancellation was requested, or
    /// [`Error::WorkerJobFailed`] if a chunk exhausted its retries.
    pub fn render(&self, duration_secs: f64) -> Result<Vec<f64>> {
        self.render_with_progress(duration_secs, &mut |_| true)
    }

    /// Renders with progress reporting. The callback may return `false`
    /// to request cancellation.
    pub fn render_with_progress(
        &self,
        duration_secs: f64,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        let sample_rate = self.snapshot.sample_rate;
        let total = (duration_secs * sample_rate).round().max(0.0) as usize;
        self.render_samples(total, progress)
    }

    /// Renders an exact number of samples.
    pub fn render_samples(
        &self,
        total: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        if total == 0 {
            return Ok(Vec::new());
        }

        match Self::mode_for(total) {
            RenderMode::Direct => self.render_direct(total, progress),
            RenderMode::Chunked => self.render_chunked(total, progress),
        }
    }

    /// Renders a clip plan and applies the post-processing pipeline.
    /// Clips draw from consecutive regions of each track's noise
    /// stream, so every clip is distinct yet reproducible.
    ///
    /// # Errors
    ///
    /// Propagates render errors; invalid export settings fail with
    /// [`Error::BadParameter`].
    pub fn render_clips(
        &self,
        plan: &ClipPlan,
        settings: &ExportSettings,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        settings.validate()?;

        let sample_rate = f64::from(settings.sample_rate);
        let clip_samples = plan.clip_samples(settings.sample_rate);
        let clip_renderer = Self {
            snapshot: Arc::new(self.snapshot.at_sample_rate(sample_rate)),
            options: self.options,
            cancel: self.cancel.clone(),
        };

        let mut clips = Vec::with_capacity(plan.clip_count);
        for clip_index in 0..plan.clip_count {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let clip = clip_renderer.render_offset_span(
                clip_index * clip_samples,
                clip_samples,
                progress,
            )?;
            clips.push(clip);
        }

        if !progress(RenderProgress {
            phase: RenderPhase::Finalizing,
            chunks_completed: plan.clip_count,
            chunks_total: plan.clip_count,
            overall_progress_pct: 100.0,
        }) {
            return Err(Error::Cancelled);
        }

        post::post_process(clips, plan, settings)
    }

    fn render_direct(
        &self,
        total: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        self.report(progress, RenderPhase::Starting, 0, 1)?;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let out = render_span(&self.snapshot, 0, total);

        self.report(progress, RenderPhase::Processing, 1, 1)?;
        self.report(progress, RenderPhase::Finalizing, 1, 1)?;
        Ok(out)
    }

    fn render_chunked(
        &self,
        total: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        let sample_rate = self.snapshot.sample_rate;
        let chunk_secs = if self.options.parallel {
            PARALLEL_CHUNK_SECS
        }
        else {
            SEQUENTIAL_CHUNK_SECS
        };
        let chunk_len = ((chunk_secs * sample_rate) as usize).max(1);
        let num_chunks = total.div_ceil(chunk_len);

        self.report(progress, RenderPhase::Starting, 0, num_chunks)?;

        let workers = WorkerPool::worker_count(num_chunks);
        let chunks = if self.options.parallel && num_chunks >= 2 && workers >= 1
        {
            match WorkerPool::spawn(Arc::clone(&self.snapshot), workers) {
                Ok(pool) => self.render_chunks_parallel(
                    pool, total, chunk_len, num_chunks, progress,
                )?,
                Err(Error::WorkerInitTimeout) => {
                    log::warn!(
                        "worker pool init timed out; rendering sequentially"
                    );
                    self.render_chunks_sequential(
                        total, chunk_len, num_chunks, progress,
                    )?
                }
                Err(e) => return Err(e),
            }
        }
        else {
            self.render_chunks_sequential(total, chunk_len, num_chunks, progress)?
        };

        self.report(progress, RenderPhase::Finalizing, num_chunks, num_chunks)?;
        Ok(self.assemble(chunks, total, chunk_len))
    }

    fn render_chunks_sequential(
        &self,
        total: usize,
        chunk_len: usize,
        num_chunks: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<Vec<f64>>> {
        let mut chunks = Vec::with_capacity(num_chunks);

        for index in 0..num_chunks {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let job = self.chunk_job(index, total, chunk_len);
            chunks.push(render_span(&self.snapshot, job.offset, job.len));

            self.report(progress, RenderPhase::Processing, index + 1, num_chunks)?;
        }

        Ok(chunks)
    }

    fn render_chunks_parallel(
        &self,
        mut pool: WorkerPool,
        total: usize,
        chunk_len: usize,
        num_chunks: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<Vec<f64>>> {
        let mut results: Vec<Option<Vec<f64>>> = vec![None; num_chunks];
        let mut attempts = vec![0u32; num_chunks];
        let mut completed = 0usize;
        let mut in_flight = 0usize;
        let mut next_job = 0usize;

        // keep at most one queued job per worker so cancellation only
        // has to wait out the in-flight chunks
        while next_job < num_chunks && in_flight < pool.len() {
            pool.submit(self.chunk_job(next_job, total, chunk_len));
            next_job += 1;
            in_flight += 1;
        }

        while completed < num_chunks {
            if in_flight == 0 {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if pool.is_empty() {
                    // no workers left; finish the remainder inline
                    log::warn!("worker pool drained; finishing sequentially");
                    self.finish_remaining_inline(
                        &mut results,
                        &mut completed,
                        total,
                        chunk_len,
                        num_chunks,
                        progress,
                    )?;
                    break;
                }
                while next_job < num_chunks && in_flight < pool.len() {
                    if results[next_job].is_none() {
                        pool.submit(self.chunk_job(next_job, total, chunk_len));
                        in_flight += 1;
                    }
                    next_job += 1;
                }
                if in_flight == 0 {
                    return Err(Error::Internal(
                        "parallel dispatcher stalled with work remaining".into(),
                    ));
                }
                continue;
            }

            let Some(result) = pool.recv() else {
                // every worker exited while jobs were in flight
                self.finish_remaining_inline(
                    &mut results,
                    &mut completed,
                    total,
                    chunk_len,
                    num_chunks,
                    progress,
                )?;
                break;
            };
            in_flight -= 1;

            let index = result.chunk_index;
            match result.samples {
                Ok(samples) => {
                    if results[index].is_none() {
                        results[index] = Some(samples);
                        completed += 1;
                    }
                    log::debug!("chunk {index} complete ({completed}/{num_chunks})");

                    if !progress(self.progress(
                        RenderPhase::Processing,
                        completed,
                        num_chunks,
                    )) {
                        self.cancel.cancel();
                    }

                    if !self.cancel.is_cancelled()
                        && next_job < num_chunks
                        && !pool.is_empty()
                    {
                        pool.submit(self.chunk_job(next_job, total, chunk_len));
                        next_job += 1;
                        in_flight += 1;
                    }
                }
                Err(reason) => {
                    attempts[index] += 1;
                    pool.record_failure(result.worker_id);
                    log::warn!(
                        "chunk {index} failed (attempt {}): {reason}",
                        attempts[index]
                    );

                    // the initial attempt plus up to three retries
                    if attempts[index] > MAX_CHUNK_RETRIES {
                        return Err(Error::WorkerJobFailed {
                            chunk: index,
                            attempts: attempts[index],
                            reason,
                        });
                    }

                    if !self.cancel.is_cancelled() && !pool.is_empty() {
                        pool.submit(self.chunk_job(index, total, chunk_len));
                        in_flight += 1;
                    }
                }
            }
        }

        if completed < num_chunks {
            return Err(Error::Cancelled);
        }

        let mut chunks = Vec::with_capacity(num_chunks);
        for chunk in results {
            chunks.push(chunk.ok_or_else(|| {
                Error::Internal("chunk missing after completion".into())
            })?);
        }
        Ok(chunks)
    }

    fn finish_remaining_inline(
        &self,
        results: &mut [Option<Vec<f64>>],
        completed: &mut usize,
        total: usize,
        chunk_len: usize,
        num_chunks: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<()> {
        for index in 0..num_chunks {
            if results[index].is_some() {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let job = self.chunk_job(index, total, chunk_len);
            results[index] = Some(render_span(&self.snapshot, job.offset, job.len));
            *completed += 1;

            self.report(progress, RenderPhase::Processing, *completed, num_chunks)?;
        }

        Ok(())
    }

    /// The rendered span for one chunk. In crossfade mode every chunk
    /// but the first is extended backwards by the seam overlap.
    fn chunk_job(&self, index: usize, total: usize, chunk_len: usize) -> ChunkJob {
        let start = index * chunk_len;
        let len = chunk_len.min(total - start);

        let overlap = self.seam_overlap(index, chunk_len);
        ChunkJob { chunk_index: index, offset: start - overlap, len: len + overlap }
    }

    fn seam_overlap(&self, index: usize, chunk_len: usize) -> usize {
        match self.options.seam {
            ChunkSeam::Strict => 0,
            ChunkSeam::Crossfade if index == 0 => 0,
            ChunkSeam::Crossfade => CHUNK_SEAM_OVERLAP.min(chunk_len),
        }
    }

    /// Concatenates chunk buffers in index order, blending seam
    /// overlaps with a raised-cosine crossfade where configured.
    fn assemble(
        &self,
        chunks: Vec<Vec<f64>>,
        total: usize,
        chunk_len: usize,
    ) -> Vec<f64> {
        let mut out: Vec<f64> = vec![0.0; total];

        for (index, chunk) in chunks.into_iter().enumerate() {
            let start = index * chunk_len;
            let overlap = self.seam_overlap(index, chunk_len);

            for (j, &sample) in chunk.iter().take(overlap).enumerate() {
                let t = j as f64 / overlap as f64;
                let fade_in = 0.5 * (1.0 - (PI * t).cos());
                let pos = start - overlap + j;
                out[pos] = out[pos].mul_add(1.0 - fade_in, sample * fade_in);
            }

            let body = &chunk[overlap..];
            out[start..start + body.len()].copy_from_slice(body);
        }

        out
    }

    fn report(
        &self,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
        phase: RenderPhase,
        completed: usize,
        total: usize,
    ) -> Result<()> {
        if !progress(self.progress(phase, completed, total)) {
            self.cancel.cancel();
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn progress(
        &self,
        phase: RenderPhase,
        completed: usize,
        total: usize,
    ) -> RenderProgress {
        RenderProgress {
            phase,
            chunks_completed: completed,
            chunks_total: total,
            overall_progress_pct: if total == 0 {
                100.0
            }
            else {
                completed as f64 / total as f64 * 100.0
            },
        }
    }

    /// Renders `len` samples starting at an absolute offset of the
    /// noise timeline, honoring the renderer's mode selection for the
    /// span length.
    fn render_offset_span(
        &self,
        offset: usize,
        len: usize,
        progress: &mut dyn FnMut(RenderProgress) -> bool,
    ) -> Result<Vec<f64>> {
        // offset the whole snapshot by pre-skipping each track's stream
        let shifted = Renderer {
            snapshot: Arc::new(MixSnapshot {
                sample_rate: self.snapshot.sample_rate,
                tracks: self
                    .snapshot
                    .tracks
                    .iter()
                    .map(|t| {
                        let mut t = t.clone();
                        t.stream_offset += offset as u64;
                        t
                    })
                    .collect(),
            }),
            options: self.options,
            cancel: self.cancel.clone(),
        };

        shifted.render_samples(len, progress)
    }
}

/// A pre-planned bulk FFT used to apply a spectral mask to a whole
/// span at once.
struct BulkFft {
    kernel: FftKernel,
    time: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
}

impl BulkFft {
    fn new(size: usize) -> Self {
        let kernel = FftKernel::new(size);
        let spectrum = kernel.make_spectrum_vec();
        Self { kernel, time: vec![0.0; size], spectrum }
    }

    /// Filters `signal` in place by `mask`, zero-padding up to the FFT
    /// size and trimming back afterwards.
    fn apply_mask(&mut self, signal: &mut [f64], mask: &SpectralMask) {
        self.time[..signal.len()].copy_from_slice(signal);
        self.time[signal.len()..].fill(0.0);

        self.kernel.forward(&mut self.time, &mut self.spectrum);
        for (bin, &gain) in self.spectrum.iter_mut().zip(mask.iter()) {
            *bin *= gain;
        }
        self.kernel.inverse(&mut self.spectrum, &mut self.time);

        signal.copy_from_slice(&self.time[..signal.len()]);
    }
}

/// The direct-mode pipeline: noise, pass-through sections, one bulk
/// masked FFT per track, gain, and summation in track order.
pub(crate) fn render_span(
    snapshot: &MixSnapshot,
    offset: usize,
    len: usize,
) -> Vec<f64> {
    let sample_rate = snapshot.sample_rate;
    let mut mix = vec![0.0; len];
    if len == 0 {
        return mix;
    }

    let fft_size = len.next_power_of_two();
    let mut bulk: Option<BulkFft> = None;
    let mut track_buf = vec![0.0; len];

    for track in snapshot.tracks.iter().filter(|t| t.is_audible()) {
        Lcg::at_offset(track.seed, track.stream_offset + offset as u64)
            .fill(&mut track_buf);

        if !track.passthrough.is_empty() {
            let mut sections: Vec<BiquadFilter> = track
                .passthrough
                .iter()
                .map(|&params| BiquadFilter::new(params, sample_rate))
                .collect();

            for x in track_buf.iter_mut() {
                for section in sections.iter_mut() {
                    *x = section.process(*x);
                }
            }
        }

        if track.has_spectral_filters() {
            let bulk = bulk.get_or_insert_with(|| BulkFft::new(fft_size));
            let mask = track.composite_mask(fft_size, sample_rate);
            bulk.apply_mask(&mut track_buf, &mask);
        }

        for (out, &x) in mix.iter_mut().zip(track_buf.iter()) {
            *out += x * track.gain;
        }
    }

    mix
}

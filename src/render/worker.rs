//! Fixed worker pool for parallel chunk rendering.
//!
//! Workers receive chunk jobs over a shared FIFO queue and send finished
//! chunk buffers back over a result channel; buffers move through the
//! channels, they are never copied. Each worker holds only an immutable
//! snapshot of the mix configuration.

use super::{render_span, snapshot::MixSnapshot};
use crate::error::{Error, Result};
use crate::settings::{MAX_RENDER_WORKERS, MAX_WORKER_FAILURES, WORKER_INIT_TIMEOUT};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;
use std::thread;

/// One chunk of the output timeline to render.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkJob {
    pub chunk_index: usize,
    /// Absolute sample offset of the rendered span.
    pub offset: usize,
    pub len: usize,
}

/// A finished (or failed) chunk.
pub(crate) struct ChunkResult {
    pub chunk_index: usize,
    pub worker_id: usize,
    pub samples: std::result::Result<Vec<f64>, String>,
}

struct WorkerHandle {
    id: usize,
    failures: u32,
    shutdown: Arc<AtomicBool>,
    _thread: thread::JoinHandle<()>,
}

/// A fixed set of render worker threads sharing one job queue.
pub(crate) struct WorkerPool {
    job_tx: Sender<ChunkJob>,
    result_rx: Receiver<ChunkResult>,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// The pool size for a render of `num_chunks` chunks.
    pub fn worker_count(num_chunks: usize) -> usize {
        let hardware = thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get);

        hardware.min(MAX_RENDER_WORKERS).min(num_chunks)
    }

    /// Spawns `count` workers and waits for each to come online.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerInitTimeout`] if any worker misses the
    /// init deadline, and [`Error::Internal`] if a thread cannot be
    /// spawned at all.
    pub fn spawn(snapshot: Arc<MixSnapshot>, count: usize) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<ChunkJob>();
        let (result_tx, result_rx) = unbounded::<ChunkResult>();
        let (ready_tx, ready_rx) = unbounded::<usize>();

        let mut workers = Vec::with_capacity(count);

        for id in 0..count {
            let snapshot = Arc::clone(&snapshot);
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let ready_tx = ready_tx.clone();
            let shutdown = Arc::new(AtomicBool::new(false));
            let shutdown_flag = Arc::clone(&shutdown);

            let thread = thread::Builder::new()
                .name(format!("render-worker-{id}"))
                .spawn(move || {
                    let _ = ready_tx.send(id);
                    worker_loop(id, &snapshot, &job_rx, &result_tx, &shutdown_flag);
                })
                .map_err(|e| {
                    Error::Internal(format!("failed to spawn worker: {e}"))
                })?;

            workers.push(WorkerHandle { id, failures: 0, shutdown, _thread: thread });
        }

        for _ in 0..count {
            if ready_rx.recv_timeout(WORKER_INIT_TIMEOUT).is_err() {
                return Err(Error::WorkerInitTimeout);
            }
        }

        Ok(Self { job_tx, result_rx, workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Queues a job. Assignment is FIFO; there are no priorities.
    pub fn submit(&self, job: ChunkJob) {
        let _ = self.job_tx.send(job);
    }

    /// Blocks until the next chunk result arrives. Returns `None` if
    /// every worker has exited.
    pub fn recv(&self) -> Option<ChunkResult> {
        self.result_rx.recv().ok()
    }

    /// Records a job failure against a worker. After
    /// [`MAX_WORKER_FAILURES`] the worker is told to shut down and is
    /// removed from the pool.
    pub fn record_failure(&mut self, worker_id: usize) {
        let Some(pos) =
            self.workers.iter().position(|w| w.id == worker_id)
        else {
            return;
        };

        self.workers[pos].failures += 1;
        if self.workers[pos].failures >= MAX_WORKER_FAILURES {
            log::warn!(
                "render worker {worker_id} removed after {} failures",
                self.workers[pos].failures
            );
            let worker = self.workers.remove(pos);
            worker.shutdown.store(true, Relaxed);
        }
    }
}

fn worker_loop(
    worker_id: usize,
    snapshot: &MixSnapshot,
    job_rx: &Receiver<ChunkJob>,
    result_tx: &Sender<ChunkResult>,
    shutdown: &AtomicBool,
) {
    // the shutdown flag is polled between jobs; in-flight jobs run to
    // completion
    while !shutdown.load(Relaxed) {
        let Ok(job) = job_rx.recv() else { break };

        let samples = catch_unwind(AssertUnwindSafe(|| {
            render_span(snapshot, job.offset, job.len)
        }))
        .map_err(|_| String::from("worker panicked"));

        let result = ChunkResult {
            chunk_index: job.chunk_index,
            worker_id,
            samples,
        };
        if result_tx.send(result).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::snapshot::TrackSnapshot;

    fn one_track_snapshot() -> Arc<MixSnapshot> {
        Arc::new(MixSnapshot {
            sample_rate: 44_100.0,
            tracks: vec![TrackSnapshot {
                seed: 11,
                stream_offset: 0,
                gain: 1.0,
                muted: false,
                filters: Vec::new(),
                passthrough: Vec::new(),
            }],
        })
    }

    #[test]
    fn workers_render_submitted_jobs() {
        let pool = WorkerPool::spawn(one_track_snapshot(), 2).unwrap();

        pool.submit(ChunkJob { chunk_index: 0, offset: 0, len: 1000 });
        pool.submit(ChunkJob { chunk_index: 1, offset: 1000, len: 1000 });

        let mut seen = [false; 2];
        for _ in 0..2 {
            let result = pool.recv().unwrap();
            let samples = result.samples.unwrap();
            assert_eq!(samples.len(), 1000);
            seen[result.chunk_index] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn failed_workers_are_removed() {
        let mut pool = WorkerPool::spawn(one_track_snapshot(), 1).unwrap();
        assert_eq!(pool.len(), 1);

        for _ in 0..MAX_WORKER_FAILURES {
            pool.record_failure(0);
        }
        assert!(pool.is_empty());
    }
}

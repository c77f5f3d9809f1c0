//! Global constants.

use std::time::Duration;

/// The analysis block size of the streaming spectral filter.
pub const SPECTRAL_BLOCK_SIZE: usize = 1 << 12; // 4096

/// Overlap factor of the streaming spectral filter; the hop size is
/// `SPECTRAL_BLOCK_SIZE / OVERLAP_FACTOR`.
pub const OVERLAP_FACTOR: usize = 4;

/// The hop size of the streaming spectral filter.
pub const HOP_SIZE: usize = SPECTRAL_BLOCK_SIZE / OVERLAP_FACTOR;

/// The largest host callback block size the engine accepts.
pub const MAX_HOST_BLOCK_SIZE: usize = 256;

/// The maximum number of simultaneous tracks. The audio thread's track
/// list is pre-allocated to this capacity so that adding a track while
/// playing never allocates on the audio thread.
pub const MAX_TRACKS: usize = 16;

/// Gain ramp length applied on start/stop/gain/mute changes, for click
/// suppression.
pub const GAIN_RAMP_MS: f64 = 10.0;

/// The default sample rate, used when the host does not report one.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Lowest frequency handled by filter parameters and the analyzer display.
pub const MIN_FILTER_FREQ: f64 = 20.0;

/// Highest frequency handled by filter parameters and the analyzer display.
pub const MAX_FILTER_FREQ: f64 = 20_000.0;

/// The maximum FFT size of the spectrum analyzer.
pub const MAX_ANALYZER_FFT_SIZE: usize = 1 << 13; // 8192

/// Capacity of the bounded channel carrying mix blocks from the audio
/// thread to the spectrum analyzer. Blocks are dropped when the analyzer
/// falls behind.
pub const ANALYZER_TAP_CAPACITY: usize = 64;

/// Chunk length used by the sequential offline renderer.
pub const SEQUENTIAL_CHUNK_SECS: f64 = 30.0;

/// Chunk length used by the parallel offline renderer.
pub const PARALLEL_CHUNK_SECS: f64 = 10.0;

/// Upper bound on the offline worker pool size.
pub const MAX_RENDER_WORKERS: usize = 8;

/// How long a render worker may take to come online before the dispatcher
/// degrades to sequential rendering.
pub const WORKER_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many times a failed chunk is retried before the render fails.
pub const MAX_CHUNK_RETRIES: u32 = 3;

/// How many failures a single worker may accumulate before it is removed
/// from the pool.
pub const MAX_WORKER_FAILURES: u32 = 3;

/// Renders estimated to need more than this much intermediate memory use
/// chunked mode instead of a single bulk FFT.
pub const DIRECT_RENDER_LIMIT_BYTES: usize = 500 * 1024 * 1024;

/// Overlap length used when chunk seams are crossfaded in the offline
/// renderer.
pub const CHUNK_SEAM_OVERLAP: usize = 1 << 12; // 4096

//! The track/chain/mix data model and the real-time engine.

pub mod analyzer;
pub mod audio;
pub mod chain;
pub mod filter;
pub mod manager;
pub mod messages;
pub mod track;

pub use analyzer::{FrequencyScale, SpectrumAnalyzer};
pub use audio::AudioEngine;
pub use chain::FilterChain;
pub use filter::{FilterConfig, FilterInstance, FilterKind};
pub use manager::TrackManager;
pub use messages::{EngineReply, FftInfo, PerformanceReport};
pub use track::Track;

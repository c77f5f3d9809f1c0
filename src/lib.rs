#![allow(
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::return_self_not_must_use
)]

// Signal processing primitives
pub mod dsp;

// Track/chain/mix model and the real-time engine
pub mod engine;

// Offline rendering and post-processing
pub mod render;

// PCM and C-header serialization
pub mod io;

// General utilities
pub mod util;

// Some widely-used re-exports
pub mod prelude;

// Program-wide settings
pub mod settings;

// Error types
pub mod error;

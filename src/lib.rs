//! NES APU and expansion-chip sound core
//!
//! Turns timestamped register writes into a band-limited 16-bit PCM stream.
//! The base 2A03 APU and the Famicom expansion chips (VRC6, VRC7, FDS, MMC5,
//! Namco 163, Sunsoft 5B) plus a YM2413 can be combined in one
//! [`MixingEngine`]. The triangle/noise/DMC group is mixed through the
//! resistor-network non-linearity of the real console.
//!
//! # Features
//! - Band-limited synthesis (Blip buffer) at any output rate
//! - Non-linear TND mixing, optionally with per-channel isolation
//! - Timeline seeking: writes made while seeking are buffered per register
//!   and only the final state is replayed
//! - NTSC and PAL timing with deterministic frame-length dithering
//!
//! # Crate feature flags
//! - `export-wav` (opt-in): render helpers that write WAV files (`export`)
//!
//! # Quick start
//! ```no_run
//! use nes_snd::{MixingEngine, Region, TndMode};
//!
//! let mut engine = MixingEngine::new();
//! engine.configure(44_100, Region::Ntsc, TndMode::Single).unwrap();
//! engine.reset();
//!
//! engine.write_register(0x4015, 0x01); // enable pulse 1
//! engine.write_register(0x4000, 0xBF); // 50% duty, constant volume 15
//! engine.write_register(0x4002, 0xFD); // period low
//! engine.write_register(0x4003, 0x00); // period high + length
//! engine.skip_cycles(29_780);
//! engine.end_frame();
//!
//! let mut pcm = vec![0i16; engine.samples_avail()];
//! let count = pcm.len();
//! engine.read_samples(&mut pcm, count);
//! ```

#![warn(missing_docs)]

pub mod apu; // Base 2A03 APU
pub mod blip; // Band-limited buffer and synth
pub mod chip; // Chip contract and identifiers
pub mod config; // Engine configuration
pub mod constants; // Clock rates and frame timing
pub mod engine; // Multi-chip mixing engine
pub mod expansion; // Expansion sound chips
pub mod opll; // FM synthesis core (YM2413/VRC7)
pub mod output; // Output buffer routing
pub mod shadow; // Seek-time shadow registers
pub mod streaming; // Producer/consumer sample ring

#[cfg(feature = "export-wav")]
pub mod export; // WAV rendering

/// Error types for the sound core
#[derive(thiserror::Error, Debug)]
pub enum NesSndError {
    /// IO error from filesystem (WAV export)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output sample rate is unusable
    #[error("Invalid sample rate: {rate} Hz")]
    InvalidSampleRate {
        /// Requested rate
        rate: u32,
    },

    /// Requested buffer cannot be addressed by the resampler
    #[error("Buffer of {requested} samples exceeds maximum of {max}")]
    BufferTooLong {
        /// Requested length in samples
        requested: usize,
        /// Largest supported length
        max: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Audio file writing error
    #[error("Audio file error: {0}")]
    AudioFileError(String),

    /// Sample ring error
    #[error("Ring buffer error: {0}")]
    RingBuffer(String),
}

/// Result type for sound core operations
pub type Result<T> = std::result::Result<T, NesSndError>;

// Public API exports
pub use apu::{Apu, ApuSnapshot};
pub use blip::{BlipBuffer, BlipEq, BlipReader, BlipSynth};
pub use chip::{ChipKind, ExpansionMask, SoundChip};
pub use config::{ChipVolumes, EngineConfig, Region, TndMode};
pub use engine::MixingEngine;
pub use expansion::{ExpansionChip, FmAdapter, FmVariant};
pub use output::{ChannelRoute, OutputBuffers};
pub use streaming::SampleRing;

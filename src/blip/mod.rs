//! Band-limited synthesis primitives
//!
//! - [`BlipBuffer`]: delta accumulator with fixed-point resampling
//! - [`BlipSynth`]: places band-limited steps into a buffer
//! - [`BlipReader`]: integrating read cursor with bass (DC) removal

mod buffer;
mod synth;

pub use buffer::{
    clamp_sample, BlipBuffer, BlipReader, BLIP_BUFFER_ACCURACY, BLIP_DEFAULT_LENGTH_MS,
    BLIP_MAX_SAMPLES, BLIP_PHASE_BITS, BLIP_RES, BLIP_SAMPLE_BITS, BLIP_WIDEST_IMPULSE,
    DEFAULT_BASS_FREQ, DELTA_EXTRA_BITS,
};
pub use synth::{BlipEq, BlipSynth, Quality, DEFAULT_TREBLE_DB};

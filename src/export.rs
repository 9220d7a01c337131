//! WAV rendering
//!
//! Writes 16-bit mono PCM produced by a [`MixingEngine`] with `hound`.

use crate::engine::MixingEngine;
use crate::{NesSndError, Result};
use std::path::Path;

/// Write mono 16-bit samples to a WAV file.
///
/// # Examples
///
/// ```no_run
/// use nes_snd::export::{render_frames, write_wav};
/// use nes_snd::{MixingEngine, Region, TndMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut engine = MixingEngine::new();
/// engine.configure(44_100, Region::Ntsc, TndMode::Single)?;
/// engine.reset();
/// let pcm = render_frames(&mut engine, 60, |_, _| {});
/// write_wav("silence.wav", &pcm, 44_100)?;
/// # Ok(())
/// # }
/// ```
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path.as_ref(), spec).map_err(|e| wav_error("failed to create WAV file", e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| wav_error("failed to write sample", e))?;
    }
    writer
        .finalize()
        .map_err(|e| wav_error("failed to finalize WAV file", e))?;

    log::debug!(
        "wrote {} samples at {} Hz to {}",
        samples.len(),
        sample_rate,
        path.as_ref().display()
    );
    Ok(())
}

/// Filesystem failures keep their `io::Error`; everything else hound
/// reports is an audio file error.
fn wav_error(context: &str, err: hound::Error) -> NesSndError {
    match err {
        hound::Error::IoError(io) => NesSndError::Io(io),
        other => NesSndError::AudioFileError(format!("{context}: {other}")),
    }
}

/// Run `frames` whole frames and collect the output.
///
/// `drive` is called at the start of each frame with the engine and the
/// frame index; it issues that frame's register writes and may advance the
/// clock with `skip_cycles`. The rest of the frame is skipped before it is
/// closed.
pub fn render_frames<F>(engine: &mut MixingEngine, frames: usize, mut drive: F) -> Vec<i16>
where
    F: FnMut(&mut MixingEngine, usize),
{
    let mut pcm = Vec::new();
    for frame in 0..frames {
        drive(engine, frame);
        // next frame's length is the toggle of the current one
        let length = engine.frame_length() ^ 1;
        let remaining = length - engine.time();
        if remaining > 0 {
            engine.skip_cycles(remaining);
        }
        engine.end_frame();

        let count = engine.samples_avail();
        let start = pcm.len();
        pcm.resize(start + count, 0);
        engine.read_samples(&mut pcm[start..], count);
    }
    pcm
}

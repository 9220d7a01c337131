//! Band-limited delta buffer
//!
//! Chips never write samples directly. They write signed amplitude *deltas*
//! at CPU-cycle timestamps through a [`BlipSynth`](super::BlipSynth), which
//! spreads each step over a short band-limited impulse. The buffer keeps a
//! fixed-point "resampled time" cursor so that `end_frame` can convert a
//! frame of CPU cycles into a whole number of output samples.
//!
//! Reading walks the delta cells with a leaky integrator ([`BlipReader`]),
//! which reconstructs the waveform and removes DC according to the buffer's
//! bass frequency.

use crate::{NesSndError, Result};

/// Fixed-point bits of the resampled time cursor.
pub const BLIP_BUFFER_ACCURACY: u32 = 16;

/// Number of bits of sub-sample phase resolution used to pick an impulse.
pub const BLIP_PHASE_BITS: u32 = 6;

/// Number of sub-sample phases.
pub const BLIP_RES: usize = 1 << BLIP_PHASE_BITS;

/// Internal sample precision of the delta cells.
pub const BLIP_SAMPLE_BITS: u32 = 30;

/// Extra precision bits carried by a cell relative to a 16-bit output sample.
pub const DELTA_EXTRA_BITS: u32 = BLIP_SAMPLE_BITS - 16;

/// Widest impulse any synth may use (in output samples).
pub const BLIP_WIDEST_IMPULSE: usize = 16;

/// Cells kept past the readable region so impulses near the frame end fit.
const BUFFER_EXTRA: usize = BLIP_WIDEST_IMPULSE + 2;

/// Largest usable buffer, so that resampled time stays within 32 bits.
pub const BLIP_MAX_SAMPLES: usize = (u32::MAX >> BLIP_BUFFER_ACCURACY) as usize - BUFFER_EXTRA - 64;

/// Default buffer length in milliseconds.
pub const BLIP_DEFAULT_LENGTH_MS: u32 = 1000 / 4;

/// Default high-pass corner (Hz).
pub const DEFAULT_BASS_FREQ: u32 = 16;

/// Resampling delta buffer.
///
/// Cells are `i32` deltas scaled by `2^BLIP_SAMPLE_BITS` per unit of volume;
/// arithmetic on them wraps, matching the integer behaviour the readers rely on.
#[derive(Clone)]
pub struct BlipBuffer {
    /// Resampled time units per input clock (16.16 fixed point)
    factor: u64,
    /// Resampled time of the start of the current frame
    offset: u64,
    /// Delta cells, `buffer_size + BUFFER_EXTRA` long
    cells: Vec<i32>,
    /// Usable length in samples
    buffer_size: usize,
    /// Integrator state carried between reads
    reader_accum: i32,
    bass_shift: u32,

    sample_rate: u32,
    clock_rate: u32,
    bass_freq: u32,
    length_ms: u32,
}

impl BlipBuffer {
    /// Create an unconfigured buffer.
    ///
    /// Call [`set_sample_rate`](Self::set_sample_rate) and
    /// [`set_clock_rate`](Self::set_clock_rate) before writing into it.
    pub fn new() -> Self {
        Self {
            factor: 0,
            offset: 0,
            cells: Vec::new(),
            buffer_size: 0,
            reader_accum: 0,
            bass_shift: 0,
            sample_rate: 0,
            clock_rate: 0,
            bass_freq: DEFAULT_BASS_FREQ,
            length_ms: 0,
        }
    }

    /// Set the output sample rate and allocate the default 250 ms of room.
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.set_sample_rate_with_length(rate, BLIP_DEFAULT_LENGTH_MS)
    }

    /// Set the output sample rate and buffer length.
    ///
    /// # Errors
    ///
    /// Returns [`NesSndError::InvalidSampleRate`] for a zero rate and
    /// [`NesSndError::BufferTooLong`] when the requested length cannot be
    /// addressed by the fixed-point time cursor.
    pub fn set_sample_rate_with_length(&mut self, rate: u32, length_ms: u32) -> Result<()> {
        if rate == 0 {
            return Err(NesSndError::InvalidSampleRate { rate });
        }

        let requested = (u64::from(rate) * (u64::from(length_ms) + 1)).div_ceil(1000) as usize;
        if requested > BLIP_MAX_SAMPLES {
            return Err(NesSndError::BufferTooLong {
                requested,
                max: BLIP_MAX_SAMPLES,
            });
        }

        if self.buffer_size != requested || self.cells.is_empty() {
            self.cells = vec![0; requested + BUFFER_EXTRA];
        }
        self.buffer_size = requested;
        self.sample_rate = rate;
        self.length_ms = ((requested as u64 * 1000) / u64::from(rate)).saturating_sub(1) as u32;

        if self.clock_rate != 0 {
            self.factor = self.clock_rate_factor(self.clock_rate);
        }
        self.set_bass_freq(self.bass_freq);
        self.clear();

        log::debug!(
            "blip buffer: {} Hz, {} samples ({} ms)",
            rate,
            requested,
            self.length_ms
        );
        Ok(())
    }

    /// Set the input clock rate (CPU cycles per second).
    pub fn set_clock_rate(&mut self, rate: u32) {
        self.clock_rate = rate;
        self.factor = self.clock_rate_factor(rate);
    }

    fn clock_rate_factor(&self, clock_rate: u32) -> u64 {
        if clock_rate == 0 {
            return 0;
        }
        let ratio = f64::from(self.sample_rate) / f64::from(clock_rate);
        let factor = (ratio * f64::from(1u32 << BLIP_BUFFER_ACCURACY) + 0.5).floor() as u64;
        debug_assert!(factor > 0 || self.sample_rate == 0, "clock rate too high for sample rate");
        factor
    }

    /// Set the high-pass corner frequency used by readers.
    ///
    /// Zero disables the high-pass filter.
    pub fn set_bass_freq(&mut self, freq: u32) {
        self.bass_freq = freq;
        let mut shift = 31;
        if freq > 0 && self.sample_rate > 0 {
            shift = 13;
            let mut f = (u64::from(freq) << 16) / u64::from(self.sample_rate);
            loop {
                f >>= 1;
                if f == 0 {
                    break;
                }
                shift -= 1;
                if shift == 0 {
                    break;
                }
            }
        }
        self.bass_shift = shift;
    }

    /// Discard all buffered deltas and reset the reader state.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.reader_accum = 0;
        self.cells.fill(0);
    }

    /// Close the current frame of `time` clocks, making its samples readable.
    pub fn end_frame(&mut self, time: i64) {
        debug_assert!(time >= 0, "negative frame length");
        self.offset += time.max(0) as u64 * self.factor;
        debug_assert!(
            self.samples_avail() <= self.buffer_size,
            "blip buffer overflow: read samples more often"
        );
    }

    /// Number of whole samples ready to be read.
    #[inline]
    pub fn samples_avail(&self) -> usize {
        (self.offset >> BLIP_BUFFER_ACCURACY) as usize
    }

    /// Convert a clock time inside the current frame into resampled time.
    #[inline]
    pub fn resampled_time(&self, time: i64) -> u64 {
        debug_assert!(time >= 0, "negative clock time");
        time.max(0) as u64 * self.factor + self.offset
    }

    /// Length of `clocks` input clocks in resampled time units.
    #[inline]
    pub fn resampled_duration(&self, clocks: u64) -> u64 {
        clocks * self.factor
    }

    /// Remove `count` samples from the front, shifting the remainder down.
    pub fn remove_samples(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        debug_assert!(count <= self.samples_avail(), "removing more samples than available");
        let count = count.min(self.samples_avail());
        self.offset -= (count as u64) << BLIP_BUFFER_ACCURACY;

        let remain = self.samples_avail() + BUFFER_EXTRA;
        self.cells.copy_within(count..count + remain, 0);
        self.cells[remain..remain + count].fill(0);
    }

    /// Read and remove up to `out.len()` samples, saturating to 16 bits.
    ///
    /// Returns the number of samples written.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let count = self.samples_avail().min(out.len());
        if count == 0 {
            return 0;
        }

        let mut reader = BlipReader::begin(self);
        for sample in out.iter_mut().take(count) {
            *sample = clamp_sample(reader.read());
            reader.next(self);
        }
        reader.end(self);

        self.remove_samples(count);
        count
    }

    /// Raw delta cells of the readable region.
    ///
    /// Used by post-processing passes that need to rewrite the delta stream
    /// before it is integrated.
    pub fn deltas_mut(&mut self) -> &mut [i32] {
        let avail = self.samples_avail();
        &mut self.cells[..avail]
    }

    /// Raw delta cells of the readable region.
    pub fn deltas(&self) -> &[i32] {
        &self.cells[..self.samples_avail()]
    }

    /// Add `delta` into cell `index`, counted from the start of the buffer.
    #[inline]
    pub(crate) fn add_delta(&mut self, index: usize, delta: i32) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = cell.wrapping_add(delta);
        }
    }

    /// Mutable window of `width` cells starting at `index`, if in range.
    #[inline]
    pub(crate) fn cells_mut(&mut self, index: usize, width: usize) -> Option<&mut [i32]> {
        self.cells.get_mut(index..index + width)
    }

    /// Output sample rate in Hz (0 when unconfigured).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Input clock rate in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Buffer length in milliseconds.
    pub fn length_ms(&self) -> u32 {
        self.length_ms
    }

    /// Current bass shift used by readers.
    pub fn bass_shift(&self) -> u32 {
        self.bass_shift
    }

    /// True once a sample rate has been set.
    pub fn is_configured(&self) -> bool {
        self.buffer_size > 0
    }
}

impl Default for BlipBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlipBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipBuffer")
            .field("sample_rate", &self.sample_rate)
            .field("clock_rate", &self.clock_rate)
            .field("samples_avail", &self.samples_avail())
            .field("bass_shift", &self.bass_shift)
            .finish()
    }
}

/// Saturate an integrated sample to the 16-bit output range.
#[inline]
pub fn clamp_sample(s: i32) -> i16 {
    s.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Leaky-integrator cursor over a [`BlipBuffer`].
///
/// `begin` snapshots the buffer's integrator, `next` consumes one delta
/// cell and `end` stores the integrator back so the next read continues
/// seamlessly.
#[derive(Debug, Clone, Copy)]
pub struct BlipReader {
    accum: i32,
    bass_shift: u32,
    pos: usize,
}

impl BlipReader {
    /// Start reading at the front of `buf`.
    pub fn begin(buf: &BlipBuffer) -> Self {
        Self {
            accum: buf.reader_accum,
            bass_shift: buf.bass_shift,
            pos: 0,
        }
    }

    /// Current sample (16-bit scale, unclamped).
    #[inline]
    pub fn read(&self) -> i32 {
        self.accum >> DELTA_EXTRA_BITS
    }

    /// Current integrator value at full internal precision.
    #[inline]
    pub fn read_raw(&self) -> i32 {
        self.accum
    }

    /// Consume one delta cell.
    #[inline]
    pub fn next(&mut self, buf: &BlipBuffer) {
        let delta = buf.cells.get(self.pos).copied().unwrap_or(0);
        self.accum = self
            .accum
            .wrapping_add(delta)
            .wrapping_sub(self.accum >> self.bass_shift);
        self.pos += 1;
    }

    /// Store the integrator back into `buf`.
    pub fn end(self, buf: &mut BlipBuffer) {
        buf.reader_accum = self.accum;
    }
}

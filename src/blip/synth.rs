//! Band-limited step synthesis
//!
//! A [`BlipSynth`] turns an amplitude step at a clock time into a short run of
//! delta cells in a [`BlipBuffer`]. The step is shaped by a windowed sinc
//! kernel whose high-frequency response is set by a [`BlipEq`].

use super::buffer::{BlipBuffer, BLIP_BUFFER_ACCURACY, BLIP_PHASE_BITS, BLIP_RES, BLIP_SAMPLE_BITS};
use std::f64::consts::PI;

/// Nominal sum of every impulse phase.
const KERNEL_UNIT: i32 = 1 << 15;

/// Treble used when a synth is given a volume before any equalisation.
pub const DEFAULT_TREBLE_DB: f64 = -8.0;

/// Impulse width, trading CPU for stop-band rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// 8-sample kernel
    Medium,
    /// 12-sample kernel
    #[default]
    Good,
    /// 16-sample kernel
    High,
}

impl Quality {
    /// Kernel width in output samples.
    pub const fn width(self) -> usize {
        match self {
            Quality::Medium => 8,
            Quality::Good => 12,
            Quality::High => 16,
        }
    }
}

/// Treble equalisation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlipEq {
    /// Treble gain in dB at half the sample rate (negative cuts)
    pub treble: f64,
    /// Frequency where the treble roll-off starts (0 = from DC)
    pub rolloff_freq: u32,
    /// Output sample rate the curve is designed for
    pub sample_rate: u32,
    /// Kernel cutoff; 0 picks one from the kernel width
    pub cutoff_freq: u32,
}

impl BlipEq {
    /// Treble-only curve at 44.1 kHz.
    pub fn new(treble: f64) -> Self {
        Self::with_rates(treble, 0, 44_100)
    }

    /// Curve with explicit roll-off start and sample rate.
    pub fn with_rates(treble: f64, rolloff_freq: u32, sample_rate: u32) -> Self {
        Self {
            treble,
            rolloff_freq,
            sample_rate,
            cutoff_freq: 0,
        }
    }

    /// Fill `out` with the left half of the kernel (ending at its centre),
    /// windowed by half a Hamming window.
    fn generate(&self, out: &mut [f64]) {
        let count = out.len();
        let mut oversample = BLIP_RES as f64 * 2.25 / count as f64 + 0.85;
        let half_rate = f64::from(self.sample_rate.max(1)) * 0.5;
        if self.cutoff_freq != 0 {
            oversample = half_rate / f64::from(self.cutoff_freq);
        }
        let cutoff = f64::from(self.rolloff_freq) * oversample / half_rate;

        gen_sinc(out, BLIP_RES as f64 * oversample, self.treble, cutoff);

        let to_fraction = PI / (count as f64 - 1.0);
        for (i, v) in out.iter_mut().enumerate() {
            *v *= 0.54 - 0.46 * (i as f64 * to_fraction).cos();
        }
    }
}

impl Default for BlipEq {
    fn default() -> Self {
        Self::new(DEFAULT_TREBLE_DB)
    }
}

/// Closed-form band-limited impulse with a treble shelf (sum of a
/// geometric series of cosines).
fn gen_sinc(out: &mut [f64], oversample: f64, treble: f64, cutoff: f64) {
    let count = out.len() as f64;
    let cutoff = cutoff.min(0.999);
    let treble = treble.clamp(-300.0, 5.0);

    const MAXH: f64 = 4096.0;
    let rolloff = 10f64.powf(1.0 / (MAXH * 20.0) * treble / (1.0 - cutoff));
    let pow_a_n = rolloff.powf(MAXH - MAXH * cutoff);
    let to_angle = PI / 2.0 / MAXH / oversample;

    for (i, v) in out.iter_mut().enumerate() {
        let angle = ((i as f64 - count) * 2.0 + 1.0) * to_angle;
        let cos_angle = angle.cos();
        let cos_nc_angle = (MAXH * cutoff * angle).cos();
        let cos_nc1_angle = ((MAXH * cutoff - 1.0) * angle).cos();

        let mut c = rolloff * ((MAXH - 1.0) * angle).cos() - (MAXH * angle).cos();
        c = c * pow_a_n - rolloff * cos_nc1_angle + cos_nc_angle;
        let d = 1.0 + rolloff * (rolloff - cos_angle - cos_angle);
        let b = 2.0 - cos_angle - cos_angle;
        let a = 1.0 - cos_angle - cos_nc_angle + cos_nc1_angle;

        *v = (a * d + c * b) / (b * d);
    }
}

/// Band-limited step synthesizer.
///
/// `range` is the largest amplitude the owner will step by; `volume(v)`
/// makes a full-range step produce `v` of full scale.
#[derive(Clone)]
pub struct BlipSynth {
    quality: Quality,
    range: i32,
    eq: BlipEq,
    volume_unit: f64,
    kernel_unit: i32,
    delta_factor: i32,
    /// `BLIP_RES` rows of `width` taps, each row summing to `kernel_unit`
    taps: Vec<i32>,
}

impl BlipSynth {
    /// Create a synth for steps of at most `range`.
    pub fn new(quality: Quality, range: i32) -> Self {
        let mut synth = Self {
            quality,
            range: range.abs().max(1),
            eq: BlipEq::default(),
            volume_unit: 0.0,
            kernel_unit: KERNEL_UNIT,
            delta_factor: 0,
            taps: Vec::new(),
        };
        synth.rebuild();
        synth
    }

    /// Set the output level of a full-range step.
    pub fn volume(&mut self, v: f64) {
        self.volume_unit(v / f64::from(self.range));
    }

    /// Set the output level of a unit step (1.0 = 65536 sample units).
    pub fn volume_unit(&mut self, unit: f64) {
        if unit != self.volume_unit {
            self.volume_unit = unit;
            self.rebuild();
        }
    }

    /// Change the treble equalisation.
    pub fn treble_eq(&mut self, eq: &BlipEq) {
        self.eq = *eq;
        self.rebuild();
    }

    /// Current unit volume.
    pub fn current_volume_unit(&self) -> f64 {
        self.volume_unit
    }

    /// Current equalisation.
    pub fn eq(&self) -> &BlipEq {
        &self.eq
    }

    /// Integer multiplier applied to every delta before it is spread.
    pub fn delta_factor(&self) -> i32 {
        self.delta_factor
    }

    /// Sum of one impulse row after volume scaling (the cell value of a unit
    /// step once fully integrated).
    pub fn unit_step(&self) -> i64 {
        i64::from(self.kernel_unit) * i64::from(self.delta_factor)
    }

    fn rebuild(&mut self) {
        let width = self.quality.width();

        // Left half of the kernel plus its mirror gives (width - 1) samples,
        // padded by half a sample on each side.
        let half_size = BLIP_RES / 2 * (width - 1);
        let mut half = vec![0.0f64; half_size];
        self.eq.generate(&mut half);

        let total_len = BLIP_RES * width;
        let mut kernel = vec![0.0f64; total_len];
        let pad = BLIP_RES / 2;
        for (i, &v) in half.iter().enumerate() {
            kernel[pad + i] = v;
            kernel[pad + 2 * half_size - 1 - i] = v;
        }
        let total: f64 = kernel.iter().sum();

        // Pick the kernel unit so the integer delta factor keeps some precision.
        let mut kernel_unit = KERNEL_UNIT;
        let mut factor = self.volume_unit * f64::from(1u32 << BLIP_SAMPLE_BITS) / f64::from(kernel_unit);
        if factor > 0.0 {
            while factor < 2.0 && kernel_unit > 1 {
                kernel_unit >>= 1;
                factor *= 2.0;
            }
        }
        self.kernel_unit = kernel_unit;
        self.delta_factor = (factor + 0.5).floor() as i32;

        let rescale = if total != 0.0 { f64::from(kernel_unit) / total } else { 0.0 };
        let center = width / 2;
        let mut taps = vec![0i32; BLIP_RES * width];
        for phase in 0..BLIP_RES {
            let row = &mut taps[phase * width..(phase + 1) * width];
            let mut sum = 0i32;
            for (k, tap) in row.iter_mut().enumerate() {
                let start = (k * BLIP_RES) as isize - phase as isize;
                let area: f64 = (start..start + BLIP_RES as isize)
                    .filter(|&j| j >= 0 && (j as usize) < total_len)
                    .map(|j| kernel[j as usize])
                    .sum();
                *tap = (area * rescale + 0.5).floor() as i32;
                sum += *tap;
            }
            // Rounding error goes to the centre tap so each row integrates exactly.
            row[center] += kernel_unit - sum;
        }
        self.taps = taps;
    }

    /// Add an amplitude step of `delta` at clock `time` of the current frame.
    #[inline]
    pub fn offset(&self, time: i64, delta: i32, buf: &mut BlipBuffer) {
        self.offset_resampled(buf.resampled_time(time), delta, buf);
    }

    /// Add an amplitude step at an already resampled time.
    pub fn offset_resampled(&self, time: u64, delta: i32, buf: &mut BlipBuffer) {
        if delta == 0 {
            return;
        }
        let width = self.quality.width();
        let index = (time >> BLIP_BUFFER_ACCURACY) as usize;
        let phase = ((time >> (BLIP_BUFFER_ACCURACY - BLIP_PHASE_BITS)) as usize) & (BLIP_RES - 1);
        let delta = delta.wrapping_mul(self.delta_factor);

        let Some(cells) = buf.cells_mut(index, width) else {
            debug_assert!(false, "synth offset past end of blip buffer");
            return;
        };
        let row = &self.taps[phase * width..(phase + 1) * width];
        for (cell, &tap) in cells.iter_mut().zip(row) {
            *cell = cell.wrapping_add(tap.wrapping_mul(delta));
        }
    }
}

impl std::fmt::Debug for BlipSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipSynth")
            .field("quality", &self.quality)
            .field("range", &self.range)
            .field("volume_unit", &self.volume_unit)
            .field("delta_factor", &self.delta_factor)
            .field("treble", &self.eq.treble)
            .finish()
    }
}

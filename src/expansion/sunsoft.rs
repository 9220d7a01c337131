//! Sunsoft 5B
//!
//! An AY-3-8910 compatible PSG behind the FME-7 mapper: `$C000` selects one
//! of 14 registers, `$E000` writes it. The three tone generators are
//! synthesised with the chip's logarithmic volume curve; noise and the
//! hardware envelope are not, and a channel using them is muted.

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::constants::SEEK_WRITE_SPACING;
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const OSC_COUNT: usize = 3;
const REG_COUNT: usize = 14;
const LATCH_PORT: u16 = 0xC000;
const DATA_PORT: u16 = 0xE000;
const LATCH_SLOT: usize = REG_COUNT;

const AMP_RANGE: i32 = 192;

/// Output level per 4-bit volume, about 3 dB per step (scaled to `AMP_RANGE`).
const AMP_TABLE: [i32; 16] = [0, 1, 2, 3, 4, 6, 8, 12, 17, 24, 34, 48, 68, 96, 136, 192];

/// Tone period multiplier (clock divider of the PSG).
const PERIOD_FACTOR: i64 = 16;

#[derive(Debug, Clone, Copy, Default)]
struct ToneOsc {
    route: ChannelRoute,
    last_amp: i32,
    delay: i64,
    phase: bool,
}

/// Sunsoft 5B sound.
#[derive(Debug, Clone)]
pub struct Sunsoft {
    regs: [u8; REG_COUNT],
    latch: u8,
    oscs: [ToneOsc; OSC_COUNT],
    last_time: i64,
    synth: BlipSynth,
    warned_unsupported: bool,
    shadow: ShadowRegisters<{ REG_COUNT + 1 }>,
}

impl Sunsoft {
    /// Create a 5B with every channel silenced.
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; REG_COUNT],
            latch: 0,
            oscs: [ToneOsc::default(); OSC_COUNT],
            last_time: 0,
            synth: BlipSynth::new(Quality::Good, 1),
            warned_unsupported: false,
            shadow: ShadowRegisters::new(),
        };
        chip.set_volume(1.0);
        chip
    }

    /// PSG registers R0-R13.
    pub fn registers(&self) -> &[u8; REG_COUNT] {
        &self.regs
    }

    /// Currently selected register.
    pub fn latch(&self) -> u8 {
        self.latch
    }

    fn tone_period(&self, index: usize) -> i64 {
        (i64::from(self.regs[index * 2 + 1] & 0x0F) * 0x100 + i64::from(self.regs[index * 2])) * PERIOD_FACTOR
    }

    fn run_until(&mut self, end_time: i64, out: &mut OutputBuffers) {
        debug_assert!(end_time >= self.last_time);
        for index in 0..OSC_COUNT {
            let mode = self.regs[7] >> index;
            let vol_mode = self.regs[8 + index];
            let mut volume = AMP_TABLE[usize::from(vol_mode & 0x0F)];
            let mut period = self.tone_period(index);

            let osc = &mut self.oscs[index];
            let Some(buf) = out.get_mut(osc.route) else {
                continue;
            };

            let noise_on = mode & 0x08 == 0;
            let envelope_on = vol_mode & 0x10 != 0;
            if (noise_on || envelope_on) && vol_mode & 0x1F != 0 && !self.warned_unsupported {
                self.warned_unsupported = true;
                log::warn!("5B: noise/envelope mode is not synthesised (mixer ${:02X}, volume ${vol_mode:02X})", self.regs[7]);
            }
            if mode & 0x01 != 0 || envelope_on {
                volume = 0;
            }

            // around 22 kHz
            if period < 50 {
                volume = 0;
                if period == 0 {
                    period = PERIOD_FACTOR;
                }
            }

            let amp = if osc.phase { volume } else { 0 };
            let delta = amp - osc.last_amp;
            if delta != 0 {
                osc.last_amp = amp;
                self.synth.offset(self.last_time, delta, buf);
            }

            let mut time = self.last_time + osc.delay;
            if time < end_time {
                if volume != 0 {
                    let mut delta = amp * 2 - volume;
                    loop {
                        delta = -delta;
                        self.synth.offset(time, delta, buf);
                        time += period;
                        if time >= end_time {
                            break;
                        }
                    }
                    osc.last_amp = (delta + volume) >> 1;
                    osc.phase = delta > 0;
                } else {
                    // keep phase while silent
                    let count = (end_time - time + period - 1) / period;
                    osc.phase ^= count & 1 != 0;
                    time += count * period;
                }
            }
            osc.delay = time - end_time;
        }
        self.last_time = end_time;
    }
}

impl Default for Sunsoft {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundChip for Sunsoft {
    fn kind(&self) -> ChipKind {
        ChipKind::Sunsoft
    }

    fn reset(&mut self) {
        self.last_time = 0;
        self.latch = 0;
        self.regs = [0; REG_COUNT];
        self.warned_unsupported = false;
        for osc in &mut self.oscs {
            osc.last_amp = 0;
            osc.delay = 0;
            osc.phase = false;
        }
    }

    fn set_volume(&mut self, volume: f64) {
        self.synth.volume(0.38 / f64::from(AMP_RANGE) * volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.synth.treble_eq(eq);
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        if let Some(osc) = self.oscs.get_mut(index) {
            osc.route = route;
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        match addr {
            LATCH_PORT => self.latch = data,
            DATA_PORT => {
                let reg = usize::from(self.latch);
                if reg < REG_COUNT {
                    self.run_until(time, out);
                    self.regs[reg] = data;
                }
            }
            _ => {}
        }
    }

    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers) {
        if time > self.last_time {
            self.run_until(time, out);
        }
        self.last_time -= time;
        debug_assert!(self.last_time >= 0);
    }

    fn start_seeking(&mut self) {
        self.shadow.clear();
    }

    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        for (reg, value) in shadow.entries().filter(|&(i, _)| i < REG_COUNT) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, LATCH_PORT, reg as u8, out);
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, DATA_PORT, value, out);
        }
        if let Some(latch) = shadow.get(LATCH_SLOT) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, LATCH_PORT, latch, out);
        }
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        match addr {
            LATCH_PORT => {
                self.latch = data;
                self.shadow.set(LATCH_SLOT, data);
            }
            DATA_PORT if usize::from(self.latch) < REG_COUNT => {
                self.shadow.set(usize::from(self.latch), data);
            }
            _ => {}
        }
    }
}

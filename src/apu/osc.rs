//! Pulse, triangle and noise oscillators
//!
//! Each oscillator renders whole timer periods between two clock times and
//! carries the leftover `delay` into the next call, so output is exact no
//! matter how the frame is split by register writes.

use crate::blip::BlipSynth;
use crate::output::{ChannelRoute, OutputBuffers};

/// Length counter load values, indexed by bits 3-7 of the fourth register.
pub(crate) const LENGTH_TABLE: [u8; 0x20] = [
    0x0A, 0xFE, 0x14, 0x02, 0x28, 0x04, 0x50, 0x06, 0xA0, 0x08, 0x3C, 0x0A, 0x0E, 0x0C, 0x1A, 0x0E,
    0x0C, 0x10, 0x18, 0x12, 0x30, 0x14, 0x60, 0x16, 0xC0, 0x18, 0x48, 0x1A, 0x10, 0x1C, 0x20, 0x1E,
];

/// Register file and timing shared by every oscillator.
#[derive(Debug, Clone, Default)]
pub(crate) struct OscState {
    pub regs: [u8; 4],
    pub reg_written: [bool; 4],
    pub route: ChannelRoute,
    pub length_counter: u32,
    /// Clocks past the end of the last run until the next timer event
    pub delay: i64,
    pub last_amp: i32,
}

impl OscState {
    pub fn reset(&mut self) {
        self.delay = 0;
        self.last_amp = 0;
    }

    pub fn clock_length(&mut self, halt_mask: u8) {
        if self.length_counter != 0 && self.regs[0] & halt_mask == 0 {
            self.length_counter -= 1;
        }
    }

    /// 11-bit timer period.
    #[inline]
    pub fn period(&self) -> i64 {
        (i64::from(self.regs[3] & 7) << 8) | i64::from(self.regs[2])
    }

    #[inline]
    pub fn update_amp(&mut self, amp: i32) -> i32 {
        let delta = amp - self.last_amp;
        self.last_amp = amp;
        delta
    }
}

/// Decay envelope used by the pulses and noise.
#[derive(Debug, Clone, Default)]
pub(crate) struct Envelope {
    pub level: i32,
    pub delay: i32,
}

impl Envelope {
    pub fn reset(&mut self) {
        self.level = 0;
        self.delay = 0;
    }

    pub fn clock(&mut self, osc: &mut OscState) {
        let period = i32::from(osc.regs[0] & 15);
        if osc.reg_written[3] {
            osc.reg_written[3] = false;
            self.delay = period;
            self.level = 15;
        } else {
            self.delay -= 1;
            if self.delay < 0 {
                self.delay = period;
                if self.level != 0 || osc.regs[0] & 0x20 != 0 {
                    self.level = (self.level - 1) & 15;
                }
            }
        }
    }

    /// Constant volume or envelope level, zero once the length counter ran out.
    #[inline]
    pub fn volume(&self, osc: &OscState) -> i32 {
        if osc.length_counter == 0 {
            0
        } else if osc.regs[0] & 0x10 != 0 {
            i32::from(osc.regs[0] & 15)
        } else {
            self.level
        }
    }
}

/// Pulse channel (also used by MMC5).
#[derive(Debug, Clone, Default)]
pub(crate) struct Square {
    pub osc: OscState,
    pub env: Envelope,
    pub phase: i32,
    pub sweep_delay: i32,
}

impl Square {
    pub const PHASE_RANGE: i32 = 8;
    const NEGATE_FLAG: u8 = 0x08;
    const SHIFT_MASK: u8 = 0x07;

    pub fn reset(&mut self) {
        self.sweep_delay = 0;
        self.env.reset();
        self.osc.reset();
    }

    #[inline]
    pub fn volume(&self) -> i32 {
        self.env.volume(&self.osc)
    }

    pub fn clock_envelope(&mut self) {
        self.env.clock(&mut self.osc);
    }

    /// Pulse 1 passes -1 (ones' complement negate), pulse 2 passes 0.
    pub fn clock_sweep(&mut self, negative_adjust: i64) {
        let sweep = self.osc.regs[1];

        self.sweep_delay -= 1;
        if self.sweep_delay < 0 {
            self.osc.reg_written[1] = true;
            let mut period = self.osc.period();
            let shift = sweep & Self::SHIFT_MASK;
            if shift != 0 && sweep & 0x80 != 0 && period >= 8 {
                let mut offset = period >> shift;
                if sweep & Self::NEGATE_FLAG != 0 {
                    offset = negative_adjust - offset;
                }
                if period + offset < 0x800 {
                    period += offset;
                    self.osc.regs[2] = (period & 0xFF) as u8;
                    self.osc.regs[3] = (self.osc.regs[3] & !7) | ((period >> 8) & 7) as u8;
                }
            }
        }

        if self.osc.reg_written[1] {
            self.osc.reg_written[1] = false;
            self.sweep_delay = i32::from((sweep >> 4) & 7);
        }
    }

    fn maintain_phase(&mut self, time: i64, end_time: i64, timer_period: i64) -> i64 {
        let remain = end_time - time;
        if remain > 0 {
            let count = (remain + timer_period - 1) / timer_period;
            self.phase = ((i64::from(self.phase) + count) & i64::from(Self::PHASE_RANGE - 1)) as i32;
            time + count * timer_period
        } else {
            time
        }
    }

    pub fn run(&mut self, time: i64, end_time: i64, synth: &BlipSynth, out: &mut OutputBuffers) {
        self.run_with_sweep(time, end_time, synth, out, true);
    }

    /// Render from `time` to `end_time`. `sweep_mutes` enables the sweep
    /// unit's overflow muting (absent on MMC5).
    pub fn run_with_sweep(
        &mut self,
        mut time: i64,
        end_time: i64,
        synth: &BlipSynth,
        out: &mut OutputBuffers,
        sweep_mutes: bool,
    ) {
        let period = self.osc.period();
        let timer_period = (period + 1) * 2;

        let Some(buf) = out.get_mut(self.osc.route) else {
            self.osc.delay = self.maintain_phase(time + self.osc.delay, end_time, timer_period) - end_time;
            return;
        };

        let mut offset = period >> (self.osc.regs[1] & Self::SHIFT_MASK);
        if self.osc.regs[1] & Self::NEGATE_FLAG != 0 || !sweep_mutes {
            offset = 0;
        }

        let volume = self.volume();
        if volume == 0 || period < 8 || period + offset >= 0x800 {
            if self.osc.last_amp != 0 {
                synth.offset(time, -self.osc.last_amp, buf);
                self.osc.last_amp = 0;
            }
            time += self.osc.delay;
            time = self.maintain_phase(time, end_time, timer_period);
        } else {
            // duty select 3 is 25% negated
            let duty_select = (self.osc.regs[0] >> 6) & 3;
            let mut duty = 1 << duty_select;
            let mut amp = 0;
            if duty_select == 3 {
                duty = 2;
                amp = volume;
            }
            if self.phase < duty {
                amp ^= volume;
            }

            let delta = self.osc.update_amp(amp);
            if delta != 0 {
                synth.offset(time, delta, buf);
            }

            time += self.osc.delay;
            if time < end_time {
                let mut delta = amp * 2 - volume;
                let mut phase = self.phase;
                loop {
                    phase = (phase + 1) & (Self::PHASE_RANGE - 1);
                    if phase == 0 || phase == duty {
                        delta = -delta;
                        synth.offset(time, delta, buf);
                    }
                    time += timer_period;
                    if time >= end_time {
                        break;
                    }
                }
                self.osc.last_amp = (delta + volume) >> 1;
                self.phase = phase;
            }
        }

        self.osc.delay = time - end_time;
    }
}

/// Triangle channel.
#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    pub osc: OscState,
    pub phase: i32,
    pub linear_counter: u32,
}

impl Default for Triangle {
    fn default() -> Self {
        Self {
            osc: OscState::default(),
            phase: Self::PHASE_RANGE,
            linear_counter: 0,
        }
    }
}

impl Triangle {
    pub const PHASE_RANGE: i32 = 16;

    pub fn reset(&mut self) {
        self.linear_counter = 0;
        self.phase = Self::PHASE_RANGE;
        self.osc.reset();
    }

    pub fn clock_linear_counter(&mut self) {
        if self.osc.reg_written[3] {
            self.linear_counter = u32::from(self.osc.regs[0] & 0x7F);
        } else if self.linear_counter != 0 {
            self.linear_counter -= 1;
        }
        if self.osc.regs[0] & 0x80 == 0 {
            self.osc.reg_written[3] = false;
        }
    }

    /// Current 0-15 step of the 32-step ramp.
    #[inline]
    pub fn calc_amp(&self) -> i32 {
        let amp = Self::PHASE_RANGE - self.phase;
        if amp < 0 {
            self.phase - (Self::PHASE_RANGE + 1)
        } else {
            amp
        }
    }

    pub fn run(&mut self, mut time: i64, end_time: i64, synth: &BlipSynth, out: &mut OutputBuffers) {
        let timer_period = self.osc.period() + 1;
        let running = self.osc.length_counter != 0 && self.linear_counter != 0 && timer_period >= 3;

        let Some(buf) = out.get_mut(self.osc.route) else {
            time += self.osc.delay;
            self.osc.delay = 0;
            if running {
                let remain = end_time - time;
                if remain > 0 {
                    let count = (remain + timer_period - 1) / timer_period;
                    let wrap = i64::from(Self::PHASE_RANGE * 2 - 1);
                    self.phase = (((i64::from(self.phase) + 1 - count) & wrap) + 1) as i32;
                    time += count * timer_period;
                }
                self.osc.delay = time - end_time;
            }
            return;
        };

        let delta = self.osc.update_amp(self.calc_amp());
        if delta != 0 {
            synth.offset(time, delta, buf);
        }

        time += self.osc.delay;
        if !running {
            time = end_time;
        } else if time < end_time {
            let mut phase = self.phase;
            let mut volume = 1;
            if phase > Self::PHASE_RANGE {
                phase -= Self::PHASE_RANGE;
                volume = -volume;
            }

            loop {
                phase -= 1;
                if phase == 0 {
                    phase = Self::PHASE_RANGE;
                    volume = -volume;
                } else {
                    synth.offset(time, volume, buf);
                }
                time += timer_period;
                if time >= end_time {
                    break;
                }
            }

            if volume < 0 {
                phase += Self::PHASE_RANGE;
            }
            self.phase = phase;
            self.osc.last_amp = self.calc_amp();
        }

        self.osc.delay = time - end_time;
    }
}

/// Noise timer periods, NTSC then PAL.
const NOISE_PERIOD_TABLE: [[i64; 16]; 2] = [
    [
        0x004, 0x008, 0x010, 0x020, 0x040, 0x060, 0x080, 0x0A0, 0x0CA, 0x0FE, 0x17C, 0x1FC, 0x2FA,
        0x3F8, 0x7F2, 0xFE4,
    ],
    [
        0x004, 0x008, 0x00E, 0x01E, 0x03C, 0x058, 0x076, 0x094, 0x0BC, 0x0EC, 0x162, 0x1D8, 0x2C4,
        0x3B0, 0x762, 0xEC2,
    ],
];

/// Noise channel.
#[derive(Debug, Clone)]
pub(crate) struct Noise {
    pub osc: OscState,
    pub env: Envelope,
    /// 15-bit LFSR
    pub shift_reg: i32,
    pub pal: bool,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            osc: OscState::default(),
            env: Envelope::default(),
            shift_reg: 1 << 14,
            pal: false,
        }
    }
}

impl Noise {
    const MODE_FLAG: u8 = 0x80;

    pub fn reset(&mut self) {
        self.shift_reg = 1 << 14;
        self.env.reset();
        self.osc.reset();
    }

    #[inline]
    pub fn volume(&self) -> i32 {
        self.env.volume(&self.osc)
    }

    pub fn clock_envelope(&mut self) {
        self.env.clock(&mut self.osc);
    }

    pub fn run(&mut self, mut time: i64, end_time: i64, synth: &BlipSynth, out: &mut OutputBuffers) {
        let period = NOISE_PERIOD_TABLE[usize::from(self.pal)][usize::from(self.osc.regs[2] & 15)];

        let Some(buf) = out.get_mut(self.osc.route) else {
            time += self.osc.delay;
            self.osc.delay = time + (end_time - time + period - 1) / period * period - end_time;
            return;
        };

        let volume = self.volume();
        let amp = if self.shift_reg & 1 != 0 { volume } else { 0 };
        let delta = self.osc.update_amp(amp);
        if delta != 0 {
            synth.offset(time, delta, buf);
        }

        time += self.osc.delay;
        if time < end_time {
            if volume == 0 {
                // round to next multiple of period
                time += (end_time - time + period - 1) / period * period;

                // approximate LFSR cycling while muted
                if self.osc.regs[2] & Self::MODE_FLAG == 0 {
                    let feedback = (self.shift_reg << 13) ^ (self.shift_reg << 14);
                    self.shift_reg = (feedback & 0x4000) | (self.shift_reg >> 1);
                }
            } else {
                let tap = if self.osc.regs[2] & Self::MODE_FLAG != 0 { 8 } else { 13 };
                let mut noise = self.shift_reg;
                let mut delta = amp * 2 - volume;
                loop {
                    let feedback = (noise << tap) ^ (noise << 14);
                    // bits 0 and 1 differ
                    if (noise + 1) & 2 != 0 {
                        delta = -delta;
                        synth.offset(time, delta, buf);
                    }
                    time += period;
                    noise = (feedback & 0x4000) | (noise >> 1);
                    if time >= end_time {
                        break;
                    }
                }
                self.osc.last_amp = (delta + volume) >> 1;
                self.shift_reg = noise;
            }
        }

        self.osc.delay = time - end_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_decays_and_loops() {
        let mut osc = OscState {
            length_counter: 10,
            ..Default::default()
        };
        osc.regs[0] = 0x20; // loop, period 0
        osc.reg_written[3] = true;
        let mut env = Envelope::default();
        env.clock(&mut osc);
        assert_eq!(env.volume(&osc), 15);
        for _ in 0..15 {
            env.clock(&mut osc);
        }
        assert_eq!(env.level, 0);
        env.clock(&mut osc);
        assert_eq!(env.level, 15, "loop flag wraps the envelope");
    }

    #[test]
    fn test_constant_volume_and_length_mute() {
        let mut osc = OscState::default();
        osc.regs[0] = 0x1A;
        let env = Envelope::default();
        assert_eq!(env.volume(&osc), 0, "length counter zero mutes");
        osc.length_counter = 1;
        assert_eq!(env.volume(&osc), 10);
    }

    #[test]
    fn test_sweep_adds_shifted_period() {
        let mut sq = Square::default();
        sq.osc.regs[1] = 0x81; // enabled, period 0, shift 1
        sq.osc.regs[2] = 0x00;
        sq.osc.regs[3] = 0x01; // period 0x100
        sq.clock_sweep(0);
        assert_eq!(sq.osc.period(), 0x180);
    }

    #[test]
    fn test_pulse1_negate_is_ones_complement() {
        let mut sq1 = Square::default();
        sq1.osc.regs[1] = 0x89; // negate, shift 1
        sq1.osc.regs[3] = 0x01;
        sq1.clock_sweep(-1);
        assert_eq!(sq1.osc.period(), 0x100 - 0x80 - 1);

        let mut sq2 = Square::default();
        sq2.osc.regs[1] = 0x89;
        sq2.osc.regs[3] = 0x01;
        sq2.clock_sweep(0);
        assert_eq!(sq2.osc.period(), 0x80);
    }

    #[test]
    fn test_triangle_ramp_shape() {
        let mut tri = Triangle::default();
        let amps: Vec<i32> = (1..=32)
            .map(|p| {
                tri.phase = p;
                tri.calc_amp()
            })
            .collect();
        assert_eq!(amps[15], 0); // phase 16
        assert_eq!(amps[0], 15); // phase 1
        assert_eq!(amps[31], 15); // phase 32
        assert!(amps.iter().all(|&a| (0..=15).contains(&a)));
    }

    #[test]
    fn test_linear_counter_reload_and_control() {
        let mut tri = Triangle::default();
        tri.osc.regs[0] = 0x05;
        tri.osc.reg_written[3] = true;
        tri.clock_linear_counter();
        assert_eq!(tri.linear_counter, 5);
        tri.clock_linear_counter();
        assert_eq!(tri.linear_counter, 4);
    }
}

//! Konami VRC6
//!
//! Two pulse channels with 8 duty steps and a digitised-mode gate, plus a
//! sawtooth accumulator. Registers are `$9000-$9002`, `$A000-$A002` and
//! `$B000-$B002`.

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const OSC_COUNT: usize = 3;
const REGS_PER_OSC: usize = 3;
const BASE_ADDR: u16 = 0x9000;
const LAST_ADDR: u16 = 0xB002;
const SAW: usize = 2;

#[derive(Debug, Clone, Default)]
struct Vrc6Osc {
    regs: [u8; REGS_PER_OSC],
    route: ChannelRoute,
    delay: i64,
    last_amp: i32,
    phase: i32,
    /// Saw accumulator
    amp: i32,
}

impl Vrc6Osc {
    fn reset(&mut self) {
        self.regs = [0; REGS_PER_OSC];
        self.delay = 0;
        self.last_amp = 0;
        self.phase = 1;
        self.amp = 0;
    }

    #[inline]
    fn period(&self) -> i64 {
        i64::from(self.regs[2] & 0x0F) * 0x100 + i64::from(self.regs[1]) + 1
    }

    #[inline]
    fn enabled(&self) -> bool {
        self.regs[2] & 0x80 != 0
    }
}

/// VRC6 sound.
#[derive(Debug, Clone)]
pub struct Vrc6 {
    oscs: [Vrc6Osc; OSC_COUNT],
    last_time: i64,
    square_synth: BlipSynth,
    saw_synth: BlipSynth,
    shadow: ShadowRegisters<{ OSC_COUNT * REGS_PER_OSC }>,
}

impl Vrc6 {
    /// Create a VRC6 with every channel silenced.
    pub fn new() -> Self {
        let mut chip = Self {
            oscs: Default::default(),
            last_time: 0,
            square_synth: BlipSynth::new(Quality::Good, 15),
            saw_synth: BlipSynth::new(Quality::Good, 31),
            shadow: ShadowRegisters::new(),
        };
        chip.set_volume(1.0);
        chip.reset();
        chip
    }

    /// `(oscillator, register)` decoded from a bus address.
    fn decode(addr: u16) -> Option<(usize, usize)> {
        if !(BASE_ADDR..=LAST_ADDR).contains(&addr) {
            return None;
        }
        let osc = usize::from((addr - BASE_ADDR) >> 12);
        let reg = usize::from(addr & 0x0FFF);
        (reg < REGS_PER_OSC).then_some((osc, reg))
    }

    /// Raw register value of one oscillator.
    pub fn register(&self, osc: usize, reg: usize) -> Option<u8> {
        self.oscs.get(osc).and_then(|o| o.regs.get(reg)).copied()
    }

    fn run_until(&mut self, time: i64, out: &mut OutputBuffers) {
        debug_assert!(time >= self.last_time);
        for index in 0..SAW {
            self.run_square(index, time, out);
        }
        self.run_saw(time, out);
        self.last_time = time;
    }

    fn run_square(&mut self, index: usize, end_time: i64, out: &mut OutputBuffers) {
        let osc = &mut self.oscs[index];
        let Some(buf) = out.get_mut(osc.route) else {
            return;
        };

        let volume = if osc.enabled() { i32::from(osc.regs[0] & 15) } else { 0 };
        let gate = osc.regs[0] & 0x80 != 0;
        let duty = i32::from((osc.regs[0] >> 4) & 7) + 1;

        let mut time = self.last_time;
        let amp = if gate || osc.phase < duty { volume } else { 0 };
        let delta = amp - osc.last_amp;
        if delta != 0 {
            osc.last_amp = amp;
            self.square_synth.offset(time, delta, buf);
        }

        time += osc.delay;
        osc.delay = 0;
        let period = osc.period();
        if volume != 0 && !gate && period > 4 {
            if time < end_time {
                let mut phase = osc.phase;
                loop {
                    phase += 1;
                    if phase == 16 {
                        phase = 0;
                        osc.last_amp = volume;
                        self.square_synth.offset(time, volume, buf);
                    }
                    if phase == duty {
                        osc.last_amp = 0;
                        self.square_synth.offset(time, -volume, buf);
                    }
                    time += period;
                    if time >= end_time {
                        break;
                    }
                }
                osc.phase = phase;
            }
            osc.delay = time - end_time;
        }
    }

    fn run_saw(&mut self, end_time: i64, out: &mut OutputBuffers) {
        let osc = &mut self.oscs[SAW];
        let Some(buf) = out.get_mut(osc.route) else {
            return;
        };

        let mut amp = osc.amp;
        let amp_step = i32::from(osc.regs[0] & 0x3F);
        let mut time = self.last_time;
        let mut last_amp = osc.last_amp;

        if !osc.enabled() || (amp_step | amp) == 0 {
            osc.delay = 0;
            let delta = (amp >> 3) - last_amp;
            last_amp = amp >> 3;
            self.saw_synth.offset(time, delta, buf);
        } else {
            time += osc.delay;
            if time < end_time {
                let period = osc.period() * 2;
                let mut phase = osc.phase;
                loop {
                    phase -= 1;
                    if phase == 0 {
                        phase = 7;
                        amp = 0;
                    }

                    let delta = (amp >> 3) - last_amp;
                    if delta != 0 {
                        last_amp = amp >> 3;
                        self.saw_synth.offset(time, delta, buf);
                    }

                    time += period;
                    amp = (amp + amp_step) & 0xFF;
                    if time >= end_time {
                        break;
                    }
                }
                osc.phase = phase;
                osc.amp = amp;
            }
            osc.delay = time - end_time;
        }
        osc.last_amp = last_amp;
    }
}

impl Default for Vrc6 {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundChip for Vrc6 {
    fn kind(&self) -> ChipKind {
        ChipKind::Vrc6
    }

    fn reset(&mut self) {
        self.last_time = 0;
        for osc in &mut self.oscs {
            osc.reset();
        }
    }

    fn set_volume(&mut self, volume: f64) {
        let factor = 0.0967 * 2.0;
        self.saw_synth.volume(factor * volume);
        self.square_synth.volume(factor * 0.5 * volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.square_synth.treble_eq(eq);
        self.saw_synth.treble_eq(eq);
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        if let Some(osc) = self.oscs.get_mut(index) {
            osc.route = route;
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        let Some((osc, reg)) = Self::decode(addr) else {
            return;
        };
        self.run_until(time, out);
        self.oscs[osc].regs[reg] = data;
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
        shadow.replay(clock, |time, index, value| {
            let addr = BASE_ADDR + ((index / REGS_PER_OSC) as u16) * 0x1000 + (index % REGS_PER_OSC) as u16;
            self.write_register(time, addr, value, out);
        });
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        if let Some((osc, reg)) = Self::decode(addr) {
            self.shadow.set(osc * REGS_PER_OSC + reg, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::tests::{linear_buffers, total_energy};

    #[test]
    fn test_address_decoding() {
        assert_eq!(Vrc6::decode(0x9000), Some((0, 0)));
        assert_eq!(Vrc6::decode(0xA002), Some((1, 2)));
        assert_eq!(Vrc6::decode(0xB001), Some((2, 1)));
        assert_eq!(Vrc6::decode(0x9003), None);
        assert_eq!(Vrc6::decode(0xC000), None);
        assert_eq!(Vrc6::decode(0x4000), None);
    }

    #[test]
    fn test_square_produces_output() {
        let mut out = linear_buffers();
        let mut chip = Vrc6::new();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0x9000, 0x7F, &mut out); // duty 8/16, volume 15
        chip.write_register(0, 0x9001, 0x00, &mut out);
        chip.write_register(0, 0x9002, 0x81, &mut out);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(total_energy(out.linear()) > 0);
    }

    #[test]
    fn test_disabled_channel_is_silent() {
        let mut out = linear_buffers();
        let mut chip = Vrc6::new();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0xB000, 0x3F, &mut out);
        chip.write_register(0, 0xB001, 0x20, &mut out);
        chip.write_register(0, 0xB002, 0x00, &mut out); // not enabled
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert_eq!(total_energy(out.linear()), 0);
    }

    #[test]
    fn test_saw_accumulator_wraps_every_seven_steps() {
        let mut out = linear_buffers();
        let mut chip = Vrc6::new();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0xB000, 0x2A, &mut out);
        chip.write_register(0, 0xB001, 0x10, &mut out);
        chip.write_register(0, 0xB002, 0x80, &mut out);
        chip.end_frame(20_000, &mut out);
        let saw = &chip.oscs[SAW];
        assert!((1..=7).contains(&saw.phase));
        assert!(saw.amp <= 6 * 0x2A);
    }

    #[test]
    fn test_seek_replays_last_values() {
        let mut out = linear_buffers();
        let mut chip = Vrc6::new();
        chip.start_seeking();
        chip.write_shadow_register(0xA001, 0x11);
        chip.write_shadow_register(0xA001, 0x22);
        chip.write_shadow_register(0x9002, 0x85);
        let mut clock = 100;
        chip.stop_seeking(&mut clock, &mut out);
        assert_eq!(clock, 108);
        assert_eq!(chip.register(1, 1), Some(0x22));
        assert_eq!(chip.register(0, 2), Some(0x85));
        assert_eq!(chip.register(2, 0), Some(0));
    }
}

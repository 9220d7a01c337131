//! Namco 163
//!
//! 128 bytes of internal RAM hold 4-bit waveforms and eight channel register
//! blocks (`$40-$7F`). `$F800` sets the RAM address (bit 7 enables
//! auto-increment), `$4800` reads/writes the addressed byte. The active
//! channels (1-8, from the top of the bank) are time-multiplexed, so each
//! one runs slower as more are enabled.

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::constants::SEEK_WRITE_SPACING;
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const OSC_COUNT: usize = 8;
const RAM_SIZE: usize = 0x80;
const ADDR_PORT: u16 = 0xF800;
const DATA_PORT: u16 = 0x4800;
const AUTO_INCREMENT: u8 = 0x80;

/// Clocks per channel update step, scaled for the frequency register.
const CLOCKS_PER_STEP: u64 = 983_040;

/// Shadow slot that holds the address latch.
const LATCH_SLOT: usize = RAM_SIZE;

#[derive(Debug, Clone, Copy, Default)]
struct NamcoOsc {
    route: ChannelRoute,
    /// Resampled time past the end of the last run
    delay: u64,
    last_amp: i32,
    wave_pos: u32,
}

/// Namco 163 sound.
#[derive(Debug, Clone)]
pub struct Namco {
    oscs: [NamcoOsc; OSC_COUNT],
    ram: [u8; RAM_SIZE],
    addr_reg: u8,
    last_time: i64,
    synth: BlipSynth,
    shadow: ShadowRegisters<{ RAM_SIZE + 1 }>,
}

impl Namco {
    /// Create a Namco 163 with every channel silenced.
    pub fn new() -> Self {
        let mut chip = Self {
            oscs: [NamcoOsc::default(); OSC_COUNT],
            ram: [0; RAM_SIZE],
            addr_reg: 0,
            last_time: 0,
            synth: BlipSynth::new(Quality::Good, 15),
            shadow: ShadowRegisters::new(),
        };
        chip.set_volume(1.0);
        chip
    }

    /// Internal RAM.
    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    /// Current address latch (bit 7 = auto-increment).
    pub fn address(&self) -> u8 {
        self.addr_reg
    }

    /// Number of channels currently multiplexed.
    pub fn active_channels(&self) -> usize {
        usize::from((self.ram[0x7F] >> 4) & 7) + 1
    }

    /// Select the addressed byte, stepping the latch when auto-increment is on.
    fn access(&mut self) -> usize {
        let addr = self.addr_reg & 0x7F;
        if self.addr_reg & AUTO_INCREMENT != 0 {
            self.addr_reg = ((addr + 1) & 0x7F) | AUTO_INCREMENT;
        }
        usize::from(addr)
    }

    /// `$4800` read.
    pub fn read_data(&mut self) -> u8 {
        let addr = self.access();
        self.ram[addr]
    }

    fn run_until(&mut self, nes_end_time: i64, out: &mut OutputBuffers) {
        let active = self.active_channels();
        for index in OSC_COUNT - active..OSC_COUNT {
            let osc = &mut self.oscs[index];
            let Some(buf) = out.get_mut(osc.route) else {
                continue;
            };

            let mut time = buf.resampled_time(self.last_time) + osc.delay;
            let end_time = buf.resampled_time(nes_end_time);
            osc.delay = 0;
            if time < end_time {
                let regs = &self.ram[0x40 + index * 8..0x48 + index * 8];
                let volume = i32::from(regs[7] & 15);
                if volume == 0 {
                    continue;
                }

                let freq = u64::from(regs[4] & 3) * 0x10000 + u64::from(regs[2]) * 0x100 + u64::from(regs[0]);
                // low frequencies would delay register changes too much
                if freq < 64 * active as u64 {
                    continue;
                }
                let period = buf.resampled_duration(CLOCKS_PER_STEP) / freq * active as u64;
                let wave_size = 256 - u32::from(regs[4] & 0xFC);
                let wave_offset = u32::from(regs[6]);

                let mut last_amp = osc.last_amp;
                let mut wave_pos = osc.wave_pos % wave_size;
                loop {
                    let addr = (wave_pos + wave_offset) & 0xFF;
                    let byte = self.ram[(addr >> 1) as usize];
                    let sample = i32::from((byte >> ((addr & 1) * 4)) & 15) * volume;
                    wave_pos += 1;
                    if wave_pos >= wave_size {
                        wave_pos = 0;
                    }

                    let delta = sample - last_amp;
                    if delta != 0 {
                        last_amp = sample;
                        self.synth.offset_resampled(time, delta, buf);
                    }

                    time += period;
                    if time >= end_time {
                        break;
                    }
                }
                osc.wave_pos = wave_pos;
                osc.last_amp = last_amp;
            }
            osc.delay = time - end_time;
        }
        self.last_time = nes_end_time;
    }
}

impl Default for Namco {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundChip for Namco {
    fn kind(&self) -> ChipKind {
        ChipKind::Namco
    }

    fn reset(&mut self) {
        self.last_time = 0;
        self.addr_reg = 0;
        self.ram = [0; RAM_SIZE];
        for osc in &mut self.oscs {
            osc.delay = 0;
            osc.last_amp = 0;
            osc.wave_pos = 0;
        }
    }

    fn set_volume(&mut self, volume: f64) {
        self.synth.volume(0.10 / OSC_COUNT as f64 * volume);
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
            ADDR_PORT => self.addr_reg = data,
            DATA_PORT => {
                self.run_until(time, out);
                let index = self.access();
                self.ram[index] = data;
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

    /// Each touched byte is written back through an explicit address, then
    /// the latch is restored.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        for (index, value) in shadow.entries().filter(|&(i, _)| i < RAM_SIZE) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, ADDR_PORT, index as u8, out);
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, DATA_PORT, value, out);
        }
        if let Some(latch) = shadow.get(LATCH_SLOT) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, ADDR_PORT, latch, out);
        }
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        match addr {
            ADDR_PORT => self.addr_reg = data,
            DATA_PORT => {
                let index = self.access();
                self.shadow.set(index, data);
            }
            _ => return,
        }
        self.shadow.set(LATCH_SLOT, self.addr_reg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::tests::{linear_buffers, total_energy};

    fn write_bytes(chip: &mut Namco, out: &mut OutputBuffers, start: u8, bytes: &[u8]) {
        chip.write_register(0, ADDR_PORT, start | AUTO_INCREMENT, out);
        for &b in bytes {
            chip.write_register(0, DATA_PORT, b, out);
        }
    }

    #[test]
    fn test_auto_increment_wraps() {
        let mut out = linear_buffers();
        let mut chip = Namco::new();
        write_bytes(&mut chip, &mut out, 0x7F, &[0x11, 0x22]);
        assert_eq!(chip.ram()[0x7F], 0x11);
        assert_eq!(chip.ram()[0x00], 0x22);
        assert_eq!(chip.address(), 0x81);
    }

    #[test]
    fn test_no_increment_without_flag() {
        let mut out = linear_buffers();
        let mut chip = Namco::new();
        chip.write_register(0, ADDR_PORT, 0x10, &mut out);
        chip.write_register(0, DATA_PORT, 0xAA, &mut out);
        chip.write_register(0, DATA_PORT, 0xBB, &mut out);
        assert_eq!(chip.ram()[0x10], 0xBB);
        assert_eq!(chip.ram()[0x11], 0x00);
    }

    #[test]
    fn test_active_channel_count() {
        let mut out = linear_buffers();
        let mut chip = Namco::new();
        assert_eq!(chip.active_channels(), 1);
        chip.write_register(0, ADDR_PORT, 0x7F, &mut out);
        chip.write_register(0, DATA_PORT, 0x70, &mut out);
        assert_eq!(chip.active_channels(), 8);
    }

    #[test]
    fn test_top_channel_plays_waveform() {
        let mut out = linear_buffers();
        let mut chip = Namco::new();
        chip.set_output(ChannelRoute::Linear, &out);
        // 16-sample square wave at RAM nibble 0
        write_bytes(&mut chip, &mut out, 0x00, &[0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        // channel 7: freq 0x10000, length 16, wave at 0, volume 15
        write_bytes(&mut chip, &mut out, 0x78, &[0x00, 0x00, 0x00, 0x00, 0xF1, 0x00, 0x00, 0x0F]);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(total_energy(out.linear()) > 0);
    }

    #[test]
    fn test_seek_tracks_latch() {
        let mut out = linear_buffers();
        let mut chip = Namco::new();
        chip.start_seeking();
        chip.write_shadow_register(ADDR_PORT, 0x80 | 0x20);
        chip.write_shadow_register(DATA_PORT, 0x01);
        chip.write_shadow_register(DATA_PORT, 0x02);
        chip.write_shadow_register(ADDR_PORT, 0x20);
        chip.write_shadow_register(DATA_PORT, 0x03);

        // seeking does not touch RAM
        assert_eq!(chip.ram()[0x20], 0);

        let mut clock = 0;
        chip.stop_seeking(&mut clock, &mut out);
        assert_eq!(chip.ram()[0x20], 0x03);
        assert_eq!(chip.ram()[0x21], 0x02);
        assert_eq!(chip.address(), 0x20);
        assert_eq!(clock, 2 * 2 * SEEK_WRITE_SPACING + SEEK_WRITE_SPACING);
    }
}

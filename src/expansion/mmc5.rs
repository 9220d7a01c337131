//! Nintendo MMC5
//!
//! Two pulses identical to the base APU's minus the sweep unit, an 8-bit
//! raw PCM level and a fixed 240 Hz sequencer for envelopes and lengths.

use crate::apu::SQUARE_VOLUME;
use crate::apu::osc::{Square, LENGTH_TABLE};
use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const SQUARE_COUNT: usize = 2;
const PCM: usize = 2;
const BASE_ADDR: u16 = 0x5000;
const LAST_ADDR: u16 = 0x5015;
const REG_COUNT: usize = (LAST_ADDR - BASE_ADDR + 1) as usize;

/// Sequencer period in CPU clocks (about 240 Hz on NTSC).
const FRAME_PERIOD: i64 = 7458;

/// Full-scale level of the PCM channel.
const PCM_VOLUME: f64 = 0.42;

/// MMC5 sound.
#[derive(Debug, Clone)]
pub struct Mmc5 {
    squares: [Square; SQUARE_COUNT],
    pcm_route: ChannelRoute,
    pcm_level: i32,
    pcm_last_amp: i32,
    pcm_read_mode: bool,
    enables: u8,

    last_time: i64,
    frame_delay: i64,
    frame: u32,

    square_synth: BlipSynth,
    pcm_synth: BlipSynth,
    shadow: ShadowRegisters<REG_COUNT>,
}

impl Mmc5 {
    /// Create an MMC5 with every channel silenced.
    pub fn new() -> Self {
        let mut chip = Self {
            squares: Default::default(),
            pcm_route: ChannelRoute::Silenced,
            pcm_level: 0,
            pcm_last_amp: 0,
            pcm_read_mode: false,
            enables: 0,
            last_time: 0,
            frame_delay: FRAME_PERIOD,
            frame: 0,
            square_synth: BlipSynth::new(Quality::Good, 15),
            pcm_synth: BlipSynth::new(Quality::Medium, 255),
            shadow: ShadowRegisters::new(),
        };
        chip.set_volume(1.0);
        chip.reset();
        chip
    }

    /// Length counter of pulse `index`.
    pub fn length_counter(&self, index: usize) -> u32 {
        self.squares.get(index).map_or(0, |sq| sq.osc.length_counter)
    }

    /// Pulse register at `addr` (`$5000-$5007`).
    pub fn register(&self, addr: u16) -> Option<u8> {
        match addr {
            0x5000..=0x5007 => {
                let index = usize::from((addr - BASE_ADDR) >> 2);
                Some(self.squares[index].osc.regs[usize::from(addr & 3)])
            }
            _ => None,
        }
    }

    /// Current PCM level.
    pub fn pcm_level(&self) -> u8 {
        self.pcm_level as u8
    }

    fn run_pcm(&mut self, time: i64, out: &mut OutputBuffers) {
        let delta = self.pcm_level - self.pcm_last_amp;
        if delta == 0 {
            return;
        }
        if let Some(buf) = out.get_mut(self.pcm_route) {
            self.pcm_synth.offset(time, delta, buf);
            self.pcm_last_amp = self.pcm_level;
        }
    }

    fn run_until(&mut self, end_time: i64, out: &mut OutputBuffers) {
        debug_assert!(end_time >= self.last_time);
        loop {
            let time = (self.last_time + self.frame_delay).min(end_time);
            self.frame_delay -= time - self.last_time;
            for sq in &mut self.squares {
                sq.run_with_sweep(self.last_time, time, &self.square_synth, out, false);
            }
            self.last_time = time;
            if time == end_time {
                break;
            }

            self.frame_delay = FRAME_PERIOD;
            self.frame = (self.frame + 1) & 3;
            for sq in &mut self.squares {
                sq.clock_envelope();
                if self.frame & 1 == 0 {
                    sq.osc.clock_length(0x20);
                }
            }
        }
    }

    fn apply_write(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        match addr {
            0x5000..=0x5007 => {
                let index = usize::from((addr - BASE_ADDR) >> 2);
                let reg = usize::from(addr & 3);
                let enabled = (self.enables >> index) & 1 != 0;
                let sq = &mut self.squares[index];
                sq.osc.regs[reg] = data;
                sq.osc.reg_written[reg] = true;
                if reg == 3 {
                    if enabled {
                        sq.osc.length_counter = u32::from(LENGTH_TABLE[usize::from(data >> 3)]);
                    }
                    sq.phase = Square::PHASE_RANGE - 1;
                }
            }
            0x5010 => self.pcm_read_mode = data & 1 != 0,
            0x5011 => {
                // zero is ignored by the DAC
                if !self.pcm_read_mode && data != 0 {
                    self.pcm_level = i32::from(data);
                    self.run_pcm(time, out);
                }
            }
            0x5015 => {
                self.enables = data & 3;
                for (index, sq) in self.squares.iter_mut().enumerate() {
                    if (data >> index) & 1 == 0 {
                        sq.osc.length_counter = 0;
                    }
                }
            }
            _ => log::trace!("MMC5: ignored write ${addr:04X}"),
        }
    }

    fn in_range(addr: u16) -> bool {
        (BASE_ADDR..=LAST_ADDR).contains(&addr)
    }
}

impl Default for Mmc5 {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundChip for Mmc5 {
    fn kind(&self) -> ChipKind {
        ChipKind::Mmc5
    }

    fn reset(&mut self) {
        for sq in &mut self.squares {
            sq.reset();
            sq.osc.regs = [0x10, 0, 0, 0];
            sq.osc.reg_written = [false; 4];
            sq.osc.length_counter = 0;
            sq.phase = 0;
        }
        self.pcm_level = 0;
        self.pcm_last_amp = 0;
        self.pcm_read_mode = false;
        self.enables = 0;
        self.last_time = 0;
        self.frame_delay = FRAME_PERIOD;
        self.frame = 0;
    }

    fn set_volume(&mut self, volume: f64) {
        self.square_synth.volume(SQUARE_VOLUME * volume);
        self.pcm_synth.volume(PCM_VOLUME * volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.square_synth.treble_eq(eq);
        self.pcm_synth.treble_eq(eq);
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        match index {
            0 | 1 => self.squares[index].osc.route = route,
            PCM => {
                self.pcm_route = route;
                // re-emit the level on the new route
                self.pcm_last_amp = 0;
            }
            _ => {}
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        if !Self::in_range(addr) {
            return;
        }
        self.run_until(time, out);
        self.apply_write(time, addr, data, out);
    }

    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers) {
        if time > self.last_time {
            self.run_until(time, out);
        }
        self.run_pcm(time.min(self.last_time), out);
        self.last_time -= time;
        debug_assert!(self.last_time >= 0);
    }

    fn start_seeking(&mut self) {
        self.shadow.clear();
    }

    /// `$5015` goes first so length loads take effect.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        let enable_index = usize::from(0x5015 - BASE_ADDR);
        if let Some(value) = shadow.get(enable_index) {
            *clock += crate::constants::SEEK_WRITE_SPACING;
            self.write_register(*clock, 0x5015, value, out);
        }
        for (index, value) in shadow.entries().filter(|&(i, _)| i != enable_index) {
            *clock += crate::constants::SEEK_WRITE_SPACING;
            self.write_register(*clock, BASE_ADDR + index as u16, value, out);
        }
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        if Self::in_range(addr) {
            self.shadow.set(usize::from(addr - BASE_ADDR), data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::tests::{linear_buffers, total_energy};

    #[test]
    fn test_square_plays_with_high_period_no_sweep_mute() {
        let mut out = linear_buffers();
        let mut chip = Mmc5::new();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0x5015, 0x01, &mut out);
        chip.write_register(0, 0x5000, 0xBF, &mut out);
        chip.write_register(0, 0x5002, 0xFF, &mut out);
        chip.write_register(0, 0x5003, 0x07, &mut out); // period 0x7FF
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(total_energy(out.linear()) > 0);
    }

    #[test]
    fn test_lengths_clock_at_120_hz() {
        let mut out = linear_buffers();
        let mut chip = Mmc5::new();
        chip.write_register(0, 0x5015, 0x03, &mut out);
        chip.write_register(0, 0x5003, 0x08, &mut out); // length 254
        let start = chip.length_counter(0);
        chip.end_frame(FRAME_PERIOD * 4 + 1, &mut out);
        assert_eq!(chip.length_counter(0), start - 2);
    }

    #[test]
    fn test_disable_clears_length() {
        let mut out = linear_buffers();
        let mut chip = Mmc5::new();
        chip.write_register(0, 0x5015, 0x03, &mut out);
        chip.write_register(0, 0x5007, 0x08, &mut out);
        assert!(chip.length_counter(1) > 0);
        chip.write_register(10, 0x5015, 0x01, &mut out);
        assert_eq!(chip.length_counter(1), 0);
    }

    #[test]
    fn test_pcm_write_mode() {
        let mut out = linear_buffers();
        let mut chip = Mmc5::new();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0x5011, 0x80, &mut out);
        assert_eq!(chip.pcm_level(), 0x80);
        chip.write_register(0, 0x5011, 0x00, &mut out);
        assert_eq!(chip.pcm_level(), 0x80, "zero writes are ignored");
        chip.write_register(0, 0x5010, 0x01, &mut out);
        chip.write_register(0, 0x5011, 0x40, &mut out);
        assert_eq!(chip.pcm_level(), 0x80, "read mode ignores writes");
    }

    #[test]
    fn test_seek_replays_enables_first() {
        let mut out = linear_buffers();
        let mut chip = Mmc5::new();
        chip.start_seeking();
        chip.write_shadow_register(0x5003, 0x08);
        chip.write_shadow_register(0x5015, 0x01);
        let mut clock = 0;
        chip.stop_seeking(&mut clock, &mut out);
        assert_eq!(clock, 8);
        assert_eq!(chip.length_counter(0), u32::from(LENGTH_TABLE[1]));
    }
}

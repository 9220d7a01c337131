//! Base 2A03/2A07 APU
//!
//! Two pulses, triangle, noise and DMC driven by the 240 Hz frame sequencer.
//! Pulses are meant for the linear buffer; triangle, noise and DMC feed the
//! TND buffers that the engine runs through the non-linear mixer, so their
//! synths use a 1/202 unit (3/202 for triangle, 2/202 for noise), which makes
//! the unpacked TND level equal the resistor-ladder input.

mod dmc;
pub(crate) mod osc;
mod snapshot;

pub use dmc::DmcReader;
pub use snapshot::{ApuSnapshot, DmcSnapshot, NoiseSnapshot, SquareSnapshot, TriangleSnapshot};

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::constants::{APU_END_ADDR, APU_START_ADDR, DMC_IDLE_BYTE, SEEK_WRITE_SPACING};
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;
use dmc::Dmc;
use osc::{Noise, OscState, Square, Triangle, LENGTH_TABLE};

/// Output level of a full-volume pulse (step of 15).
pub const SQUARE_VOLUME: f64 = 1.3 * 0.25751258 / 0.742467605 * 0.25;

/// TND synth unit: one step of the 202-step resistor ladder input.
pub const TND_UNIT: f64 = 1.0 / 202.0;

/// Number of APU channels.
pub const OSC_COUNT: usize = 5;

const REG_COUNT: usize = (APU_END_ADDR - APU_START_ADDR + 1) as usize;

/// Index of each channel for routing calls.
pub mod channel {
    /// Pulse 1
    pub const SQUARE1: usize = 0;
    /// Pulse 2
    pub const SQUARE2: usize = 1;
    /// Triangle
    pub const TRIANGLE: usize = 2;
    /// Noise
    pub const NOISE: usize = 3;
    /// DMC
    pub const DMC: usize = 4;
}

fn idle_dmc_reader() -> DmcReader {
    Box::new(|_| DMC_IDLE_BYTE)
}

/// The base APU.
pub struct Apu {
    // ========================================================================
    // Channels
    // ========================================================================
    square1: Square,
    square2: Square,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    square_synth: BlipSynth,
    triangle_synth: BlipSynth,
    noise_synth: BlipSynth,
    dmc_synth: BlipSynth,
    dmc_reader: DmcReader,

    // ========================================================================
    // Frame sequencer
    // ========================================================================
    last_time: i64,
    last_dmc_time: i64,
    frame_delay: i64,
    frame_period: i64,
    frame: u32,
    frame_mode: u8,
    osc_enables: u8,
    irq_flag: bool,
    pal: bool,

    shadow: ShadowRegisters<REG_COUNT>,
}

impl Apu {
    /// Create an NTSC APU with every channel silenced.
    pub fn new() -> Self {
        let mut apu = Self {
            square1: Square::default(),
            square2: Square::default(),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            square_synth: BlipSynth::new(Quality::Good, 15),
            triangle_synth: BlipSynth::new(Quality::Medium, 1),
            noise_synth: BlipSynth::new(Quality::Medium, 1),
            dmc_synth: BlipSynth::new(Quality::Medium, 1),
            dmc_reader: idle_dmc_reader(),
            last_time: 0,
            last_dmc_time: 0,
            frame_delay: 1,
            frame_period: 7458,
            frame: 0,
            frame_mode: 0,
            osc_enables: 0,
            irq_flag: false,
            pal: false,
            shadow: ShadowRegisters::new(),
        };
        apu.enable_nonlinear(1.0);
        apu.reset_with(false, 0);
        apu
    }

    /// Set pulse level and the fixed TND units. `volume` scales the pulses;
    /// the TND group is scaled after the non-linearity by the engine.
    pub fn enable_nonlinear(&mut self, volume: f64) {
        self.square_synth.volume(SQUARE_VOLUME * volume);
        self.triangle_synth.volume_unit(3.0 * TND_UNIT);
        self.noise_synth.volume_unit(2.0 * TND_UNIT);
        self.dmc_synth.volume_unit(TND_UNIT);
    }

    /// Power-on reset for the given region, with the DMC output level at
    /// `initial_dmc_dac`.
    pub fn reset_with(&mut self, pal: bool, initial_dmc_dac: u8) {
        self.pal = pal;
        self.frame_period = if pal { 8314 } else { 7458 };
        self.dmc.pal = pal;
        self.noise.pal = pal;

        self.square1.reset();
        self.square2.reset();
        self.triangle.reset();
        self.noise.reset();
        self.dmc.reset();

        self.last_time = 0;
        self.last_dmc_time = 0;
        self.osc_enables = 0;
        self.irq_flag = false;
        self.frame_delay = 1;

        self.apply_write(APU_END_ADDR, 0x00);
        self.apply_write(0x4015, 0x00);
        for addr in APU_START_ADDR..=0x4013 {
            self.apply_write(addr, if addr & 3 != 0 { 0x00 } else { 0x10 });
        }

        self.dmc.dac = i32::from(initial_dmc_dac & 0x7F);
        self.dmc.osc.last_amp = self.dmc.dac;
    }

    /// True for PAL timing.
    pub fn is_pal(&self) -> bool {
        self.pal
    }

    /// Install the DMC sample fetch callback.
    pub fn set_dmc_reader(&mut self, reader: DmcReader) {
        self.dmc_reader = reader;
    }

    /// Route pulses to `linear` and triangle/noise/DMC to `tnd`.
    pub fn set_split_output(&mut self, linear: ChannelRoute, tnd: ChannelRoute) {
        self.square1.osc.route = linear;
        self.square2.osc.route = linear;
        self.triangle.osc.route = tnd;
        self.noise.osc.route = tnd;
        self.dmc.osc.route = tnd;
    }

    /// Current route of channel `index`.
    pub fn channel_output(&self, index: usize) -> Option<ChannelRoute> {
        self.osc(index).map(|osc| osc.route)
    }

    fn osc(&self, index: usize) -> Option<&OscState> {
        match index {
            channel::SQUARE1 => Some(&self.square1.osc),
            channel::SQUARE2 => Some(&self.square2.osc),
            channel::TRIANGLE => Some(&self.triangle.osc),
            channel::NOISE => Some(&self.noise.osc),
            channel::DMC => Some(&self.dmc.osc),
            _ => None,
        }
    }

    fn osc_mut(&mut self, index: usize) -> Option<&mut OscState> {
        match index {
            channel::SQUARE1 => Some(&mut self.square1.osc),
            channel::SQUARE2 => Some(&mut self.square2.osc),
            channel::TRIANGLE => Some(&mut self.triangle.osc),
            channel::NOISE => Some(&mut self.noise.osc),
            channel::DMC => Some(&mut self.dmc.osc),
            _ => None,
        }
    }

    /// Length counter of channel `index` (bytes remaining for the DMC).
    pub fn length_counter(&self, index: usize) -> u32 {
        self.osc(index).map_or(0, |osc| osc.length_counter)
    }

    /// Current DMC output level.
    pub fn dmc_dac(&self) -> u8 {
        self.dmc.dac as u8
    }

    /// True while the frame or DMC IRQ is asserted.
    pub fn irq_pending(&self) -> bool {
        self.irq_flag || self.dmc.irq_flag
    }

    // ========================================================================
    // Register interface
    // ========================================================================

    /// Write `$4000-$4017` at `time`. Other addresses are ignored.
    pub fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        if !(APU_START_ADDR..=APU_END_ADDR).contains(&addr) {
            return;
        }
        self.run_until(time, out);
        self.apply_write(addr, data);
    }

    /// Register write without running the channels first.
    fn apply_write(&mut self, addr: u16, data: u8) {
        if addr < 0x4014 {
            let osc_index = usize::from((addr - APU_START_ADDR) >> 2);
            let reg = usize::from(addr & 3);
            let enabled = (self.osc_enables >> osc_index) & 1 != 0;

            if osc_index == channel::DMC {
                self.dmc.osc.regs[reg] = data;
                self.dmc.osc.reg_written[reg] = true;
                self.dmc.write_register(reg, data);
                return;
            }

            let Some(osc) = self.osc_mut(osc_index) else {
                return;
            };
            osc.regs[reg] = data;
            osc.reg_written[reg] = true;
            if reg == 3 {
                if enabled {
                    osc.length_counter = u32::from(LENGTH_TABLE[usize::from(data >> 3)]);
                }
                match osc_index {
                    channel::SQUARE1 => self.square1.phase = Square::PHASE_RANGE - 1,
                    channel::SQUARE2 => self.square2.phase = Square::PHASE_RANGE - 1,
                    _ => {}
                }
            }
        } else if addr == 0x4015 {
            for index in 0..OSC_COUNT {
                if (data >> index) & 1 == 0 {
                    if let Some(osc) = self.osc_mut(index) {
                        osc.length_counter = 0;
                    }
                }
            }
            self.dmc.irq_flag = false;
            self.osc_enables = data;

            // A stopped sample restarts; a running one keeps playing.
            if data & 0x10 != 0 && self.dmc.remaining() == 0 {
                self.dmc.start(&mut *self.dmc_reader);
            }
        } else if addr == APU_END_ADDR {
            self.frame_mode = data;
            let irq_enabled = data & 0x40 == 0;
            self.irq_flag &= irq_enabled;

            // mode 1
            self.frame_delay &= 1;
            self.frame = 0;

            if data & 0x80 == 0 {
                // mode 0
                self.frame = 1;
                self.frame_delay += self.frame_period;
            }
        }
    }

    /// `$4015` read at `time`. Reading acknowledges the frame IRQ.
    pub fn read_status(&mut self, time: i64, out: &mut OutputBuffers) -> u8 {
        self.run_until(time - 1, out);

        let mut result = (u8::from(self.dmc.irq_flag) << 7) | (u8::from(self.irq_flag) << 6);
        for index in 0..OSC_COUNT {
            if self.length_counter(index) != 0 {
                result |= 1 << index;
            }
        }

        self.run_until(time, out);
        if self.irq_flag {
            result |= 0x40;
            self.irq_flag = false;
        }
        result
    }

    // ========================================================================
    // Timing
    // ========================================================================

    /// Render every channel up to `end_time`.
    pub fn run_until(&mut self, end_time: i64, out: &mut OutputBuffers) {
        if end_time <= self.last_time {
            return;
        }

        if self.last_dmc_time < end_time {
            let start = self.last_dmc_time;
            self.last_dmc_time = end_time;
            self.dmc.run(start, end_time, &self.dmc_synth, out, &mut *self.dmc_reader);
        }

        loop {
            // earlier of next frame step or end time
            let time = (self.last_time + self.frame_delay).min(end_time);
            self.frame_delay -= time - self.last_time;

            self.square1.run(self.last_time, time, &self.square_synth, out);
            self.square2.run(self.last_time, time, &self.square_synth, out);
            self.triangle.run(self.last_time, time, &self.triangle_synth, out);
            self.noise.run(self.last_time, time, &self.noise_synth, out);
            self.last_time = time;

            if time == end_time {
                break;
            }

            self.frame_delay = self.frame_period;
            let step = self.frame;
            self.frame += 1;
            match step {
                0 | 2 => {
                    if step == 0 && self.frame_mode & 0xC0 == 0 {
                        self.irq_flag = true;
                    }

                    // length and sweep on steps 0 and 2
                    self.square1.osc.clock_length(0x20);
                    self.square2.osc.clock_length(0x20);
                    self.noise.osc.clock_length(0x20);
                    self.triangle.osc.clock_length(0x80);

                    self.square1.clock_sweep(-1);
                    self.square2.clock_sweep(0);

                    if self.pal && self.frame == 3 {
                        self.frame_delay -= 2;
                    }
                }
                1 => {
                    if !self.pal {
                        self.frame_delay -= 2;
                    }
                }
                _ => {
                    self.frame = 0;
                    // step 3 is almost twice as long in mode 1
                    if self.frame_mode & 0x80 != 0 {
                        self.frame_delay += self.frame_period - if self.pal { 2 } else { 6 };
                    }
                }
            }

            // envelopes and linear counter every step
            self.triangle.clock_linear_counter();
            self.square1.clock_envelope();
            self.square2.clock_envelope();
            self.noise.clock_envelope();
        }
    }

    /// Run to `end_time` and start a new frame there.
    pub fn end_frame(&mut self, end_time: i64, out: &mut OutputBuffers) {
        if end_time > self.last_time {
            self.run_until(end_time, out);
        }
        self.last_time -= end_time;
        self.last_dmc_time -= end_time;
        debug_assert!(self.last_time >= 0 && self.last_dmc_time >= 0);
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Capture channel and sequencer state.
    pub fn save_snapshot(&self) -> ApuSnapshot {
        let mut w40xx = [0u8; 0x14];
        for (i, reg) in w40xx.iter_mut().enumerate() {
            *reg = self.osc(i >> 2).map_or(0, |osc| osc.regs[i & 3]);
        }

        let square = |sq: &Square| SquareSnapshot {
            delay: sq.osc.delay as u16,
            env: sq.env.level as u8,
            length: sq.osc.length_counter as u8,
            phase: sq.phase as u8,
            swp_delay: sq.sweep_delay as u8,
            env_delay: sq.env.delay as u8,
        };

        ApuSnapshot {
            w40xx,
            w4015: self.osc_enables,
            w4017: self.frame_mode,
            delay: self.frame_delay as u16,
            step: self.frame as u8,
            irq_flag: self.irq_flag,
            square1: square(&self.square1),
            square2: square(&self.square2),
            triangle: TriangleSnapshot {
                delay: self.triangle.osc.delay as u16,
                length: self.triangle.osc.length_counter as u8,
                phase: self.triangle.phase as u8,
                linear_counter: self.triangle.linear_counter as u8,
                linear_mode: self.triangle.osc.reg_written[3],
            },
            noise: NoiseSnapshot {
                delay: self.noise.osc.delay as u16,
                env: self.noise.env.level as u8,
                length: self.noise.osc.length_counter as u8,
                env_delay: self.noise.env.delay as u8,
                shift_reg: self.noise.shift_reg as u16,
            },
            dmc: DmcSnapshot {
                delay: self.dmc.osc.delay as u16,
                remain: self.dmc.remaining() as u16,
                addr: self.dmc.address,
                buf: self.dmc.buf,
                bits_remain: self.dmc.bits_remain as u8,
                bits: self.dmc.bits,
                buf_empty: !self.dmc.buf_full,
                silence: self.dmc.silence,
                irq_flag: self.dmc.irq_flag,
            },
        }
    }

    /// Restore state captured by [`save_snapshot`](Self::save_snapshot).
    ///
    /// The restored state starts at time 0 of the current frame.
    pub fn load_snapshot(&mut self, snap: &ApuSnapshot) {
        self.reset_with(self.pal, 0);

        self.apply_write(APU_END_ADDR, snap.w4017);
        // enables first without starting a DMC fetch
        let dmc_remaining_hold = snap.w4015 & !0x10;
        self.apply_write(0x4015, dmc_remaining_hold);
        self.osc_enables = snap.w4015;
        for (i, &value) in snap.w40xx.iter().enumerate() {
            self.apply_write(APU_START_ADDR + i as u16, value);
        }

        self.frame_delay = i64::from(snap.delay);
        self.frame = u32::from(snap.step);
        self.irq_flag = snap.irq_flag;

        for (sq, s) in [(&mut self.square1, &snap.square1), (&mut self.square2, &snap.square2)] {
            sq.osc.delay = i64::from(s.delay);
            sq.env.level = i32::from(s.env);
            sq.osc.length_counter = u32::from(s.length);
            sq.phase = i32::from(s.phase);
            sq.sweep_delay = i32::from(s.swp_delay);
            sq.env.delay = i32::from(s.env_delay);
            sq.osc.reg_written = [false; 4];
        }

        self.triangle.osc.delay = i64::from(snap.triangle.delay);
        self.triangle.osc.length_counter = u32::from(snap.triangle.length);
        self.triangle.linear_counter = u32::from(snap.triangle.linear_counter);
        self.triangle.phase = i32::from(snap.triangle.phase);
        self.triangle.osc.reg_written[3] = snap.triangle.linear_mode;

        self.noise.osc.delay = i64::from(snap.noise.delay);
        self.noise.env.level = i32::from(snap.noise.env);
        self.noise.osc.length_counter = u32::from(snap.noise.length);
        self.noise.env.delay = i32::from(snap.noise.env_delay);
        self.noise.shift_reg = i32::from(snap.noise.shift_reg);
        self.noise.osc.reg_written[3] = false;

        self.dmc.osc.delay = i64::from(snap.dmc.delay);
        self.dmc.osc.length_counter = u32::from(snap.dmc.remain);
        self.dmc.address = snap.dmc.addr;
        self.dmc.buf = snap.dmc.buf;
        self.dmc.bits_remain = i32::from(snap.dmc.bits_remain);
        self.dmc.bits = snap.dmc.bits;
        self.dmc.buf_full = !snap.dmc.buf_empty;
        self.dmc.silence = snap.dmc.silence;
        self.dmc.irq_flag = snap.dmc.irq_flag;
        // prevent an output transition
        self.dmc.osc.last_amp = self.dmc.dac;
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Apu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Apu")
            .field("pal", &self.pal)
            .field("last_time", &self.last_time)
            .field("frame", &self.frame)
            .field("frame_mode", &self.frame_mode)
            .field("osc_enables", &self.osc_enables)
            .field("irq_flag", &self.irq_flag)
            .finish()
    }
}

impl SoundChip for Apu {
    fn kind(&self) -> ChipKind {
        ChipKind::BaseApu
    }

    fn reset(&mut self) {
        self.reset_with(self.pal, 0);
    }

    fn set_volume(&mut self, volume: f64) {
        self.enable_nonlinear(volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.square_synth.treble_eq(eq);
        self.triangle_synth.treble_eq(eq);
        self.noise_synth.treble_eq(eq);
        self.dmc_synth.treble_eq(eq);
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        if let Some(osc) = self.osc_mut(index) {
            osc.route = route;
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        Apu::write_register(self, time, addr, data, out);
    }

    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers) {
        Apu::end_frame(self, time, out);
    }

    fn start_seeking(&mut self) {
        self.shadow.clear();
    }

    /// Replays the DMC registers `$4010-$4013` first so a sample started by
    /// `$4015` uses the final address and length, then `$4015` so length
    /// loads in `$4003/7/B/F` take effect, then `$4000-$400F`, then `$4017`.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        let order = (0x10..=0x13)
            .chain(std::iter::once(0x15))
            .chain(0x00..=0x0F)
            .chain(std::iter::once(0x17));
        for index in order {
            if let Some(value) = shadow.get(index) {
                *clock += SEEK_WRITE_SPACING;
                Apu::write_register(self, *clock, APU_START_ADDR + index as u16, value, out);
            }
        }
        log::trace!("APU seek replayed {} registers", shadow.len());
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        if (APU_START_ADDR..=APU_END_ADDR).contains(&addr) {
            self.shadow.set(usize::from(addr - APU_START_ADDR), data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers() -> OutputBuffers {
        let mut out = OutputBuffers::new();
        for buf in out.iter_mut() {
            buf.set_sample_rate(44_100).unwrap();
            buf.set_clock_rate(1_789_773);
        }
        out
    }

    fn linear_apu() -> Apu {
        let mut apu = Apu::new();
        apu.set_split_output(ChannelRoute::Linear, ChannelRoute::Tnd(0));
        apu
    }

    #[test]
    fn test_seek_replay_starts_dmc_with_final_sample() {
        let writes = [(0x4010, 0x0F), (0x4012, 0x10), (0x4013, 0x20), (0x4015, 0x10)];

        let mut out = buffers();
        let mut direct = linear_apu();
        for &(addr, data) in &writes {
            direct.write_register(0, addr, data, &mut out);
        }

        let mut out = buffers();
        let mut seeking = linear_apu();
        SoundChip::start_seeking(&mut seeking);
        for &(addr, data) in &writes {
            seeking.write_shadow_register(addr, data);
        }
        let mut clock = 0;
        SoundChip::stop_seeking(&mut seeking, &mut clock, &mut out);

        let direct = direct.save_snapshot().dmc;
        let replayed = seeking.save_snapshot().dmc;
        // $C400, 0x201 bytes, first byte already fetched
        assert_eq!((direct.addr, direct.remain), (0x4401, 0x200));
        assert_eq!((replayed.addr, replayed.remain), (direct.addr, direct.remain));
        assert_eq!(clock, 4 * writes.len() as i64);
    }

    #[test]
    fn test_length_counter_loads_only_when_enabled() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.write_register(0, 0x4003, 0x08, &mut out);
        assert_eq!(apu.length_counter(0), 0);
        apu.write_register(0, 0x4015, 0x01, &mut out);
        apu.write_register(0, 0x4003, 0x08, &mut out);
        assert_eq!(apu.length_counter(0), u32::from(LENGTH_TABLE[1]));
    }

    #[test]
    fn test_status_reports_lengths_and_clears_frame_irq() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.write_register(0, 0x4015, 0x0F, &mut out);
        apu.write_register(0, 0x400F, 0xF8, &mut out);
        // Run past the first four-step sequence so the frame IRQ fires.
        apu.run_until(29_900, &mut out);
        let status = apu.read_status(29_901, &mut out);
        assert_eq!(status & 0x08, 0x08, "noise length still running");
        assert_eq!(status & 0x40, 0x40, "frame IRQ");
        let status = apu.read_status(29_902, &mut out);
        assert_eq!(status & 0x40, 0, "IRQ acknowledged by read");
    }

    #[test]
    fn test_irq_inhibit() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.write_register(0, 0x4017, 0x40, &mut out);
        apu.run_until(29_900, &mut out);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn test_length_halt_freezes_counter() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.write_register(0, 0x4015, 0x01, &mut out);
        apu.write_register(0, 0x4000, 0x30, &mut out); // halt + constant
        apu.write_register(0, 0x4003, 0x08, &mut out);
        let before = apu.length_counter(0);
        apu.end_frame(29_781, &mut out);
        assert_eq!(apu.length_counter(0), before);
    }

    #[test]
    fn test_dmc_reader_is_used() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.set_dmc_reader(Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            0xFF
        }));
        apu.write_register(0, 0x4010, 0x0F, &mut out); // fastest rate
        apu.write_register(0, 0x4013, 0x01, &mut out); // 17 bytes
        apu.write_register(0, 0x4015, 0x10, &mut out);
        apu.end_frame(29_781, &mut out);
        assert_eq!(reads.load(Ordering::Relaxed), 17);
        assert_eq!(apu.length_counter(channel::DMC), 0);
        assert!(apu.dmc_dac() > 0, "all-ones sample ramps the DAC up");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.write_register(0, 0x4015, 0x0F, &mut out);
        apu.write_register(10, 0x4000, 0x8F, &mut out);
        apu.write_register(20, 0x4002, 0x40, &mut out);
        apu.write_register(30, 0x4003, 0x21, &mut out);
        apu.write_register(40, 0x4008, 0x7F, &mut out);
        apu.write_register(50, 0x400B, 0x10, &mut out);
        apu.end_frame(29_781, &mut out);

        let snap = apu.save_snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: ApuSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = linear_apu();
        restored.load_snapshot(&back);
        assert_eq!(restored.save_snapshot(), snap);
    }

    #[test]
    fn test_silenced_square_writes_nothing() {
        let mut out = buffers();
        let mut apu = Apu::new();
        apu.write_register(0, 0x4015, 0x01, &mut out);
        apu.write_register(0, 0x4000, 0xBF, &mut out);
        apu.write_register(0, 0x4002, 0x40, &mut out);
        apu.write_register(0, 0x4003, 0x00, &mut out);
        apu.end_frame(29_781, &mut out);
        for buf in out.iter_mut() {
            buf.end_frame(29_781);
            assert!(buf.deltas().iter().all(|&d| d == 0));
        }
    }

    #[test]
    fn test_shadow_replay_order() {
        let mut out = buffers();
        let mut apu = linear_apu();
        apu.start_seeking();
        apu.write_shadow_register(0x4003, 0x08);
        apu.write_shadow_register(0x4015, 0x01);
        apu.write_shadow_register(0x4018, 0x01);
        let mut clock = 0;
        apu.stop_seeking(&mut clock, &mut out);
        assert_eq!(clock, 8);
        assert_eq!(apu.length_counter(0), u32::from(LENGTH_TABLE[1]));
    }
}

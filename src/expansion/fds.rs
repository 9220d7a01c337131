//! Famicom Disk System wavetable
//!
//! A 64-step, 6-bit wavetable (`$4040-$407F`) played through a volume
//! envelope, with a frequency modulator driven by a 32-step table written
//! through `$4088`. Control registers live at `$4080-$408A`.

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::constants::SEEK_WRITE_SPACING;
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const IO_ADDR: u16 = 0x4040;
const IO_SIZE: usize = 0x53;
const WAVE_SIZE: usize = 0x40;

const VOL_MAX: i32 = 0x20;
const MASTER_VOL_MAX: i32 = 10;
const WAVE_SAMPLE_MAX: u8 = 0x3F;

const FRACT_RANGE: i64 = 65_536;
const LFO_BASE_TEMPO: i64 = 8;

/// Output gain per `$4089` master volume setting (100%, 67%, 50%, 40%).
const MASTER_VOLUMES: [i32; 4] = [
    (MASTER_VOL_MAX * 100 + 50) / 100,
    (MASTER_VOL_MAX * 67 + 50) / 100,
    (MASTER_VOL_MAX * 50 + 50) / 100,
    (MASTER_VOL_MAX * 40 + 50) / 100,
];

/// Sweep bias step per modulation table entry (4 resets the bias).
const MOD_TABLE: [i32; 8] = [0, 1, 2, 4, 0, -4, -2, -1];

/// Power-on values of `$4080-$408A`.
const INITIAL_REGS: [u8; 0x0B] = [
    0x80, // envelope off
    0x00, 0x00, 0xC0, // wave and LFO halted
    0x80, // sweep off
    0x00, 0x00, 0x80, // modulation off
    0x00, 0x00, 0xFF, // LFO period
];

const MOD_HISTORY: usize = 32;

// Extra shadow slots for the two logical registers behind $4080 and $4084.
const SLOT_ENV_GAIN: usize = IO_SIZE;
const SLOT_ENV_SPEED: usize = IO_SIZE + 1;
const SLOT_SWEEP_GAIN: usize = IO_SIZE + 2;
const SLOT_SWEEP_SPEED: usize = IO_SIZE + 3;
const SHADOW_SLOTS: usize = IO_SIZE + 4;

#[inline]
const fn reg(addr: u16) -> usize {
    (addr - IO_ADDR) as usize
}

/// FDS sound.
#[derive(Debug, Clone)]
pub struct Fds {
    regs: [u8; IO_SIZE],
    mod_wave: [u8; WAVE_SIZE],
    route: ChannelRoute,
    synth: BlipSynth,

    last_time: i64,
    env_delay: i64,
    sweep_delay: i64,
    env_gain: i32,
    env_speed: i64,
    sweep_gain: i32,
    sweep_speed: i64,
    wave_pos: usize,
    wave_fract: i64,
    mod_fract: i64,
    mod_pos: usize,
    mod_write_pos: usize,
    last_amp: i32,
    lfo_tempo: i64,

    shadow: ShadowRegisters<SHADOW_SLOTS>,
    mod_writes: [u8; MOD_HISTORY],
    mod_write_count: usize,
}

impl Fds {
    /// Create an FDS with its output silenced.
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; IO_SIZE],
            mod_wave: [0; WAVE_SIZE],
            route: ChannelRoute::Silenced,
            synth: BlipSynth::new(Quality::Medium, 1),
            last_time: 0,
            env_delay: 0,
            sweep_delay: 0,
            env_gain: 0,
            env_speed: 0,
            sweep_gain: 0,
            sweep_speed: 0,
            wave_pos: 0,
            wave_fract: FRACT_RANGE,
            mod_fract: FRACT_RANGE,
            mod_pos: 0,
            mod_write_pos: 0,
            last_amp: 0,
            lfo_tempo: LFO_BASE_TEMPO,
            shadow: ShadowRegisters::new(),
            mod_writes: [0; MOD_HISTORY],
            mod_write_count: 0,
        };
        chip.set_volume(1.0);
        chip.reset();
        chip
    }

    /// Scale the envelope and sweep clock for a non-standard playback tempo.
    pub fn set_tempo(&mut self, tempo: f64) {
        self.lfo_tempo = LFO_BASE_TEMPO;
        if tempo != 1.0 {
            self.lfo_tempo = ((LFO_BASE_TEMPO as f64 / tempo + 0.5) as i64).max(1);
        }
    }

    /// Register value at `addr` (`$4040-$4092`).
    pub fn register(&self, addr: u16) -> Option<u8> {
        addr.checked_sub(IO_ADDR).and_then(|r| self.regs.get(usize::from(r))).copied()
    }

    /// Modulation table (each `$4088` write fills two entries).
    pub fn mod_table(&self) -> &[u8; WAVE_SIZE] {
        &self.mod_wave
    }

    /// Current envelope gain.
    pub fn envelope_gain(&self) -> i32 {
        self.env_gain
    }

    fn in_range(addr: u16) -> bool {
        addr >= IO_ADDR && usize::from(addr - IO_ADDR) < IO_SIZE
    }

    fn apply_write(&mut self, addr: u16, data: u8) {
        if !Self::in_range(addr) {
            return;
        }
        let r = reg(addr);
        if r < WAVE_SIZE {
            if self.regs[reg(0x4089)] & 0x80 != 0 {
                self.regs[r] = data & WAVE_SAMPLE_MAX;
            }
            return;
        }

        self.regs[r] = data;
        match addr {
            0x4080 => {
                if data & 0x80 != 0 {
                    self.env_gain = i32::from(data & 0x3F);
                } else {
                    self.env_speed = i64::from(data & 0x3F) + 1;
                }
            }
            0x4084 => {
                if data & 0x80 != 0 {
                    self.sweep_gain = i32::from(data & 0x3F);
                } else {
                    self.sweep_speed = i64::from(data & 0x3F) + 1;
                }
            }
            0x4085 => {
                self.mod_pos = self.mod_write_pos;
                self.regs[r] = data & 0x7F;
            }
            0x4088 => {
                if self.regs[reg(0x4087)] & 0x80 != 0 {
                    let pos = self.mod_write_pos;
                    let value = data & 0x07;
                    self.mod_wave[pos] = value;
                    self.mod_wave[pos + 1] = value;
                    self.mod_write_pos = (pos + 2) & (WAVE_SIZE - 1);
                    self.mod_pos = (self.mod_pos + 2) & (WAVE_SIZE - 1);
                }
            }
            _ => {}
        }
    }

    fn run_until(&mut self, final_end_time: i64, out: &mut OutputBuffers) {
        if final_end_time <= self.last_time {
            return;
        }
        let wave_freq = i64::from(self.regs[reg(0x4083)] & 0x0F) * 0x100 + i64::from(self.regs[reg(0x4082)]);
        let halted = (self.regs[reg(0x4089)] | self.regs[reg(0x4083)]) & 0x80 != 0;
        let Some(buf) = out.get_mut(self.route) else {
            self.last_time = final_end_time;
            return;
        };
        if wave_freq == 0 || halted {
            self.last_time = final_end_time;
            return;
        }

        let master_volume = MASTER_VOLUMES[usize::from(self.regs[reg(0x4089)] & 0x03)];

        let mut lfo_period = i64::from(self.regs[reg(0x408A)]) * self.lfo_tempo;
        if self.regs[reg(0x4083)] & 0x40 != 0 {
            lfo_period = 0;
        }

        let mut sweep_time = self.last_time + self.sweep_delay;
        let sweep_period = lfo_period * self.sweep_speed;
        if sweep_period == 0 || self.regs[reg(0x4084)] & 0x80 != 0 {
            sweep_time = final_end_time;
        }

        let mut env_time = self.last_time + self.env_delay;
        let env_period = lfo_period * self.env_speed;
        if env_period == 0 || self.regs[reg(0x4080)] & 0x80 != 0 {
            env_time = final_end_time;
        }

        let mod_freq = if self.regs[reg(0x4087)] & 0x80 == 0 {
            i64::from(self.regs[reg(0x4087)] & 0x0F) * 0x100 + i64::from(self.regs[reg(0x4086)])
        } else {
            0
        };

        let mut end_time = self.last_time;
        loop {
            'step: {
                if sweep_time <= end_time {
                    sweep_time += sweep_period;
                    let mode = i32::from((self.regs[reg(0x4084)] >> 5) & 2);
                    let gain = self.sweep_gain + mode - 1;
                    if (0..=(0x80 >> mode)).contains(&gain) {
                        self.sweep_gain = gain;
                    } else {
                        self.regs[reg(0x4084)] |= 0x80;
                    }
                }

                if env_time <= end_time {
                    env_time += env_period;
                    let mode = i32::from((self.regs[reg(0x4080)] >> 5) & 2);
                    let gain = self.env_gain + mode - 1;
                    if (0..=(0x80 >> mode)).contains(&gain) {
                        self.env_gain = gain;
                    } else {
                        self.regs[reg(0x4080)] |= 0x80;
                    }
                }

                let start_time = end_time;
                end_time = final_end_time.min(env_time).min(sweep_time);

                let mut freq = wave_freq;
                if mod_freq != 0 {
                    let mod_time = start_time + (self.mod_fract + mod_freq - 1) / mod_freq;
                    end_time = end_time.min(mod_time);

                    let mut sweep_bias = i32::from(self.regs[reg(0x4085)]);
                    self.mod_fract -= (end_time - start_time) * mod_freq;
                    if self.mod_fract <= 0 {
                        self.mod_fract += FRACT_RANGE;
                        let m = usize::from(self.mod_wave[self.mod_pos]);
                        self.mod_pos = (self.mod_pos + 1) & (WAVE_SIZE - 1);
                        let new_bias = if m == 4 { 0 } else { (sweep_bias + MOD_TABLE[m]) & 0x7F };
                        self.regs[reg(0x4085)] = new_bias as u8;
                    }

                    // 7-bit signed bias times gain, with the hardware's rounding
                    sweep_bias = (sweep_bias ^ 0x40) - 0x40;
                    let mut factor = sweep_bias * self.sweep_gain;
                    let extra = factor & 0x0F;
                    factor >>= 4;
                    if extra != 0 {
                        factor -= 1;
                        if sweep_bias >= 0 {
                            factor += 3;
                        }
                    }
                    if factor > 193 {
                        factor -= 258;
                    }
                    if factor < -64 {
                        factor += 256;
                    }
                    freq += (freq * i64::from(factor)) >> 6;
                    if freq <= 0 {
                        break 'step;
                    }
                }

                let mut wave_fract = self.wave_fract;
                let mut delay = (wave_fract + freq - 1) / freq;
                let mut time = start_time + delay;

                if time <= end_time {
                    let min_delay = FRACT_RANGE / freq;
                    let min_fract = min_delay * freq;
                    let volume = self.env_gain.min(VOL_MAX) * master_volume;
                    let mut wave_pos = self.wave_pos;
                    loop {
                        let amp = i32::from(self.regs[wave_pos]) * volume;
                        wave_pos = (wave_pos + 1) & (WAVE_SIZE - 1);
                        let delta = amp - self.last_amp;
                        if delta != 0 {
                            self.last_amp = amp;
                            self.synth.offset(time, delta, buf);
                        }

                        wave_fract += FRACT_RANGE - delay * freq;
                        delay = min_delay;
                        if wave_fract > min_fract {
                            delay += 1;
                        }
                        time += delay;
                        if time > end_time {
                            break;
                        }
                    }
                    self.wave_pos = wave_pos;
                }
                self.wave_fract = wave_fract - (end_time - (time - delay)) * freq;
            }

            if end_time >= final_end_time {
                break;
            }
        }

        self.env_delay = env_time - final_end_time;
        self.sweep_delay = sweep_time - final_end_time;
        self.last_time = final_end_time;
    }
}

impl Default for Fds {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundChip for Fds {
    fn kind(&self) -> ChipKind {
        ChipKind::Fds
    }

    fn reset(&mut self) {
        self.regs = [0; IO_SIZE];
        self.mod_wave = [0; WAVE_SIZE];
        self.last_time = 0;
        self.env_delay = 0;
        self.sweep_delay = 0;
        self.wave_pos = 0;
        self.last_amp = 0;
        self.wave_fract = FRACT_RANGE;
        self.mod_fract = FRACT_RANGE;
        self.mod_pos = 0;
        self.mod_write_pos = 0;

        for (i, &value) in INITIAL_REGS.iter().enumerate() {
            let addr = 0x4080 + i as u16;
            // two writes set both gain and speed of the envelope registers
            self.apply_write(addr, 0);
            self.apply_write(addr, value);
        }
        // the $4088 init write must not offset the table
        self.mod_write_pos = 0;
        self.mod_pos = 0;
    }

    fn set_volume(&mut self, volume: f64) {
        self.synth
            .volume(0.14 / f64::from(MASTER_VOL_MAX) / f64::from(VOL_MAX) / f64::from(WAVE_SAMPLE_MAX) * volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.synth.treble_eq(eq);
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        if index == 0 {
            self.route = route;
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        if !Self::in_range(addr) {
            return;
        }
        self.run_until(time, out);
        self.apply_write(addr, data);
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
        self.mod_write_count = 0;
    }

    /// Wave RAM first (with writes temporarily enabled), then the modulation
    /// table (with the modulator temporarily halted), then the control
    /// registers. `$4083` goes last so the wave stays halted until every
    /// other control register holds its final value.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        let mut write = |chip: &mut Self, clock: &mut i64, addr: u16, data: u8| {
            *clock += SEEK_WRITE_SPACING;
            chip.write_register(*clock, addr, data, out);
        };

        let wave_writes: Vec<(usize, u8)> = shadow.entries().filter(|&(i, _)| i < WAVE_SIZE).collect();
        if !wave_writes.is_empty() {
            let saved = self.regs[reg(0x4089)];
            write(self, clock, 0x4089, saved | 0x80);
            for (index, value) in wave_writes {
                write(self, clock, IO_ADDR + index as u16, value);
            }
            write(self, clock, 0x4089, saved);
        }

        if self.mod_write_count > 0 {
            let kept = self.mod_write_count.min(MOD_HISTORY);
            let skipped = (self.mod_write_count - kept) * 2;
            self.mod_write_pos = (self.mod_write_pos + skipped) & (WAVE_SIZE - 1);
            self.mod_pos = (self.mod_pos + skipped) & (WAVE_SIZE - 1);

            let saved = self.regs[reg(0x4087)];
            write(self, clock, 0x4087, saved | 0x80);
            let first = self.mod_write_count - kept;
            for n in first..self.mod_write_count {
                let value = self.mod_writes[n % MOD_HISTORY];
                write(self, clock, 0x4088, value);
            }
            write(self, clock, 0x4087, saved);
        }

        for (slot, addr) in [
            (SLOT_ENV_SPEED, 0x4080),
            (SLOT_ENV_GAIN, 0x4080),
            (SLOT_SWEEP_SPEED, 0x4084),
            (SLOT_SWEEP_GAIN, 0x4084),
        ] {
            if let Some(value) = shadow.get(slot) {
                write(self, clock, addr, value);
            }
        }
        let wave_high = reg(0x4083);
        for (index, value) in shadow
            .entries()
            .filter(|&(i, _)| (WAVE_SIZE..IO_SIZE).contains(&i) && i != wave_high)
        {
            write(self, clock, IO_ADDR + index as u16, value);
        }
        if let Some(value) = shadow.get(wave_high) {
            write(self, clock, 0x4083, value);
        }
        self.mod_write_count = 0;
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        if !Self::in_range(addr) {
            return;
        }
        let effective = |shadow: &ShadowRegisters<SHADOW_SLOTS>, regs: &[u8; IO_SIZE], a: u16| {
            shadow.get(reg(a)).unwrap_or(regs[reg(a)])
        };

        let r = reg(addr);
        match addr {
            _ if r < WAVE_SIZE => {
                if effective(&self.shadow, &self.regs, 0x4089) & 0x80 != 0 {
                    self.shadow.set(r, data);
                }
            }
            0x4088 => {
                if effective(&self.shadow, &self.regs, 0x4087) & 0x80 != 0 {
                    self.mod_writes[self.mod_write_count % MOD_HISTORY] = data;
                    self.mod_write_count += 1;
                }
            }
            0x4080 | 0x4084 => {
                let gain = data & 0x80 != 0;
                let slot = match (addr, gain) {
                    (0x4080, true) => SLOT_ENV_GAIN,
                    (0x4080, false) => SLOT_ENV_SPEED,
                    (_, true) => SLOT_SWEEP_GAIN,
                    (_, false) => SLOT_SWEEP_SPEED,
                };
                self.shadow.set(slot, data);
                self.shadow.set(r, data);
            }
            _ => self.shadow.set(r, data),
        }
    }
}

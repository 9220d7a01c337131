//! Two-operator FM synthesis core
//!
//! A compact OPLL model shared by the YM2413 and the VRC7. Each channel is
//! a modulator/carrier pair reading one 8-byte instrument, either the user
//! patch in registers `$00-$07` or one of the built-in tones of the variant.
//! The YM2413 adds a rhythm section on channels 6-8 (`$0E`); the VRC7 has
//! six channels and no rhythm.
//!
//! The core runs at its native rate ([`NATIVE_RATE`]); one [`Opll::calc`]
//! call produces one sample. Output levels follow the chip closely enough for
//! mixing but the oscillator math is not bit-exact.
//!
//! Register map (per channel `n`):
//!
//! | reg | bits |
//! |---|---|
//! | `$10+n` | F-number low 8 bits |
//! | `$20+n` | sustain (5), key (4), block (3-1), F-number bit 8 (0) |
//! | `$30+n` | instrument (7-4), volume (3-0) |

mod patch;
mod slot;
mod tables;

pub use patch::RawPatch;

use crate::chip::ChipKind;
use patch::{OperatorParams, Patch, VRC7_ROM, YM2413_ROM};
use serde::{Deserialize, Serialize};
use slot::{key_scale_rate, operator_output, Slot};
use tables::{key_scale_level, MULTIPLIER, PM_STEPS};

/// Size of the internal register space.
pub const REG_COUNT: usize = 64;

/// Channels of the largest variant.
pub const MAX_CHANNELS: usize = 9;

/// Master clock of both variants (Hz).
pub const OPLL_CLOCK: u32 = 3_579_545;

/// Native sample rate: one sample per 72 master clocks.
pub const NATIVE_RATE: u32 = OPLL_CLOCK / 72;

const RHYTHM_REG: usize = 0x0E;
const RHYTHM_ENABLE: u8 = 0x20;
const KEY_BD: u8 = 0x10;
const KEY_SD: u8 = 0x08;
const KEY_TOM: u8 = 0x04;
const KEY_CYM: u8 = 0x02;
const KEY_HH: u8 = 0x01;

/// Slots whose phase drives the metallic rhythm voices.
const HH_SLOT: usize = 14;
const SD_SLOT: usize = 15;
const TOM_SLOT: usize = 16;
const CYM_SLOT: usize = 17;

const AM_STEPS: u32 = 26;
const AM_PERIOD: u32 = AM_STEPS << 9;
const PM_PERIOD: u32 = 8 << 10;

const NOISE_TAPS: u32 = 0x40_0181;

/// Which chip the core models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FmVariant {
    /// Yamaha YM2413: nine channels plus rhythm
    Ym2413,
    /// Konami VRC7: six channels, different tone ROM
    Vrc7,
}

impl FmVariant {
    /// Number of melodic channels.
    pub const fn channel_count(self) -> usize {
        match self {
            FmVariant::Ym2413 => 9,
            FmVariant::Vrc7 => 6,
        }
    }

    /// Chip identifier.
    pub const fn kind(self) -> ChipKind {
        match self {
            FmVariant::Ym2413 => ChipKind::Ym2413,
            FmVariant::Vrc7 => ChipKind::Vrc7,
        }
    }

    /// Channel mask applied when the core is first built.
    pub const fn default_mask(self) -> u32 {
        match self {
            FmVariant::Ym2413 => 0,
            FmVariant::Vrc7 => 0x1C0,
        }
    }

    fn rom(self) -> &'static [RawPatch; 19] {
        match self {
            FmVariant::Ym2413 => &YM2413_ROM,
            FmVariant::Vrc7 => &VRC7_ROM,
        }
    }
}

/// The FM core.
#[derive(Debug, Clone)]
pub struct Opll {
    variant: FmVariant,
    regs: [u8; REG_COUNT],
    patches: [Patch; MAX_CHANNELS],
    slots: [Slot; MAX_CHANNELS * 2],
    ch_out: [i32; MAX_CHANNELS],
    mask: u32,
    eg_counter: u32,
    pm_counter: u32,
    am_counter: u32,
    noise: u32,
}

impl Opll {
    /// Create a core in its power-on state, no channel masked.
    pub fn new(variant: FmVariant) -> Self {
        let mut opll = Self {
            variant,
            regs: [0; REG_COUNT],
            patches: [Patch::default(); MAX_CHANNELS],
            slots: [Slot::default(); MAX_CHANNELS * 2],
            ch_out: [0; MAX_CHANNELS],
            mask: 0,
            eg_counter: 0,
            pm_counter: 0,
            am_counter: 0,
            noise: 1,
        };
        opll.reset();
        opll
    }

    /// Clear registers and voices. The channel mask is kept.
    pub fn reset(&mut self) {
        self.regs = [0; REG_COUNT];
        self.slots = [Slot::default(); MAX_CHANNELS * 2];
        self.ch_out = [0; MAX_CHANNELS];
        self.eg_counter = 0;
        self.pm_counter = 0;
        self.am_counter = 0;
        self.noise = 1;
        self.refresh_patches();
    }

    /// Modelled chip.
    pub fn variant(&self) -> FmVariant {
        self.variant
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.variant.channel_count()
    }

    /// Internal registers.
    pub fn regs(&self) -> &[u8; REG_COUNT] {
        &self.regs
    }

    /// Channel mask (bit set = channel output frozen).
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Replace the channel mask.
    pub fn set_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    /// Last output level of channel `ch`.
    pub fn channel_output(&self, ch: usize) -> i32 {
        self.ch_out.get(ch).copied().unwrap_or(0)
    }

    /// Zero the held output of channel `ch`.
    pub fn clear_channel_output(&mut self, ch: usize) {
        if let Some(out) = self.ch_out.get_mut(ch) {
            *out = 0;
        }
    }

    /// True when channels 6-8 play the rhythm section.
    pub fn rhythm_mode(&self) -> bool {
        self.variant == FmVariant::Ym2413 && self.regs[RHYTHM_REG] & RHYTHM_ENABLE != 0
    }

    /// Write internal register `reg` (masked to 6 bits).
    pub fn write_reg(&mut self, reg: u8, data: u8) {
        let reg = usize::from(reg) & (REG_COUNT - 1);
        self.regs[reg] = data;
        if matches!(reg, 0x00..=0x07 | RHYTHM_REG | 0x30..=0x38) {
            self.refresh_patches();
        }
        self.update_keys();
    }

    /// Produce one native-rate sample (sum of the channel outputs).
    pub fn calc(&mut self) -> i32 {
        let pm_offset = PM_STEPS[((self.pm_counter >> 10) & 7) as usize];
        let am_step = (self.am_counter >> 9) % AM_STEPS;
        let am_level = if am_step < 14 { am_step } else { AM_STEPS - am_step };
        let rhythm = self.rhythm_mode();
        let count = self.channel_count();

        for ch in 0..count {
            if rhythm && ch >= 6 {
                break;
            }
            let out = self.melodic_output(ch, am_level) >> 2;
            self.store_output(ch, out);
        }
        if rhythm {
            self.rhythm_outputs(am_level);
        }

        for ch in 0..count {
            self.advance_channel(ch, pm_offset);
        }

        self.noise = if self.noise & 1 != 0 {
            (self.noise >> 1) ^ NOISE_TAPS
        } else {
            self.noise >> 1
        };
        self.eg_counter = self.eg_counter.wrapping_add(1);
        self.pm_counter = (self.pm_counter + 1) % PM_PERIOD;
        self.am_counter = (self.am_counter + 1) % AM_PERIOD;

        self.ch_out[..count].iter().sum()
    }

    fn store_output(&mut self, ch: usize, out: i32) {
        if self.mask & (1 << ch) == 0 {
            self.ch_out[ch] = out;
        }
    }

    /// F-number and block of channel `ch`.
    fn frequency(&self, ch: usize) -> (u32, u32) {
        let hi = self.regs[0x20 + ch];
        let fnum = u32::from(self.regs[0x10 + ch]) | (u32::from(hi & 1) << 8);
        (fnum, u32::from(hi >> 1) & 7)
    }

    fn refresh_patches(&mut self) {
        let rom = self.variant.rom();
        let rhythm = self.rhythm_mode();
        let mut user = [0u8; 8];
        user.copy_from_slice(&self.regs[..8]);

        for ch in 0..MAX_CHANNELS {
            let inst = usize::from(self.regs[0x30 + ch] >> 4);
            let raw = if rhythm && ch >= 6 {
                &rom[16 + ch - 6]
            } else if inst == 0 {
                &user
            } else {
                &rom[inst]
            };
            self.patches[ch] = Patch::decode(raw);
        }
    }

    fn update_keys(&mut self) {
        let rhythm = self.rhythm_mode();
        let drums = self.regs[RHYTHM_REG];
        for ch in 0..self.channel_count() {
            let key = self.regs[0x20 + ch] & 0x10 != 0;
            let (mut mod_key, mut car_key) = (key, key);
            if rhythm {
                match ch {
                    6 => {
                        mod_key |= drums & KEY_BD != 0;
                        car_key |= drums & KEY_BD != 0;
                    }
                    7 => {
                        mod_key |= drums & KEY_HH != 0;
                        car_key |= drums & KEY_SD != 0;
                    }
                    8 => {
                        mod_key |= drums & KEY_TOM != 0;
                        car_key |= drums & KEY_CYM != 0;
                    }
                    _ => {}
                }
            }
            self.slots[ch * 2].set_key(mod_key);
            self.slots[ch * 2 + 1].set_key(car_key);
        }
    }

    /// Total attenuation of `slot`, or `None` when its envelope is off.
    fn slot_attenuation(&self, slot: usize, op: &OperatorParams, base: u32, am_level: u32) -> Option<u32> {
        let state = &self.slots[slot];
        if state.is_off() {
            return None;
        }
        let (fnum, block) = self.frequency(slot / 2);
        let mut att = state.level + base;
        if op.ksl != 0 {
            att += key_scale_level(block, fnum) >> (3 - op.ksl);
        }
        if op.am {
            att += am_level;
        }
        Some(att.min(0x1FF))
    }

    /// Carrier output of a two-operator channel.
    fn melodic_output(&mut self, ch: usize, am_level: u32) -> i32 {
        let patch = self.patches[ch];
        let (m, c) = (ch * 2, ch * 2 + 1);
        let tl = u32::from(patch.modulator.tl) * 2;
        let volume = u32::from(self.regs[0x30 + ch] & 0x0F) * 8;

        let mod_out = match self.slot_attenuation(m, &patch.modulator, tl, am_level) {
            Some(att) => {
                let history = self.slots[m].history;
                let feedback = if patch.feedback != 0 {
                    (history[0] + history[1]) >> (9 - patch.feedback)
                } else {
                    0
                };
                let phase = self.slots[m].phase10().wrapping_add_signed(feedback);
                operator_output(phase, att, patch.modulator.rectify)
            }
            None => 0,
        };
        let history = &mut self.slots[m].history;
        history[0] = history[1];
        history[1] = mod_out;

        match self.slot_attenuation(c, &patch.carrier, volume, am_level) {
            Some(att) => {
                let phase = self.slots[c].phase10().wrapping_add_signed(mod_out);
                operator_output(phase, att, patch.carrier.rectify)
            }
            None => 0,
        }
    }

    fn rhythm_voice(&self, slot: usize, op: &OperatorParams, base: u32, phase: u32, am_level: u32) -> i32 {
        self.slot_attenuation(slot, op, base, am_level)
            .map_or(0, |att| operator_output(phase, att, false))
    }

    fn rhythm_outputs(&mut self, am_level: u32) {
        let bit = |phase: u32, n: u32| (phase >> n) & 1 != 0;
        let hh_phase = self.slots[HH_SLOT].phase10();
        let cym_phase = self.slots[CYM_SLOT].phase10();
        let noise = self.noise & 1 != 0;
        let metallic = (bit(hh_phase, 2) ^ bit(hh_phase, 7)) || bit(hh_phase, 3) || (bit(cym_phase, 3) ^ bit(cym_phase, 5));

        let bass_drum = self.melodic_output(6, am_level) >> 1;

        let mut phase = if metallic { 0x200 | (0xD0 >> 2) } else { 0xD0 };
        if noise {
            phase = if phase & 0x200 != 0 { 0x200 | 0xD0 } else { 0xD0 >> 2 };
        }
        let hh_volume = u32::from(self.regs[0x37] >> 4) * 8;
        let hi_hat = self.rhythm_voice(HH_SLOT, &self.patches[7].modulator, hh_volume, phase, am_level);

        let mut phase = if bit(hh_phase, 8) { 0x200 } else { 0x100 };
        if noise {
            phase ^= 0x100;
        }
        let sd_volume = u32::from(self.regs[0x37] & 0x0F) * 8;
        let snare = self.rhythm_voice(SD_SLOT, &self.patches[7].carrier, sd_volume, phase, am_level);

        let tom_volume = u32::from(self.regs[0x38] >> 4) * 8;
        let tom_phase = self.slots[TOM_SLOT].phase10();
        let tom = self.rhythm_voice(TOM_SLOT, &self.patches[8].modulator, tom_volume, tom_phase, am_level);

        let phase = if metallic { 0x300 } else { 0x100 };
        let cym_volume = u32::from(self.regs[0x38] & 0x0F) * 8;
        let cymbal = self.rhythm_voice(CYM_SLOT, &self.patches[8].carrier, cym_volume, phase, am_level);

        self.store_output(6, bass_drum);
        self.store_output(7, (hi_hat + snare) >> 1);
        self.store_output(8, (tom + cymbal) >> 1);
    }

    fn advance_channel(&mut self, ch: usize, pm_offset: i32) {
        let (fnum, block) = self.frequency(ch);
        let patch = self.patches[ch];
        let sustain = self.regs[0x20 + ch] & 0x20 != 0;
        let counter = self.eg_counter;

        for (slot, op, channel_sustain) in [(ch * 2, &patch.modulator, false), (ch * 2 + 1, &patch.carrier, sustain)] {
            let fnum_pm = if op.vibrato {
                fnum.wrapping_add_signed((fnum as i32 * pm_offset) >> 8)
            } else {
                fnum
            };
            let increment = ((fnum_pm << block) * MULTIPLIER[usize::from(op.mult)]) >> 1;
            let rks = key_scale_rate(op, block, fnum);
            let state = &mut self.slots[slot];
            state.advance_phase(increment);
            state.advance_envelope(op, rks, channel_sustain, counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sine-like user patch with instant attack and release.
    const FAST_PATCH: RawPatch = [0x21, 0x21, 0x3F, 0x00, 0xF0, 0xF0, 0x0F, 0x0F];

    fn keyed_user_tone(opll: &mut Opll) {
        for (reg, &byte) in FAST_PATCH.iter().enumerate() {
            opll.write_reg(reg as u8, byte);
        }
        opll.write_reg(0x30, 0x00);
        opll.write_reg(0x10, 0x00);
        opll.write_reg(0x20, 0x19); // key on, block 4, fnum 0x100
    }

    #[test]
    fn test_silent_after_reset() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        assert!((0..500).all(|_| opll.calc() == 0));
    }

    #[test]
    fn test_phase_increment() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        keyed_user_tone(&mut opll);
        opll.calc();
        // fnum 0x100 << 4 with MULT 1
        assert_eq!(opll.slots[1].phase, 4096);
        assert_eq!(opll.slots[1].phase10(), 8);
    }

    #[test]
    fn test_user_tone_swings_both_ways() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        keyed_user_tone(&mut opll);
        let samples: Vec<i32> = (0..512).map(|_| opll.calc()).collect();
        let max = samples.iter().copied().max().unwrap_or(0);
        let min = samples.iter().copied().min().unwrap_or(0);
        assert!(max > 500, "max {max}");
        assert!(min < -500, "min {min}");
        assert!(max <= 1024 && min >= -1024);
    }

    #[test]
    fn test_key_off_releases_to_silence() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        keyed_user_tone(&mut opll);
        for _ in 0..256 {
            opll.calc();
        }
        opll.write_reg(0x20, 0x09);
        for _ in 0..300 {
            opll.calc();
        }
        assert!((0..64).all(|_| opll.calc() == 0));
    }

    #[test]
    fn test_masked_channel_holds_zero() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        opll.set_mask(1);
        keyed_user_tone(&mut opll);
        assert!((0..256).all(|_| opll.calc() == 0));
        assert_eq!(opll.channel_output(0), 0);
    }

    #[test]
    fn test_clear_channel_output() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        keyed_user_tone(&mut opll);
        while opll.channel_output(0) == 0 {
            opll.calc();
        }
        opll.set_mask(1);
        opll.clear_channel_output(0);
        assert_eq!(opll.calc(), 0);
    }

    #[test]
    fn test_vrc7_ignores_rhythm() {
        let mut opll = Opll::new(FmVariant::Vrc7);
        opll.write_reg(0x0E, 0x30);
        assert!(!opll.rhythm_mode());
        assert_eq!(opll.channel_count(), 6);
        assert_eq!(opll.regs()[0x0E], 0x30);
    }

    #[test]
    fn test_rhythm_bass_drum_sounds() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        opll.write_reg(0x16, 0x20);
        opll.write_reg(0x26, 0x05);
        opll.write_reg(0x36, 0x00);
        opll.write_reg(0x0E, 0x30);
        assert!(opll.rhythm_mode());
        let heard = (0..2000).any(|_| {
            opll.calc();
            opll.channel_output(6) != 0
        });
        assert!(heard);
    }

    #[test]
    fn test_register_index_is_masked() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        opll.write_reg(0x50, 0xAB);
        assert_eq!(opll.regs()[0x10], 0xAB);
    }

    #[test]
    fn test_noise_never_locks_up() {
        let mut opll = Opll::new(FmVariant::Ym2413);
        for _ in 0..10_000 {
            opll.calc();
            assert_ne!(opll.noise, 0);
        }
    }
}

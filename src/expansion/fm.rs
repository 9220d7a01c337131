//! FM expansion adapter (VRC7 and YM2413)
//!
//! Bridges the [`Opll`] core to a band-limited buffer. The core runs at
//! its native rate (clock / 72); each native sample is placed on the CPU
//! timeline in 8-bit fixed-point sub-cycles and only level changes are
//! emitted as deltas.
//!
//! Ports:
//! - `$9010`: internal register select
//! - `$9030`: internal register write
//! - `$E000`: bit 6 silences the output (the core keeps running)

use crate::blip::{BlipEq, BlipSynth, Quality};
use crate::chip::{ChipKind, SoundChip};
use crate::constants::{NTSC_CLOCK_RATE, SEEK_WRITE_SPACING};
use crate::opll::{FmVariant, Opll, NATIVE_RATE, REG_COUNT};
use crate::output::{ChannelRoute, OutputBuffers};
use crate::shadow::ShadowRegisters;

const SILENCE_PORT: u16 = 0xE000;
const SELECT_PORT: u16 = 0x9010;
const WRITE_PORT: u16 = 0x9030;
const SILENCE_FLAG: u8 = 0x40;

const SILENCE_SLOT: usize = REG_COUNT;

/// Fractional bits of the sub-cycle timeline.
const TIME_FRACT_BITS: u32 = 8;

const OUTPUT_MIN: i32 = -3200;
const OUTPUT_MAX: i32 = 3600;
const AMP_RANGE: i32 = OUTPUT_MAX - OUTPUT_MIN;

/// VRC7 or YM2413 sound.
#[derive(Debug, Clone)]
pub struct FmAdapter {
    variant: FmVariant,
    opll: Opll,
    synth: BlipSynth,
    route: ChannelRoute,
    /// CPU clock of the attached buffer
    clock_rate: u32,
    /// Sample rate the core was last built for (0 = never attached)
    built_rate: u32,
    mask: u32,
    latch: u8,
    silenced: bool,
    last_amp: i32,
    /// Sub-cycle time of the next native sample, relative to the frame start
    next_tick: i64,
    shadow: ShadowRegisters<{ REG_COUNT + 1 }>,
}

impl FmAdapter {
    /// Create an adapter for `variant` with no output attached.
    pub fn new(variant: FmVariant) -> Self {
        let mask = variant.default_mask();
        let mut opll = Opll::new(variant);
        opll.set_mask(mask);
        let mut adapter = Self {
            variant,
            opll,
            synth: BlipSynth::new(Quality::Medium, AMP_RANGE),
            route: ChannelRoute::Silenced,
            clock_rate: NTSC_CLOCK_RATE,
            built_rate: 0,
            mask,
            latch: 0,
            silenced: false,
            last_amp: 0,
            next_tick: 0,
            shadow: ShadowRegisters::new(),
        };
        adapter.set_volume(1.0);
        adapter
    }

    /// VRC7 adapter.
    pub fn vrc7() -> Self {
        Self::new(FmVariant::Vrc7)
    }

    /// YM2413 adapter.
    pub fn ym2413() -> Self {
        Self::new(FmVariant::Ym2413)
    }

    /// Modelled chip.
    pub fn variant(&self) -> FmVariant {
        self.variant
    }

    /// The wrapped core.
    pub fn core(&self) -> &Opll {
        &self.opll
    }

    /// Selected internal register.
    pub fn latch(&self) -> u8 {
        self.latch
    }

    /// True while `$E000` bit 6 is set.
    pub fn is_silenced(&self) -> bool {
        self.silenced
    }

    fn rebuild_core(&mut self) {
        self.opll = Opll::new(self.variant);
        self.opll.set_mask(self.mask);
    }

    fn run_until(&mut self, end_time: i64, out: &mut OutputBuffers) {
        let end = end_time << TIME_FRACT_BITS;
        let increment = (i64::from(self.clock_rate) << TIME_FRACT_BITS) / i64::from(NATIVE_RATE);
        let mut buf = out.get_mut(self.route);

        let mut t = self.next_tick;
        while t < end {
            let mut amp = self.opll.calc().clamp(OUTPUT_MIN, OUTPUT_MAX);
            if self.silenced {
                amp = 0;
            }
            let delta = amp - self.last_amp;
            if delta != 0 {
                if let Some(buf) = buf.as_deref_mut() {
                    self.synth.offset(t >> TIME_FRACT_BITS, delta, buf);
                }
                self.last_amp = amp;
            }
            t += increment;
        }
        self.next_tick = t;
    }
}

impl SoundChip for FmAdapter {
    fn kind(&self) -> ChipKind {
        self.variant.kind()
    }

    fn channel_count(&self) -> usize {
        self.variant.channel_count()
    }

    fn reset(&mut self) {
        self.rebuild_core();
        self.latch = 0;
        self.silenced = false;
        self.next_tick = 0;
    }

    fn set_volume(&mut self, volume: f64) {
        self.synth.volume(volume);
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        self.synth.treble_eq(eq);
    }

    /// Every channel shares one mixed output, so any index re-routes the chip.
    fn set_channel_output(&mut self, _index: usize, route: ChannelRoute) {
        self.route = route;
    }

    fn set_output(&mut self, route: ChannelRoute, buffers: &OutputBuffers) {
        self.route = route;
        if let Some(buf) = buffers.get(route) {
            self.clock_rate = buf.clock_rate();
            if buf.sample_rate() != self.built_rate {
                log::debug!("{}: rebuilding FM core for {} Hz output", self.kind(), buf.sample_rate());
                self.built_rate = buf.sample_rate();
                self.rebuild_core();
            }
        }
    }

    fn set_channel_enabled(&mut self, index: usize, enabled: bool) {
        if index >= self.channel_count() {
            return;
        }
        if enabled {
            self.mask &= !(1 << index);
        } else {
            self.mask |= 1 << index;
        }
        self.opll.set_mask(self.mask);
        if !enabled {
            // a frozen channel would otherwise hold its last level
            self.opll.clear_channel_output(index);
        }
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        match addr {
            SILENCE_PORT => {
                self.run_until(time, out);
                self.silenced = data & SILENCE_FLAG != 0;
            }
            SELECT_PORT => self.latch = data,
            WRITE_PORT => {
                self.run_until(time, out);
                self.opll.write_reg(self.latch, data);
            }
            _ => {}
        }
    }

    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers) {
        self.run_until(time, out);
        self.next_tick -= time << TIME_FRACT_BITS;
        debug_assert!(self.next_tick >= 0);
    }

    fn start_seeking(&mut self) {
        self.shadow.clear();
    }

    /// Silence first, then one select/write pair per touched register.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        let shadow = self.shadow;
        let latch = self.latch;
        if let Some(value) = shadow.get(SILENCE_SLOT) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, SILENCE_PORT, value, out);
        }
        for (reg, value) in shadow.entries().filter(|&(i, _)| i < REG_COUNT) {
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, SELECT_PORT, reg as u8, out);
            *clock += SEEK_WRITE_SPACING;
            self.write_register(*clock, WRITE_PORT, value, out);
        }
        self.latch = latch;
        log::trace!("{}: seek replayed {} registers", self.kind(), shadow.len());
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        match addr {
            SILENCE_PORT => self.shadow.set(SILENCE_SLOT, data),
            SELECT_PORT => self.latch = data,
            WRITE_PORT => self.shadow.set(usize::from(self.latch) & (REG_COUNT - 1), data),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::tests::{linear_buffers, total_energy};

    fn write(chip: &mut FmAdapter, out: &mut OutputBuffers, time: i64, reg: u8, value: u8) {
        chip.write_register(time, SELECT_PORT, reg, out);
        chip.write_register(time, WRITE_PORT, value, out);
    }

    /// Piano on channel 0, full volume, key on.
    fn play_note(chip: &mut FmAdapter, out: &mut OutputBuffers) {
        write(chip, out, 0, 0x30, 0x30);
        write(chip, out, 0, 0x10, 0x80);
        write(chip, out, 0, 0x20, 0x19);
    }

    fn attached(variant: FmVariant) -> (FmAdapter, OutputBuffers) {
        let out = linear_buffers();
        let mut chip = FmAdapter::new(variant);
        chip.set_output(ChannelRoute::Linear, &out);
        (chip, out)
    }

    #[test]
    fn test_note_produces_output() {
        let (mut chip, mut out) = attached(FmVariant::Ym2413);
        play_note(&mut chip, &mut out);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(total_energy(out.linear()) > 0);
    }

    #[test]
    fn test_silence_flag_mutes() {
        let (mut chip, mut out) = attached(FmVariant::Vrc7);
        chip.write_register(0, SILENCE_PORT, SILENCE_FLAG, &mut out);
        play_note(&mut chip, &mut out);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(chip.is_silenced());
        assert_eq!(total_energy(out.linear()), 0);
    }

    #[test]
    fn test_disabled_channel_is_silent() {
        let (mut chip, mut out) = attached(FmVariant::Ym2413);
        chip.set_channel_enabled(0, false);
        play_note(&mut chip, &mut out);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert_eq!(total_energy(out.linear()), 0);
        assert_eq!(chip.core().mask() & 1, 1);
    }

    #[test]
    fn test_default_masks() {
        assert_eq!(FmAdapter::ym2413().core().mask(), 0);
        assert_eq!(FmAdapter::vrc7().core().mask(), 0x1C0);
    }

    #[test]
    fn test_sub_cycle_remainder_carries_over() {
        let (mut chip, mut out) = attached(FmVariant::Ym2413);
        chip.end_frame(29_780, &mut out);
        let increment = (i64::from(NTSC_CLOCK_RATE) << TIME_FRACT_BITS) / i64::from(NATIVE_RATE);
        assert!((0..increment).contains(&chip.next_tick));
    }

    #[test]
    fn test_rebuild_only_on_rate_change() {
        let (mut chip, mut out) = attached(FmVariant::Ym2413);
        write(&mut chip, &mut out, 0, 0x30, 0x35);
        chip.set_output(ChannelRoute::Linear, &out);
        assert_eq!(chip.core().regs()[0x30], 0x35);

        for buf in out.iter_mut() {
            buf.set_sample_rate(48_000).unwrap();
        }
        chip.set_output(ChannelRoute::Linear, &out);
        assert_eq!(chip.core().regs()[0x30], 0);
    }

    #[test]
    fn test_seek_replays_silence_then_registers() {
        let (mut chip, mut out) = attached(FmVariant::Ym2413);
        chip.start_seeking();
        chip.write_shadow_register(SELECT_PORT, 0x30);
        chip.write_shadow_register(WRITE_PORT, 0x10);
        chip.write_shadow_register(WRITE_PORT, 0x20);
        chip.write_shadow_register(SELECT_PORT, 0x10);
        chip.write_shadow_register(WRITE_PORT, 0x99);
        chip.write_shadow_register(SILENCE_PORT, SILENCE_FLAG);
        assert_eq!(chip.core().regs()[0x30], 0, "seeking does not synthesise");

        let mut clock = 0;
        chip.stop_seeking(&mut clock, &mut out);
        assert_eq!(chip.core().regs()[0x30], 0x20);
        assert_eq!(chip.core().regs()[0x10], 0x99);
        assert!(chip.is_silenced());
        assert_eq!(chip.latch(), 0x10);
        assert_eq!(clock, 5 * SEEK_WRITE_SPACING);
    }
}

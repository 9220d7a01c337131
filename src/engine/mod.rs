//! Multi-chip mixing engine
//!
//! [`MixingEngine`] owns the base APU, one instance of every expansion chip
//! and the output buffers. The host feeds it register writes on a cycle
//! timeline, closes frames, and reads 16-bit samples:
//!
//! 1. `write_register` / `skip_cycles` during the frame
//! 2. `end_frame` once the frame's cycles have elapsed
//! 3. `read_samples` while `samples_avail` is non-zero
//!
//! Pulses and every expansion are mixed linearly in one buffer. Triangle,
//! noise and DMC go to the TND buffers and are passed through the DAC's
//! non-linearity sample by sample before the two groups are summed. In the
//! separate TND modes each of the three channels has its own buffer, so a
//! channel can be muted after the non-linearity without changing how loud
//! the others are.
//!
//! # Seeking
//!
//! Between [`start_seeking`](MixingEngine::start_seeking) and
//! [`stop_seeking`](MixingEngine::stop_seeking) writes only update per-chip
//! shadow registers. Stopping replays the last value of every touched
//! register, four cycles apart, from the current clock.

pub mod nonlinear;

use crate::apu::{channel, Apu, ApuSnapshot, DmcReader};
use crate::blip::{clamp_sample, BlipEq, BlipReader};
use crate::chip::{ChipKind, ExpansionMask, SoundChip};
use crate::config::{EngineConfig, Region, TndMode};
use crate::constants::{APU_END_ADDR, APU_START_ADDR};
use crate::expansion::{ExpansionChip, Fds, FmAdapter, Mmc5, Namco, Sunsoft, Vrc6};
use crate::output::{ChannelRoute, OutputBuffers, TND_BUFFER_COUNT};
use crate::Result;
use nonlinear::{nonlinearize, pack_sample, unpack_sample};

/// Multi-chip sound engine.
#[derive(Debug)]
pub struct MixingEngine {
    apu: Apu,
    /// Every expansion, in [`ChipKind::EXPANSIONS`] order
    expansions: [ExpansionChip; 7],
    enabled: ExpansionMask,
    out: OutputBuffers,

    region: Region,
    tnd_mode: TndMode,
    sample_rate: u32,
    /// Remix inclusion of triangle, noise, DMC (separate modes)
    tnd_enabled: [bool; TND_BUFFER_COUNT],
    tnd_accum: [i64; TND_BUFFER_COUNT],
    prev_nonlinear_tnd: i64,
    tnd_volume: f32,

    time: i64,
    frame_length: i64,
    seeking: bool,
}

impl MixingEngine {
    /// Create an NTSC engine. Call [`configure`](Self::configure) before use.
    pub fn new() -> Self {
        Self {
            apu: Apu::new(),
            expansions: [
                ExpansionChip::Vrc6(Vrc6::new()),
                ExpansionChip::Vrc7(FmAdapter::vrc7()),
                ExpansionChip::Fds(Fds::new()),
                ExpansionChip::Mmc5(Mmc5::new()),
                ExpansionChip::Namco(Namco::new()),
                ExpansionChip::Sunsoft(Sunsoft::new()),
                ExpansionChip::Ym2413(FmAdapter::ym2413()),
            ],
            enabled: ExpansionMask::empty(),
            out: OutputBuffers::new(),
            region: Region::Ntsc,
            tnd_mode: TndMode::Single,
            sample_rate: 0,
            tnd_enabled: [true; TND_BUFFER_COUNT],
            tnd_accum: [0; TND_BUFFER_COUNT],
            prev_nonlinear_tnd: 0,
            tnd_volume: 1.0,
            time: 0,
            frame_length: Region::Ntsc.base_frame_length(),
            seeking: false,
        }
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Set output rate, console region and TND buffering, then re-attach
    /// every chip.
    ///
    /// # Errors
    ///
    /// Fails when the buffers cannot be sized for `sample_rate`.
    pub fn configure(&mut self, sample_rate: u32, region: Region, tnd_mode: TndMode) -> Result<()> {
        // A rejected rate leaves every buffer and field untouched.
        for buf in self.out.iter_mut() {
            buf.set_sample_rate(sample_rate)?;
        }

        // Rates first, so chips see the final buffers when attaching.
        let clock_rate = region.clock_rate();
        for buf in self.out.iter_mut() {
            buf.set_clock_rate(clock_rate);
        }
        self.sample_rate = sample_rate;
        self.region = region;
        self.tnd_mode = tnd_mode;
        self.tnd_enabled = [true; TND_BUFFER_COUNT];
        self.frame_length = region.base_frame_length();
        self.tnd_accum = [0; TND_BUFFER_COUNT];
        self.prev_nonlinear_tnd = 0;

        if tnd_mode.is_separate() {
            self.apu.set_channel_output(channel::SQUARE1, ChannelRoute::Linear);
            self.apu.set_channel_output(channel::SQUARE2, ChannelRoute::Linear);
            self.apu.set_channel_output(channel::TRIANGLE, ChannelRoute::Tnd(0));
            self.apu.set_channel_output(channel::NOISE, ChannelRoute::Tnd(1));
            self.apu.set_channel_output(channel::DMC, ChannelRoute::Tnd(2));
        } else {
            self.apu.set_split_output(ChannelRoute::Linear, ChannelRoute::Tnd(0));
        }
        for chip in &mut self.expansions {
            chip.set_output(ChannelRoute::Linear, &self.out);
        }

        log::debug!(
            "engine configured: {} Hz, {:?} ({} Hz clock), TND {:?}",
            sample_rate,
            region,
            clock_rate,
            tnd_mode
        );
        Ok(())
    }

    /// [`configure`](Self::configure) from an [`EngineConfig`], then apply its
    /// expansions, levels and treble.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate or the buffers cannot
    /// be sized.
    pub fn apply_config(&mut self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        self.configure(config.sample_rate, config.region, config.tnd_mode)?;
        self.set_expansions(config.expansions);
        for kind in std::iter::once(ChipKind::BaseApu).chain(ChipKind::EXPANSIONS) {
            self.set_expansion_volume(kind, config.volumes.get(kind));
            if let Some(treble) = config.treble_db {
                self.treble_eq(kind, treble, config.sample_rate);
            }
        }
        Ok(())
    }

    /// Choose which expansions receive writes, frame ends and seek calls.
    pub fn set_expansions(&mut self, mask: ExpansionMask) {
        self.enabled = mask;
    }

    /// Enabled expansions.
    pub fn expansions(&self) -> ExpansionMask {
        self.enabled
    }

    /// Install the DMC sample fetch callback.
    pub fn set_dmc_reader(&mut self, reader: DmcReader) {
        self.apu.set_dmc_reader(reader);
    }

    /// Level of one chip. For the base APU this scales the pulses and the
    /// non-linear TND mix.
    pub fn set_expansion_volume(&mut self, chip: ChipKind, volume: f64) {
        match chip {
            ChipKind::BaseApu => {
                self.apu.enable_nonlinear(volume);
                self.tnd_volume = volume as f32;
            }
            kind => {
                if let Some(exp) = self.expansion_mut(kind) {
                    exp.set_volume(volume);
                }
            }
        }
    }

    /// Treble equalisation of one chip's synths.
    pub fn treble_eq(&mut self, chip: ChipKind, treble_db: f64, sample_rate: u32) {
        let eq = BlipEq::with_rates(treble_db, 0, sample_rate);
        match chip {
            ChipKind::BaseApu => self.apu.treble_eq(&eq),
            kind => {
                if let Some(exp) = self.expansion_mut(kind) {
                    exp.treble_eq(&eq);
                }
            }
        }
    }

    /// Mute or unmute one channel of a chip.
    ///
    /// In the separate TND modes the triangle, noise and DMC keep rendering
    /// and are only left out of the non-linear mix.
    pub fn set_channel_enabled(&mut self, chip: ChipKind, index: usize, enabled: bool) {
        match chip {
            ChipKind::BaseApu => match index {
                channel::SQUARE1 | channel::SQUARE2 => {
                    self.apu.set_channel_output(index, ChannelRoute::linear_if(enabled));
                }
                channel::TRIANGLE..=channel::DMC => {
                    if self.tnd_mode.is_separate() {
                        self.tnd_enabled[index - channel::TRIANGLE] = enabled;
                    } else {
                        let route = if enabled { ChannelRoute::Tnd(0) } else { ChannelRoute::Silenced };
                        self.apu.set_channel_output(index, route);
                    }
                }
                _ => log::trace!("ignored channel {index} of {chip}"),
            },
            kind => {
                if let Some(exp) = self.expansion_mut(kind) {
                    exp.set_channel_enabled(index, enabled);
                }
            }
        }
    }

    // ========================================================================
    // Timeline
    // ========================================================================

    /// Write a register at the current clock.
    ///
    /// `$4000-$4017` goes to the base APU; anything else is offered to every
    /// enabled expansion, each of which ignores addresses it does not decode.
    pub fn write_register(&mut self, addr: u16, data: u8) {
        let time = self.time;
        let is_apu = (APU_START_ADDR..=APU_END_ADDR).contains(&addr);

        if self.seeking {
            if is_apu {
                self.apu.write_shadow_register(addr, data);
            } else {
                for chip in Self::enabled_iter(&mut self.expansions, self.enabled) {
                    chip.write_shadow_register(addr, data);
                }
            }
            return;
        }

        if is_apu {
            self.apu.write_register(time, addr, data, &mut self.out);
        } else if self.enabled.is_empty() {
            log::trace!("ignored write ${addr:04X} = ${data:02X}: no expansion enabled");
        } else {
            for chip in Self::enabled_iter(&mut self.expansions, self.enabled) {
                chip.write_register(time, addr, data, &mut self.out);
            }
        }
    }

    /// `$4015` read at the current clock.
    pub fn read_status(&mut self) -> u8 {
        self.apu.read_status(self.time, &mut self.out)
    }

    /// Advance the clock by `cycles`, running the base APU. Ignored while
    /// seeking.
    pub fn skip_cycles(&mut self, cycles: i64) {
        if self.seeking {
            return;
        }
        self.time += cycles;
        self.apu.run_until(self.time, &mut self.out);
    }

    /// Close the frame and make its samples readable.
    ///
    /// NTSC frames alternate 29781/29780 cycles (PAL 33246/33247), starting
    /// with the longer one after configuration.
    pub fn end_frame(&mut self) {
        self.time = 0;
        self.frame_length ^= 1;
        let length = self.frame_length;

        self.apu.end_frame(length, &mut self.out);
        for chip in Self::enabled_iter(&mut self.expansions, self.enabled) {
            chip.end_frame(length, &mut self.out);
        }

        let (linear, tnd) = self.out.split_mut();
        linear.end_frame(length);
        tnd[0].end_frame(length);
        if self.tnd_mode.is_separate() {
            tnd[1].end_frame(length);
            tnd[2].end_frame(length);
        }
        self.debug_check_sync();
    }

    /// Samples ready to read.
    pub fn samples_avail(&self) -> usize {
        self.debug_check_sync();
        self.out.linear().samples_avail()
    }

    /// Mix `count` samples into `out`. Returns the number written.
    ///
    /// `count` must not exceed [`samples_avail`](Self::samples_avail) or the
    /// length of `out`.
    pub fn read_samples(&mut self, out: &mut [i16], count: usize) -> usize {
        self.debug_check_sync();
        debug_assert!(count <= self.samples_avail(), "reading more samples than available");
        debug_assert!(count <= out.len(), "output slice too short");
        let count = count.min(self.samples_avail()).min(out.len());
        if count == 0 {
            return 0;
        }

        if self.tnd_mode.is_separate() {
            self.remix_separate(count);
        } else {
            self.remix_single(count);
        }

        let (linear, tnd) = self.out.split_mut();
        let tnd0 = &mut tnd[0];
        let mut lin = BlipReader::begin(linear);
        let mut nonlin = BlipReader::begin(tnd0);
        for sample in &mut out[..count] {
            *sample = clamp_sample(lin.read() + nonlin.read());
            lin.next(linear);
            nonlin.next(tnd0);
        }
        lin.end(linear);
        nonlin.end(tnd0);

        self.remove_samples(count);
        count
    }

    /// Discard `count` samples from every active buffer.
    pub fn remove_samples(&mut self, count: usize) {
        let separate = self.tnd_mode.is_separate();
        let (linear, tnd) = self.out.split_mut();
        linear.remove_samples(count);
        tnd[0].remove_samples(count);
        if separate {
            tnd[1].remove_samples(count);
            tnd[2].remove_samples(count);
        }
    }

    /// Rewrite TND buffer 0 with the non-linear mix of one shared level.
    fn remix_single(&mut self, count: usize) {
        let cells = self.out.tnd_mut()[0].deltas_mut();
        for cell in &mut cells[..count] {
            self.tnd_accum[0] += i64::from(*cell);
            let level = nonlinearize(unpack_sample(self.tnd_accum[0]));
            let packed = pack_sample(level * self.tnd_volume);
            *cell = (packed - self.prev_nonlinear_tnd) as i32;
            self.prev_nonlinear_tnd = packed;
        }
    }

    /// Mix the three TND buffers into buffer 0, leaving out disabled
    /// channels after the non-linearity.
    fn remix_separate(&mut self, count: usize) {
        let enabled = self.tnd_enabled;
        let dmc_only = self.tnd_mode == TndMode::SeparateTnOnly && enabled == [false, false, true];

        let [triangle, noise, dmc] = self.out.tnd_mut();
        let noise = &noise.deltas()[..count];
        let dmc = &dmc.deltas()[..count];
        let triangle = &mut triangle.deltas_mut()[..count];

        for n in 0..count {
            self.tnd_accum[0] += i64::from(triangle[n]);
            self.tnd_accum[1] += i64::from(noise[n]);
            self.tnd_accum[2] += i64::from(dmc[n]);

            let mut levels = self.tnd_accum.map(unpack_sample);
            if dmc_only {
                // keep the triangle from bleeding into an isolated DMC
                levels[0] = 0.0;
                levels[1] = 0.0;
            }

            let sum: f32 = levels.iter().sum();
            let ratio = nonlinearize(sum) / sum;
            let mix: f32 = levels
                .iter()
                .zip(enabled)
                .filter(|&(_, on)| on)
                .map(|(level, _)| level * ratio)
                .sum();

            let packed = pack_sample(mix * self.tnd_volume);
            triangle[n] = (packed - self.prev_nonlinear_tnd) as i32;
            self.prev_nonlinear_tnd = packed;
        }
    }

    // ========================================================================
    // Seeking
    // ========================================================================

    /// Start buffering writes instead of synthesising them.
    pub fn start_seeking(&mut self) {
        self.seeking = true;
        self.apu.start_seeking();
        for chip in Self::enabled_iter(&mut self.expansions, self.enabled) {
            chip.start_seeking();
        }
        log::trace!("seeking started at cycle {}", self.time);
    }

    /// Replay the buffered registers from the current clock and resume
    /// normal synthesis.
    pub fn stop_seeking(&mut self) {
        let start = self.time;
        self.apu.stop_seeking(&mut self.time, &mut self.out);
        for chip in Self::enabled_iter(&mut self.expansions, self.enabled) {
            chip.stop_seeking(&mut self.time, &mut self.out);
        }
        self.seeking = false;
        log::trace!("seeking stopped: {} replay cycles", self.time - start);
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Reset every chip and the non-linear mixer state.
    pub fn reset(&mut self) {
        self.apu.enable_nonlinear(1.0);
        self.seeking = false;
        self.prev_nonlinear_tnd = 0;
        self.tnd_accum = [0; TND_BUFFER_COUNT];
        self.apu.reset_with(self.region.is_pal(), 0);
        for chip in &mut self.expansions {
            chip.reset();
        }
        log::debug!("engine reset ({:?})", self.region);
    }

    /// Capture the base APU state.
    pub fn save_snapshot(&self) -> ApuSnapshot {
        self.apu.save_snapshot()
    }

    /// Restore the base APU state.
    pub fn load_snapshot(&mut self, snapshot: &ApuSnapshot) {
        self.apu.load_snapshot(snapshot);
    }

    /// Current cycle within the frame.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Length of the last closed frame (or, before the first one, the value
    /// the first toggle starts from).
    pub fn frame_length(&self) -> i64 {
        self.frame_length
    }

    /// True between `start_seeking` and `stop_seeking`.
    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    /// Console region.
    pub fn region(&self) -> Region {
        self.region
    }

    /// TND buffering mode.
    pub fn tnd_mode(&self) -> TndMode {
        self.tnd_mode
    }

    /// Configured output rate (0 before `configure`).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The base APU.
    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    /// The base APU.
    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    /// One expansion chip.
    pub fn expansion(&self, kind: ChipKind) -> Option<&ExpansionChip> {
        self.expansions.iter().find(|chip| chip.kind() == kind)
    }

    /// One expansion chip.
    pub fn expansion_mut(&mut self, kind: ChipKind) -> Option<&mut ExpansionChip> {
        self.expansions.iter_mut().find(|chip| chip.kind() == kind)
    }

    /// The output buffers.
    pub fn output_buffers(&self) -> &OutputBuffers {
        &self.out
    }

    fn enabled_iter(
        expansions: &mut [ExpansionChip],
        mask: ExpansionMask,
    ) -> impl Iterator<Item = &mut ExpansionChip> {
        expansions
            .iter_mut()
            .filter(move |chip| mask.contains(chip.kind().mask()))
    }

    fn debug_check_sync(&self) {
        let avail = self.out.linear().samples_avail();
        let tnd = self.out.tnd();
        debug_assert_eq!(avail, tnd[0].samples_avail(), "TND buffer 0 out of sync");
        if self.tnd_mode.is_separate() {
            debug_assert_eq!(avail, tnd[1].samples_avail(), "TND buffer 1 out of sync");
            debug_assert_eq!(avail, tnd[2].samples_avail(), "TND buffer 2 out of sync");
        } else {
            debug_assert_eq!(tnd[1].samples_avail() + tnd[2].samples_avail(), 0);
        }
    }
}

impl Default for MixingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NesSndError;

    fn engine(mode: TndMode) -> MixingEngine {
        let mut engine = MixingEngine::new();
        engine.configure(44_100, Region::Ntsc, mode).unwrap();
        engine.reset();
        engine
    }

    fn play_frame(engine: &mut MixingEngine) -> Vec<i16> {
        engine.skip_cycles(engine.frame_length());
        engine.end_frame();
        let mut pcm = vec![0i16; engine.samples_avail()];
        let count = pcm.len();
        assert_eq!(engine.read_samples(&mut pcm, count), count);
        pcm
    }

    #[test]
    fn test_configure_rejects_zero_rate() {
        let mut engine = MixingEngine::new();
        let err = engine.configure(0, Region::Ntsc, TndMode::Single).unwrap_err();
        assert!(matches!(err, NesSndError::InvalidSampleRate { rate: 0 }));
    }

    #[test]
    fn test_failed_configure_keeps_previous_setup() {
        let mut engine = engine(TndMode::Single);
        engine.set_channel_enabled(ChipKind::BaseApu, channel::NOISE, false);

        assert!(engine.configure(0, Region::Pal, TndMode::Separate).is_err());
        assert_eq!(engine.region(), Region::Ntsc);
        assert_eq!(engine.tnd_mode(), TndMode::Single);
        assert_eq!(engine.sample_rate(), 44_100);
        assert_eq!(engine.frame_length(), Region::Ntsc.base_frame_length());
        assert_eq!(engine.apu().channel_output(channel::NOISE), Some(ChannelRoute::Silenced));
        assert_eq!(engine.apu().channel_output(channel::TRIANGLE), Some(ChannelRoute::Tnd(0)));

        // still produces a full frame at the old rate
        engine.end_frame();
        assert!((733..=734).contains(&engine.samples_avail()), "{}", engine.samples_avail());
    }

    #[test]
    fn test_frame_length_dithers() {
        let mut engine = engine(TndMode::Single);
        let lengths: Vec<i64> = (0..4)
            .map(|_| {
                engine.end_frame();
                engine.frame_length()
            })
            .collect();
        assert_eq!(lengths, vec![29_781, 29_780, 29_781, 29_780]);

        let mut pal = MixingEngine::new();
        pal.configure(48_000, Region::Pal, TndMode::Single).unwrap();
        pal.end_frame();
        assert_eq!(pal.frame_length(), 33_246);
    }

    #[test]
    fn test_buffers_stay_in_sync() {
        for mode in [TndMode::Single, TndMode::Separate, TndMode::SeparateTnOnly] {
            let mut engine = engine(mode);
            engine.write_register(0x4015, 0x0F);
            engine.write_register(0x4008, 0xFF);
            engine.write_register(0x400B, 0x08);
            for _ in 0..3 {
                engine.end_frame();
                let linear = engine.output_buffers().linear().samples_avail();
                let tnd = engine.output_buffers().tnd();
                assert_eq!(linear, tnd[0].samples_avail());
                if mode.is_separate() {
                    assert_eq!(linear, tnd[1].samples_avail());
                    assert_eq!(linear, tnd[2].samples_avail());
                } else {
                    assert_eq!(tnd[1].samples_avail(), 0);
                }
                let half = engine.samples_avail() / 2;
                engine.read_samples(&mut vec![0; half], half);
            }
        }
    }

    #[test]
    fn test_read_zero_returns_zero() {
        let mut engine = engine(TndMode::Single);
        engine.end_frame();
        let avail = engine.samples_avail();
        assert_eq!(engine.read_samples(&mut [], 0), 0);
        assert_eq!(engine.samples_avail(), avail);
    }

    #[test]
    fn test_silence_reads_as_zero() {
        let mut engine = engine(TndMode::Single);
        let pcm = play_frame(&mut engine);
        assert!(!pcm.is_empty());
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_separate_mode_routes_tnd_per_channel() {
        let engine = engine(TndMode::Separate);
        let apu = engine.apu();
        assert_eq!(apu.channel_output(channel::SQUARE1), Some(ChannelRoute::Linear));
        assert_eq!(apu.channel_output(channel::TRIANGLE), Some(ChannelRoute::Tnd(0)));
        assert_eq!(apu.channel_output(channel::NOISE), Some(ChannelRoute::Tnd(1)));
        assert_eq!(apu.channel_output(channel::DMC), Some(ChannelRoute::Tnd(2)));
    }

    #[test]
    fn test_tnd_enable_is_a_flag_in_separate_mode() {
        let mut separate = engine(TndMode::Separate);
        separate.set_channel_enabled(ChipKind::BaseApu, channel::NOISE, false);
        assert_eq!(separate.tnd_enabled, [true, false, true]);
        assert_eq!(separate.apu().channel_output(channel::NOISE), Some(ChannelRoute::Tnd(1)));

        let mut single = engine(TndMode::Single);
        single.set_channel_enabled(ChipKind::BaseApu, channel::NOISE, false);
        assert_eq!(single.apu().channel_output(channel::NOISE), Some(ChannelRoute::Silenced));
        single.set_channel_enabled(ChipKind::BaseApu, channel::NOISE, true);
        assert_eq!(single.apu().channel_output(channel::NOISE), Some(ChannelRoute::Tnd(0)));
    }

    #[test]
    fn test_disabled_expansion_gets_no_writes() {
        let mut engine = engine(TndMode::Single);
        engine.write_register(0xC000, 0x08);
        let latch = |e: &MixingEngine| match e.expansion(ChipKind::Sunsoft) {
            Some(ExpansionChip::Sunsoft(chip)) => chip.latch(),
            _ => unreachable!(),
        };
        assert_eq!(latch(&engine), 0);

        engine.set_expansions(ExpansionMask::SUNSOFT);
        engine.write_register(0xC000, 0x08);
        assert_eq!(latch(&engine), 8);
    }

    #[test]
    fn test_seeking_defers_writes_and_advances_clock() {
        let mut engine = engine(TndMode::Single);
        engine.skip_cycles(100);
        engine.start_seeking();
        engine.write_register(0x4015, 0x01);
        engine.write_register(0x4003, 0x08);
        engine.write_register(0x4003, 0x10);
        engine.skip_cycles(5_000);
        assert_eq!(engine.time(), 100, "clock frozen while seeking");
        assert_eq!(engine.apu().length_counter(0), 0);

        engine.stop_seeking();
        assert!(!engine.is_seeking());
        assert_eq!(engine.time(), 108);
        assert_ne!(engine.apu().length_counter(0), 0);
    }

    #[test]
    fn test_volume_scales_tnd() {
        let mut engine = engine(TndMode::Single);
        engine.set_expansion_volume(ChipKind::BaseApu, 0.5);
        assert_eq!(engine.tnd_volume, 0.5);
    }

    #[test]
    fn test_apply_config() {
        let mut engine = MixingEngine::new();
        let config = EngineConfig::pal(48_000)
            .with_tnd_mode(TndMode::SeparateTnOnly)
            .with_expansions(ExpansionMask::VRC6 | ExpansionMask::FDS)
            .with_treble(-12.0);
        engine.apply_config(&config).unwrap();
        assert_eq!(engine.region(), Region::Pal);
        assert_eq!(engine.sample_rate(), 48_000);
        assert_eq!(engine.expansions(), ExpansionMask::VRC6 | ExpansionMask::FDS);
        assert_eq!(engine.output_buffers().linear().clock_rate(), 1_662_607);

        let bad = EngineConfig::default().with_volume(ChipKind::Namco, -1.0);
        assert!(engine.apply_config(&bad).is_err());
    }

    #[test]
    fn test_reset_clears_seek_state() {
        let mut engine = engine(TndMode::Single);
        engine.start_seeking();
        engine.reset();
        assert!(!engine.is_seeking());
    }
}

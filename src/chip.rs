//! Chip contract and identifiers
//!
//! Every sound chip the engine drives implements [`SoundChip`]. The trait is
//! the uniform surface for register writes, routing, frame boundaries and the
//! seek protocol; the engine itself dispatches over the closed set of chips
//! described by [`ChipKind`].

use crate::blip::BlipEq;
use crate::output::{ChannelRoute, OutputBuffers};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Identifies the base APU or one expansion chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipKind {
    /// 2A03/2A07 built-in APU
    BaseApu,
    /// Konami VRC6
    Vrc6,
    /// Konami VRC7 (OPLL derivative)
    Vrc7,
    /// Famicom Disk System wavetable
    Fds,
    /// Nintendo MMC5
    Mmc5,
    /// Namco 163
    Namco,
    /// Sunsoft 5B
    Sunsoft,
    /// Yamaha YM2413 (OPLL)
    Ym2413,
}

impl ChipKind {
    /// The seven expansion chips, in engine dispatch order.
    pub const EXPANSIONS: [ChipKind; 7] = [
        ChipKind::Vrc6,
        ChipKind::Vrc7,
        ChipKind::Fds,
        ChipKind::Mmc5,
        ChipKind::Namco,
        ChipKind::Sunsoft,
        ChipKind::Ym2413,
    ];

    /// Number of independently routable channels.
    pub const fn channel_count(self) -> usize {
        match self {
            ChipKind::BaseApu => 5,
            ChipKind::Vrc6 => 3,
            ChipKind::Vrc7 => 6,
            ChipKind::Fds => 1,
            ChipKind::Mmc5 => 3,
            ChipKind::Namco => 8,
            ChipKind::Sunsoft => 3,
            ChipKind::Ym2413 => 9,
        }
    }

    /// Gating bit of an expansion (empty for the base APU).
    pub const fn mask(self) -> ExpansionMask {
        match self {
            ChipKind::BaseApu => ExpansionMask::empty(),
            ChipKind::Vrc6 => ExpansionMask::VRC6,
            ChipKind::Vrc7 => ExpansionMask::VRC7,
            ChipKind::Fds => ExpansionMask::FDS,
            ChipKind::Mmc5 => ExpansionMask::MMC5,
            ChipKind::Namco => ExpansionMask::NAMCO,
            ChipKind::Sunsoft => ExpansionMask::SUNSOFT,
            ChipKind::Ym2413 => ExpansionMask::YM2413,
        }
    }

    /// Short display name.
    pub const fn name(self) -> &'static str {
        match self {
            ChipKind::BaseApu => "2A03",
            ChipKind::Vrc6 => "VRC6",
            ChipKind::Vrc7 => "VRC7",
            ChipKind::Fds => "FDS",
            ChipKind::Mmc5 => "MMC5",
            ChipKind::Namco => "N163",
            ChipKind::Sunsoft => "5B",
            ChipKind::Ym2413 => "YM2413",
        }
    }
}

impl std::fmt::Display for ChipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of enabled expansion chips.
    ///
    /// Disabled expansions receive no register writes, frame-end calls or
    /// seek calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ExpansionMask: u8 {
        /// Konami VRC6
        const VRC6 = 1 << 0;
        /// Konami VRC7
        const VRC7 = 1 << 1;
        /// Famicom Disk System
        const FDS = 1 << 2;
        /// Nintendo MMC5
        const MMC5 = 1 << 3;
        /// Namco 163
        const NAMCO = 1 << 4;
        /// Sunsoft 5B
        const SUNSOFT = 1 << 5;
        /// Yamaha YM2413
        const YM2413 = 1 << 6;
    }
}

/// Uniform contract of a register-driven sound chip.
///
/// Times are CPU cycles relative to the start of the current frame and must
/// be non-decreasing within a frame. Writes to addresses a chip does not
/// decode are ignored.
pub trait SoundChip {
    /// Which chip this is.
    fn kind(&self) -> ChipKind;

    /// Number of routable channels.
    fn channel_count(&self) -> usize {
        self.kind().channel_count()
    }

    /// Return to power-on state. Routing, volume and equalisation survive.
    fn reset(&mut self);

    /// Set the overall output level (1.0 = nominal).
    fn set_volume(&mut self, volume: f64);

    /// Set treble equalisation of every synth.
    fn treble_eq(&mut self, eq: &BlipEq);

    /// Route one channel. Out-of-range indices are ignored.
    fn set_channel_output(&mut self, index: usize, route: ChannelRoute);

    /// Route every channel to `route`.
    ///
    /// `buffers` lets a chip inspect the destination (e.g. its sample rate)
    /// when attaching.
    fn set_output(&mut self, route: ChannelRoute, buffers: &OutputBuffers) {
        let _ = buffers;
        for index in 0..self.channel_count() {
            self.set_channel_output(index, route);
        }
    }

    /// Mute or unmute one channel.
    ///
    /// The default re-routes the channel to the linear buffer or silences it.
    fn set_channel_enabled(&mut self, index: usize, enabled: bool) {
        self.set_channel_output(index, ChannelRoute::linear_if(enabled));
    }

    /// Decode a register write at `time`.
    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers);

    /// Run to `time`, then make times relative to the next frame.
    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers);

    /// Forget every shadowed register.
    fn start_seeking(&mut self);

    /// Replay shadowed registers as ordinary writes.
    ///
    /// `clock` is advanced by four cycles before each replayed write.
    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers);

    /// Record a write made while seeking, without synthesis.
    fn write_shadow_register(&mut self, addr: u16, data: u8);
}

//! Expansion sound chips
//!
//! Famicom cartridges and the Disk System could add their own sound
//! hardware, mixed linearly with the console's APU. Each chip implements
//! [`SoundChip`]; [`ExpansionChip`] is the closed set the engine holds and
//! dispatches over.

mod fds;
mod fm;
mod mmc5;
mod namco;
mod sunsoft;
mod vrc6;

pub use crate::opll::FmVariant;
pub use fds::Fds;
pub use fm::FmAdapter;
pub use mmc5::Mmc5;
pub use namco::Namco;
pub use sunsoft::Sunsoft;
pub use vrc6::Vrc6;

use crate::blip::BlipEq;
use crate::chip::{ChipKind, SoundChip};
use crate::output::{ChannelRoute, OutputBuffers};

/// One expansion chip.
#[derive(Debug, Clone)]
pub enum ExpansionChip {
    /// Konami VRC6
    Vrc6(Vrc6),
    /// Konami VRC7
    Vrc7(FmAdapter),
    /// Famicom Disk System
    Fds(Fds),
    /// Nintendo MMC5
    Mmc5(Mmc5),
    /// Namco 163
    Namco(Namco),
    /// Sunsoft 5B
    Sunsoft(Sunsoft),
    /// Yamaha YM2413
    Ym2413(FmAdapter),
}

macro_rules! dispatch {
    ($self:expr, $chip:ident => $body:expr) => {
        match $self {
            ExpansionChip::Vrc6($chip) => $body,
            ExpansionChip::Vrc7($chip) => $body,
            ExpansionChip::Fds($chip) => $body,
            ExpansionChip::Mmc5($chip) => $body,
            ExpansionChip::Namco($chip) => $body,
            ExpansionChip::Sunsoft($chip) => $body,
            ExpansionChip::Ym2413($chip) => $body,
        }
    };
}

impl ExpansionChip {
    /// Power-on instance of `kind`, or `None` for the base APU.
    pub fn new(kind: ChipKind) -> Option<Self> {
        Some(match kind {
            ChipKind::BaseApu => return None,
            ChipKind::Vrc6 => ExpansionChip::Vrc6(Vrc6::new()),
            ChipKind::Vrc7 => ExpansionChip::Vrc7(FmAdapter::vrc7()),
            ChipKind::Fds => ExpansionChip::Fds(Fds::new()),
            ChipKind::Mmc5 => ExpansionChip::Mmc5(Mmc5::new()),
            ChipKind::Namco => ExpansionChip::Namco(Namco::new()),
            ChipKind::Sunsoft => ExpansionChip::Sunsoft(Sunsoft::new()),
            ChipKind::Ym2413 => ExpansionChip::Ym2413(FmAdapter::ym2413()),
        })
    }

    /// The FM adapter, for VRC7 and YM2413.
    pub fn as_fm(&self) -> Option<&FmAdapter> {
        match self {
            ExpansionChip::Vrc7(chip) | ExpansionChip::Ym2413(chip) => Some(chip),
            _ => None,
        }
    }

    /// The FDS, to adjust its modulation tempo.
    pub fn as_fds_mut(&mut self) -> Option<&mut Fds> {
        match self {
            ExpansionChip::Fds(chip) => Some(chip),
            _ => None,
        }
    }
}

impl SoundChip for ExpansionChip {
    fn kind(&self) -> ChipKind {
        dispatch!(self, chip => chip.kind())
    }

    fn channel_count(&self) -> usize {
        dispatch!(self, chip => chip.channel_count())
    }

    fn reset(&mut self) {
        dispatch!(self, chip => chip.reset())
    }

    fn set_volume(&mut self, volume: f64) {
        dispatch!(self, chip => chip.set_volume(volume))
    }

    fn treble_eq(&mut self, eq: &BlipEq) {
        dispatch!(self, chip => chip.treble_eq(eq))
    }

    fn set_channel_output(&mut self, index: usize, route: ChannelRoute) {
        dispatch!(self, chip => chip.set_channel_output(index, route))
    }

    fn set_output(&mut self, route: ChannelRoute, buffers: &OutputBuffers) {
        dispatch!(self, chip => chip.set_output(route, buffers))
    }

    fn set_channel_enabled(&mut self, index: usize, enabled: bool) {
        dispatch!(self, chip => chip.set_channel_enabled(index, enabled))
    }

    fn write_register(&mut self, time: i64, addr: u16, data: u8, out: &mut OutputBuffers) {
        dispatch!(self, chip => chip.write_register(time, addr, data, out))
    }

    fn end_frame(&mut self, time: i64, out: &mut OutputBuffers) {
        dispatch!(self, chip => chip.end_frame(time, out))
    }

    fn start_seeking(&mut self) {
        dispatch!(self, chip => chip.start_seeking())
    }

    fn stop_seeking(&mut self, clock: &mut i64, out: &mut OutputBuffers) {
        dispatch!(self, chip => chip.stop_seeking(clock, out))
    }

    fn write_shadow_register(&mut self, addr: u16, data: u8) {
        dispatch!(self, chip => chip.write_shadow_register(addr, data))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blip::BlipBuffer;
    use crate::constants::NTSC_CLOCK_RATE;

    /// Buffers at 44.1 kHz clocked like an NTSC console.
    pub(crate) fn linear_buffers() -> OutputBuffers {
        let mut out = OutputBuffers::new();
        for buf in out.iter_mut() {
            buf.set_sample_rate(44_100).unwrap();
            buf.set_clock_rate(NTSC_CLOCK_RATE);
        }
        out
    }

    /// Sum of absolute deltas in the readable region.
    pub(crate) fn total_energy(buf: &BlipBuffer) -> i64 {
        buf.deltas().iter().map(|&d| i64::from(d).abs()).sum()
    }

    #[test]
    fn test_every_expansion_constructs() {
        for kind in ChipKind::EXPANSIONS {
            let chip = ExpansionChip::new(kind).unwrap();
            assert_eq!(chip.kind(), kind);
            assert_eq!(chip.channel_count(), kind.channel_count());
        }
        assert!(ExpansionChip::new(ChipKind::BaseApu).is_none());
    }

    #[test]
    fn test_fm_accessor() {
        let vrc7 = ExpansionChip::new(ChipKind::Vrc7).unwrap();
        assert_eq!(vrc7.as_fm().map(FmAdapter::variant), Some(FmVariant::Vrc7));
        assert!(ExpansionChip::new(ChipKind::Namco).unwrap().as_fm().is_none());
    }

    #[test]
    fn test_dispatch_routes_writes() {
        let mut out = linear_buffers();
        let mut chip = ExpansionChip::new(ChipKind::Vrc6).unwrap();
        chip.set_output(ChannelRoute::Linear, &out);
        chip.write_register(0, 0x9000, 0x7F, &mut out);
        chip.write_register(0, 0x9001, 0x40, &mut out);
        chip.write_register(0, 0x9002, 0x80, &mut out);
        chip.end_frame(29_780, &mut out);
        out.linear_mut().end_frame(29_780);
        assert!(total_energy(out.linear()) > 0);
    }
}

//! Console timing constants
//!
//! Clock rates, frame lengths and register windows shared by the engine
//! and the chips.

/// NTSC 2A03 CPU clock (Hz)
pub const NTSC_CLOCK_RATE: u32 = 1_789_773;

/// PAL 2A07 CPU clock (Hz)
pub const PAL_CLOCK_RATE: u32 = 1_662_607;

/// Even NTSC frame length in CPU cycles; odd frames are one cycle longer.
pub const NTSC_FRAME_LENGTH: i64 = 29_780;

/// PAL frame length in CPU cycles before dithering.
pub const PAL_FRAME_LENGTH: i64 = 33_247;

/// First base APU register.
pub const APU_START_ADDR: u16 = 0x4000;

/// Last base APU register (frame counter).
pub const APU_END_ADDR: u16 = 0x4017;

/// Cycles inserted before each replayed register write when seeking stops.
pub const SEEK_WRITE_SPACING: i64 = 4;

/// Value the default DMC reader returns (an idle, flat sample).
pub const DMC_IDLE_BYTE: u8 = 0x55;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_lengths_match_clock_rates() {
        // ~60.1 Hz NTSC, ~50.0 Hz PAL
        let ntsc_fps = f64::from(NTSC_CLOCK_RATE) / (NTSC_FRAME_LENGTH as f64 + 0.5);
        let pal_fps = f64::from(PAL_CLOCK_RATE) / PAL_FRAME_LENGTH as f64;
        assert!((ntsc_fps - 60.1).abs() < 0.05);
        assert!((pal_fps - 50.0).abs() < 0.05);
    }

    #[test]
    fn test_apu_window() {
        assert_eq!(APU_END_ADDR - APU_START_ADDR + 1, 0x18);
    }
}

//! Serializable base-APU state

use serde::{Deserialize, Serialize};

/// Pulse channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SquareSnapshot {
    /// Clocks until the next timer event
    pub delay: u16,
    /// Envelope level
    pub env: u8,
    /// Length counter
    pub length: u8,
    /// Duty sequencer position
    pub phase: u8,
    /// Sweep divider
    pub swp_delay: u8,
    /// Envelope divider
    pub env_delay: u8,
}

/// Triangle channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriangleSnapshot {
    /// Clocks until the next timer event
    pub delay: u16,
    /// Length counter
    pub length: u8,
    /// Ramp position
    pub phase: u8,
    /// Linear counter
    pub linear_counter: u8,
    /// Linear counter reload pending
    pub linear_mode: bool,
}

/// Noise channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoiseSnapshot {
    /// Clocks until the next timer event
    pub delay: u16,
    /// Envelope level
    pub env: u8,
    /// Length counter
    pub length: u8,
    /// Envelope divider
    pub env_delay: u8,
    /// LFSR contents
    pub shift_reg: u16,
}

/// DMC state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DmcSnapshot {
    /// Clocks until the next output bit
    pub delay: u16,
    /// Bytes remaining
    pub remain: u16,
    /// Fetch address (offset from $8000)
    pub addr: u16,
    /// Sample buffer
    pub buf: u8,
    /// Bits left in the shift register
    pub bits_remain: u8,
    /// Shift register
    pub bits: u8,
    /// Sample buffer empty
    pub buf_empty: bool,
    /// Output unit silenced
    pub silence: bool,
    /// IRQ pending
    pub irq_flag: bool,
}

/// Complete base-APU state, restorable with
/// [`MixingEngine::load_snapshot`](crate::MixingEngine::load_snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApuSnapshot {
    /// Registers $4000-$4013
    pub w40xx: [u8; 0x14],
    /// Channel enables ($4015)
    pub w4015: u8,
    /// Frame counter mode ($4017)
    pub w4017: u8,
    /// Clocks until the next frame sequencer step
    pub delay: u16,
    /// Frame sequencer step
    pub step: u8,
    /// Frame IRQ pending
    pub irq_flag: bool,
    /// Pulse 1
    pub square1: SquareSnapshot,
    /// Pulse 2
    pub square2: SquareSnapshot,
    /// Triangle
    pub triangle: TriangleSnapshot,
    /// Noise
    pub noise: NoiseSnapshot,
    /// DMC
    pub dmc: DmcSnapshot,
}

//! One FM operator: phase accumulator and envelope generator

use super::patch::OperatorParams;
use super::tables::{attenuation_to_amplitude, log_sin, EG_PATTERNS};

/// Width of the phase accumulator.
pub(crate) const PHASE_BITS: u32 = 19;
const PHASE_MASK: u32 = (1 << PHASE_BITS) - 1;

/// Envelope attenuation of a silent operator (0.375 dB units).
pub(crate) const ENV_MAX: u32 = 127;
const ENV_OFF_THRESHOLD: u32 = 124;

/// Rate used on key-off when the channel sustain bit is set.
const SUSTAIN_RELEASE_RATE: u8 = 5;
/// Rate used on key-off by percussive tones.
const PERCUSSIVE_RELEASE_RATE: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    Release,
    #[default]
    Off,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub phase: u32,
    pub level: u32,
    pub state: EnvelopeState,
    pub key: bool,
    /// Two most recent outputs, for modulator self-feedback
    pub history: [i32; 2],
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            phase: 0,
            level: ENV_MAX,
            state: EnvelopeState::Off,
            key: false,
            history: [0; 2],
        }
    }
}

/// Effective rate (0-63) of a 4-bit rate register.
fn effective_rate(rate: u8, rks: u32) -> u32 {
    if rate == 0 {
        0
    } else {
        (u32::from(rate) * 4 + rks).min(63)
    }
}

/// Envelope step for `rate` at global envelope tick `counter`.
fn envelope_increment(rate: u32, counter: u32) -> u32 {
    if rate == 0 {
        return 0;
    }
    let hi = rate >> 2;
    let lo = (rate & 3) as usize;
    if hi < 12 {
        let shift = 12 - hi;
        if counter & ((1 << shift) - 1) != 0 {
            return 0;
        }
        EG_PATTERNS[lo][((counter >> shift) & 7) as usize]
    } else {
        EG_PATTERNS[lo][(counter & 7) as usize] << (hi - 12)
    }
}

/// Key scale rate from block and F-number.
pub(crate) fn key_scale_rate(op: &OperatorParams, block: u32, fnum: u32) -> u32 {
    let rks = (block << 1) | (fnum >> 8);
    if op.ksr {
        rks
    } else {
        rks >> 2
    }
}

/// Signed 12-bit operator output for a 10-bit phase and attenuation in
/// 0.375 dB units.
pub(crate) fn operator_output(phase10: u32, attenuation: u32, rectify: bool) -> i32 {
    let index = phase10 & 0x3FF;
    let negative = index & 0x200 != 0;
    if negative && rectify {
        return 0;
    }
    let quarter = if index & 0x100 != 0 { !index & 0xFF } else { index & 0xFF };
    let amp = attenuation_to_amplitude(log_sin(quarter as usize) + (attenuation << 4));
    if negative {
        -amp
    } else {
        amp
    }
}

impl Slot {
    pub fn key_on(&mut self) {
        self.key = true;
        self.phase = 0;
        self.state = EnvelopeState::Attack;
    }

    pub fn key_off(&mut self) {
        self.key = false;
        if self.state != EnvelopeState::Off {
            self.state = EnvelopeState::Release;
        }
    }

    pub fn set_key(&mut self, key: bool) {
        match (self.key, key) {
            (false, true) => self.key_on(),
            (true, false) => self.key_off(),
            _ => {}
        }
    }

    #[inline]
    pub fn advance_phase(&mut self, increment: u32) {
        self.phase = (self.phase + increment) & PHASE_MASK;
    }

    /// Top ten bits of the phase.
    #[inline]
    pub fn phase10(&self) -> u32 {
        self.phase >> (PHASE_BITS - 10)
    }

    #[inline]
    pub fn is_off(&self) -> bool {
        self.state == EnvelopeState::Off
    }

    pub fn advance_envelope(&mut self, op: &OperatorParams, rks: u32, channel_sustain: bool, counter: u32) {
        match self.state {
            EnvelopeState::Attack => {
                let rate = effective_rate(op.ar, rks);
                if rate >= 60 {
                    self.level = 0;
                } else {
                    let inc = envelope_increment(rate, counter);
                    if inc != 0 {
                        self.level = self.level.saturating_sub(((self.level * inc) >> 3) + 1);
                    }
                }
                if self.level == 0 {
                    self.state = EnvelopeState::Decay;
                }
            }
            EnvelopeState::Decay => {
                if self.level >= u32::from(op.sl) * 8 {
                    self.state = EnvelopeState::Sustain;
                } else {
                    let inc = envelope_increment(effective_rate(op.dr, rks), counter);
                    self.level = (self.level + inc).min(ENV_MAX);
                }
            }
            EnvelopeState::Sustain => {
                if !op.sustained {
                    self.fall(effective_rate(op.rr, rks), counter);
                }
            }
            EnvelopeState::Release => {
                let rate = if channel_sustain {
                    SUSTAIN_RELEASE_RATE
                } else if op.sustained {
                    op.rr
                } else {
                    PERCUSSIVE_RELEASE_RATE
                };
                self.fall(effective_rate(rate, rks), counter);
            }
            EnvelopeState::Off => {}
        }
    }

    fn fall(&mut self, rate: u32, counter: u32) {
        self.level = (self.level + envelope_increment(rate, counter)).min(ENV_MAX);
        if self.level >= ENV_OFF_THRESHOLD {
            self.level = ENV_MAX;
            self.state = EnvelopeState::Off;
        }
    }
}

//! Instrument patches
//!
//! A patch is 8 bytes, laid out as registers `$00-$07`:
//!
//! | byte | bits |
//! |---|---|
//! | 0, 1 | AM, VIB, EG type, KSR, MULT (modulator, carrier) |
//! | 2 | modulator KSL, TL |
//! | 3 | carrier KSL, carrier rectify, modulator rectify, feedback |
//! | 4, 5 | AR, DR |
//! | 6, 7 | SL, RR |

/// Raw 8-byte instrument.
pub type RawPatch = [u8; 8];

/// Built-in instruments: user slot, 15 melodic, then BD, HH/SD, TOM/CYM.
pub(crate) const YM2413_ROM: [RawPatch; 19] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x71, 0x61, 0x1E, 0x17, 0xD0, 0x78, 0x00, 0x17], // violin
    [0x13, 0x41, 0x1A, 0x0D, 0xD8, 0xF7, 0x23, 0x13], // guitar
    [0x13, 0x01, 0x99, 0x00, 0xF2, 0xC4, 0x11, 0x23], // piano
    [0x31, 0x61, 0x0E, 0x07, 0x98, 0x64, 0x70, 0x27], // flute
    [0x32, 0x21, 0x1E, 0x06, 0xE0, 0x76, 0x00, 0x28], // clarinet
    [0x31, 0x22, 0x16, 0x05, 0xE0, 0x71, 0x00, 0x18], // oboe
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07], // trumpet
    [0x33, 0x21, 0x2D, 0x13, 0xB0, 0x70, 0x00, 0x07], // organ
    [0x61, 0x61, 0x1B, 0x06, 0x64, 0x65, 0x10, 0x17], // horn
    [0x41, 0x61, 0x0B, 0x18, 0x85, 0xF0, 0x81, 0x07], // synthesizer
    [0x33, 0x01, 0x83, 0x11, 0xEA, 0xEF, 0x10, 0x04], // harpsichord
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12], // vibraphone
    [0x61, 0x50, 0x0C, 0x05, 0xD2, 0xF5, 0x40, 0x42], // synth bass
    [0x01, 0x01, 0x55, 0x03, 0xE9, 0x90, 0x03, 0x02], // acoustic bass
    [0x41, 0x41, 0x89, 0x03, 0xF1, 0xE4, 0xC0, 0x13], // electric guitar
    [0x01, 0x01, 0x18, 0x0F, 0xDF, 0xF8, 0x6A, 0x6D], // bass drum
    [0x01, 0x01, 0x00, 0x00, 0xC8, 0xD8, 0xA7, 0x68], // hi-hat / snare
    [0x05, 0x01, 0x00, 0x00, 0xF8, 0xAA, 0x59, 0x55], // tom / cymbal
];

/// VRC7 instrument set (no rhythm section on the chip; the last three are
/// kept so both tables share a layout).
pub(crate) const VRC7_ROM: [RawPatch; 19] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x03, 0x21, 0x05, 0x06, 0xE8, 0x81, 0x42, 0x27],
    [0x13, 0x41, 0x14, 0x0D, 0xD8, 0xF6, 0x23, 0x12],
    [0x11, 0x11, 0x08, 0x08, 0xFA, 0xB2, 0x20, 0x12],
    [0x31, 0x61, 0x0C, 0x07, 0xA8, 0x64, 0x61, 0x27],
    [0x32, 0x21, 0x1E, 0x06, 0xE1, 0x76, 0x01, 0x28],
    [0x02, 0x01, 0x06, 0x00, 0xA3, 0xE2, 0xF4, 0xF4],
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07],
    [0x23, 0x21, 0x22, 0x17, 0xA2, 0x72, 0x01, 0x17],
    [0x35, 0x11, 0x25, 0x00, 0x40, 0x73, 0x72, 0x01],
    [0xB5, 0x01, 0x0F, 0x0F, 0xA8, 0xA5, 0x51, 0x02],
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12],
    [0x71, 0x23, 0x11, 0x06, 0x65, 0x74, 0x18, 0x16],
    [0x01, 0x02, 0xD3, 0x05, 0xC9, 0x95, 0x03, 0x02],
    [0x61, 0x63, 0x0C, 0x00, 0x94, 0xC0, 0x33, 0xF6],
    [0x21, 0x72, 0x0D, 0x00, 0xC1, 0xD5, 0x56, 0x06],
    [0x01, 0x01, 0x18, 0x0F, 0xDF, 0xF8, 0x6A, 0x6D],
    [0x01, 0x01, 0x00, 0x00, 0xC8, 0xD8, 0xA7, 0x68],
    [0x05, 0x01, 0x00, 0x00, 0xF8, 0xAA, 0x59, 0x55],
];

/// Decoded parameters of one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OperatorParams {
    pub am: bool,
    pub vibrato: bool,
    /// Sustained (true) or percussive envelope
    pub sustained: bool,
    pub ksr: bool,
    pub mult: u8,
    pub ksl: u8,
    /// Total level, modulator only
    pub tl: u8,
    /// Negative half-wave is zeroed
    pub rectify: bool,
    pub ar: u8,
    pub dr: u8,
    pub sl: u8,
    pub rr: u8,
}

/// Decoded two-operator instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Patch {
    pub modulator: OperatorParams,
    pub carrier: OperatorParams,
    pub feedback: u8,
}

impl Patch {
    pub fn decode(raw: &RawPatch) -> Self {
        let op = |flags: u8, ad: u8, sr: u8| OperatorParams {
            am: flags & 0x80 != 0,
            vibrato: flags & 0x40 != 0,
            sustained: flags & 0x20 != 0,
            ksr: flags & 0x10 != 0,
            mult: flags & 0x0F,
            ar: ad >> 4,
            dr: ad & 0x0F,
            sl: sr >> 4,
            rr: sr & 0x0F,
            ..OperatorParams::default()
        };

        let mut modulator = op(raw[0], raw[4], raw[6]);
        modulator.ksl = raw[2] >> 6;
        modulator.tl = raw[2] & 0x3F;
        modulator.rectify = raw[3] & 0x08 != 0;

        let mut carrier = op(raw[1], raw[5], raw[7]);
        carrier.ksl = raw[3] >> 6;
        carrier.rectify = raw[3] & 0x10 != 0;

        Self {
            modulator,
            carrier,
            feedback: raw[3] & 0x07,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_piano() {
        let patch = Patch::decode(&YM2413_ROM[3]);
        assert_eq!(patch.modulator.mult, 3);
        assert!(patch.modulator.ksr);
        assert_eq!(patch.modulator.ksl, 2);
        assert_eq!(patch.modulator.tl, 0x19);
        assert_eq!(patch.carrier.mult, 1);
        assert_eq!(patch.feedback, 0);
        assert_eq!(patch.modulator.ar, 0xF);
        assert_eq!(patch.carrier.sl, 2);
        assert_eq!(patch.carrier.rr, 3);
    }

    #[test]
    fn test_decode_rectify_and_feedback() {
        let patch = Patch::decode(&[0, 0, 0, 0x1F, 0, 0, 0, 0]);
        assert!(patch.carrier.rectify);
        assert!(patch.modulator.rectify);
        assert_eq!(patch.feedback, 7);
    }
}

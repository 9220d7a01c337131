//! Lookup tables for the FM core

use std::array;
use std::sync::LazyLock;

/// Frequency multiplier per MULT value, doubled so 0 means one half.
pub(crate) const MULTIPLIER: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Envelope increment patterns, selected by the two low bits of the rate.
pub(crate) const EG_PATTERNS: [[u32; 8]; 4] = [
    [0, 1, 0, 1, 0, 1, 0, 1],
    [0, 1, 0, 1, 1, 1, 0, 1],
    [0, 1, 1, 1, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 1],
];

/// Vibrato offsets (in 1/256 of the F-number) over the eight PM steps.
pub(crate) const PM_STEPS: [i32; 8] = [0, 1, 2, 1, 0, -1, -2, -1];

/// Attenuation of the quarter sine in 4.8 fixed-point log2 units.
pub(crate) fn log_sin(index: usize) -> u32 {
    static LOG_SIN_TABLE: LazyLock<[u16; 256]> = LazyLock::new(|| {
        array::from_fn(|i| {
            use std::f64::consts::PI;
            // offset by half a step to avoid log2(0)
            let n = ((i << 1) | 1) as f64;
            let sine = (n / 512.0 * PI / 2.0).sin();
            (-sine.log2() * f64::from(1 << 8)).round() as u16
        })
    });

    u32::from(LOG_SIN_TABLE[index & 0xFF])
}

/// Convert a 4.8 fixed-point log2 attenuation to a 12-bit amplitude.
pub(crate) fn attenuation_to_amplitude(attenuation: u32) -> i32 {
    static POW2_TABLE: LazyLock<[u16; 256]> = LazyLock::new(|| {
        array::from_fn(|i| {
            let n = ((i + 1) as f64) / 256.0;
            (2.0_f64.powf(-n) * f64::from(1 << 11)).round() as u16
        })
    });

    let int_part = attenuation >> 8;
    if int_part >= 12 {
        return 0;
    }
    let fract = POW2_TABLE[(attenuation & 0xFF) as usize];
    (i32::from(fract) << 1) >> int_part
}

/// Key scale attenuation (0.375 dB units at 6 dB/octave) by block and the
/// top four F-number bits.
pub(crate) fn key_scale_level(block: u32, fnum: u32) -> u32 {
    static KSL_TABLE: LazyLock<[[u8; 16]; 8]> = LazyLock::new(|| {
        const BASE_DB: [f64; 16] = [
            0.000, 9.000, 12.000, 13.875, 15.000, 16.125, 16.875, 17.625, 18.000, 18.750, 19.125,
            19.500, 19.875, 20.250, 20.625, 21.000,
        ];
        array::from_fn(|block| {
            array::from_fn(|f| {
                let db = BASE_DB[f] - 3.0 * (7 - block) as f64;
                if db <= 0.0 {
                    0
                } else {
                    (db / 0.375) as u8
                }
            })
        })
    });

    u32::from(KSL_TABLE[(block & 7) as usize][((fnum >> 5) & 15) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sin_peak_is_zero_attenuation() {
        assert_eq!(log_sin(255), 0);
        assert!(log_sin(0) > log_sin(128));
    }

    #[test]
    fn test_amplitude_range() {
        let peak = attenuation_to_amplitude(0);
        assert!((4000..=4096).contains(&peak));
        assert_eq!(attenuation_to_amplitude(12 << 8), 0);
        // 6 dB is one octave on the log2 scale
        assert_eq!(attenuation_to_amplitude(1 << 8), peak >> 1);
    }

    #[test]
    fn test_key_scale_grows_with_pitch() {
        assert_eq!(key_scale_level(0, 0x1FF), 0);
        assert!(key_scale_level(7, 0x1FF) > key_scale_level(7, 0x100));
        assert_eq!(key_scale_level(7, 0x1FF), 56);
    }
}

//! Resistor-network mixing of the triangle/noise/DMC group
//!
//! TND buffers hold deltas in the blip fixed-point format. Integrated, a
//! level unpacks to the ladder input `(3*tri + 2*noise + dmc) / 202`, which
//! the console's DAC turns into an output level non-linearly.

use crate::blip::DELTA_EXTRA_BITS;

/// Blip fixed-point units per unit of unpacked level.
const SAMPLE_SCALE_INV: f64 = (1u32 << DELTA_EXTRA_BITS) as f64 * 65535.0;

/// Largest ladder input: 3 * 15 + 2 * 15 + 127.
pub const TND_SCALE: f32 = 202.0;

/// Smallest unpacked level, keeping the mix ratio finite.
pub const UNPACK_FLOOR: f32 = 0.00001;

/// Integrated buffer level to ladder input.
#[inline]
pub fn unpack_sample(raw: i64) -> f32 {
    ((raw as f64 / SAMPLE_SCALE_INV) as f32).max(UNPACK_FLOOR)
}

/// Level back to buffer fixed point (truncating).
#[inline]
pub fn pack_sample(level: f32) -> i64 {
    (f64::from(level) * SAMPLE_SCALE_INV) as i64
}

/// DAC transfer function of the TND group.
#[inline]
pub fn nonlinearize(level: f32) -> f32 {
    163.67 / (24329.0 / (level * TND_SCALE) + 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_scale_output() {
        // all channels at maximum
        assert_relative_eq!(nonlinearize(1.0), 0.742_467_6, epsilon = 1e-5);
    }

    #[test]
    fn test_unpack_floor() {
        assert_eq!(unpack_sample(0), UNPACK_FLOOR);
        assert_eq!(unpack_sample(-1000), UNPACK_FLOOR);
    }

    #[test]
    fn test_pack_unpack_agree() {
        let raw = pack_sample(0.25);
        assert_relative_eq!(unpack_sample(raw), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_ratio_redistribution_sums_to_mix() {
        let levels = [45.0 / 202.0, 30.0 / 202.0, 64.0 / 202.0];
        let sum: f32 = levels.iter().sum();
        let ratio = nonlinearize(sum) / sum;
        let parts: f32 = levels.iter().map(|l| l * ratio).sum();
        assert_relative_eq!(parts, nonlinearize(sum), max_relative = 1e-5);
    }

    #[test]
    fn test_compresses_loud_levels() {
        let quiet = nonlinearize(0.05) / 0.05;
        let loud = nonlinearize(0.9) / 0.9;
        assert!(loud < quiet);
    }
}

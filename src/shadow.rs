//! Shadow registers for timeline seeking
//!
//! While the host seeks, chips record only the last value written to each
//! logical register. When seeking stops the touched registers are replayed as
//! ordinary writes, spaced [`SEEK_WRITE_SPACING`] cycles apart.

use crate::constants::SEEK_WRITE_SPACING;

/// Fixed-size store of optional register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRegisters<const N: usize> {
    values: [Option<u8>; N],
}

impl<const N: usize> ShadowRegisters<N> {
    /// Store with every register unset.
    pub const fn new() -> Self {
        Self { values: [None; N] }
    }

    /// Mark every register unset.
    pub fn clear(&mut self) {
        self.values = [None; N];
    }

    /// Record `value` for register `index`; out-of-range indices are ignored.
    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Shadowed value of register `index`.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.values.get(index).copied().flatten()
    }

    /// Touched registers in index order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
    }

    /// Number of touched registers.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Replay every touched register through `write`, advancing `clock` by
    /// the seek spacing before each call.
    pub fn replay(&self, clock: &mut i64, mut write: impl FnMut(i64, usize, u8)) {
        for (index, value) in self.entries() {
            *clock += SEEK_WRITE_SPACING;
            write(*clock, index, value);
        }
    }
}

impl<const N: usize> Default for ShadowRegisters<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut shadow = ShadowRegisters::<4>::new();
        shadow.set(1, 0x10);
        shadow.set(1, 0x20);
        shadow.set(9, 0xFF);
        assert_eq!(shadow.get(1), Some(0x20));
        assert_eq!(shadow.len(), 1);
    }

    #[test]
    fn test_replay_spacing_and_order() {
        let mut shadow = ShadowRegisters::<8>::new();
        shadow.set(5, 1);
        shadow.set(2, 2);
        let mut clock = 100;
        let mut seen = Vec::new();
        shadow.replay(&mut clock, |t, i, v| seen.push((t, i, v)));
        assert_eq!(seen, vec![(104, 2, 2), (108, 5, 1)]);
        assert_eq!(clock, 108);
    }

    #[test]
    fn test_clear_resets_to_unset() {
        let mut shadow = ShadowRegisters::<2>::new();
        shadow.set(0, 0);
        assert!(!shadow.is_empty());
        shadow.clear();
        assert!(shadow.is_empty());
    }
}

/// Number of bits in each half of a [`PackedCounter`].
pub const HALF_BITS: u32 = u64::BITS / 2;
const LOWER_MASK: u64 = (1 << HALF_BITS) - 1;

const _: () = assert!(HALF_BITS * 2 == u64::BITS);

/// Two per-line counters packed into a single word.
///
/// The upper half counts every occurrence of a line in a captured stack, the
/// lower half counts the occurrences where the line belonged to the innermost
/// frame. A single addition updates both, so the sampling path needs one map
/// lookup per (frame, line) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackedCounter(u64);

impl PackedCounter {
    /// The line was traversed somewhere in the stack.
    pub const fn generic() -> Self {
        Self(1 << HALF_BITS)
    }

    /// The line belongs to the innermost (executing) frame.
    pub const fn top() -> Self {
        Self((1 << HALF_BITS) + 1)
    }

    pub const fn encode(total: u32, weighted: u32) -> Self {
        Self(((total as u64) << HALF_BITS) | weighted as u64)
    }

    /// Returns `(total, weighted)`.
    pub const fn decode(self) -> (u32, u32) {
        ((self.0 >> HALF_BITS) as u32, (self.0 & LOWER_MASK) as u32)
    }

    /// Adds `increment` half by half.
    ///
    /// Each half saturates on its own, so the lower half never carries into
    /// the upper one even in pathologically long sessions.
    pub fn merge(self, increment: Self) -> Self {
        let (total, weighted) = self.decode();
        let (inc_total, inc_weighted) = increment.decode();
        Self::encode(
            total.saturating_add(inc_total),
            weighted.saturating_add(inc_weighted),
        )
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increments() {
        assert_eq!(PackedCounter::generic().decode(), (1, 0));
        assert_eq!(PackedCounter::top().decode(), (1, 1));
    }

    #[test]
    fn test_encode_decode() {
        for (total, weighted) in [(0, 0), (1, 0), (7, 3), (u32::MAX, 0), (u32::MAX, u32::MAX)] {
            assert_eq!(PackedCounter::encode(total, weighted).decode(), (total, weighted));
        }
    }

    #[test]
    fn test_merge_is_plain_addition_within_bounds() {
        let merged = PackedCounter::generic().merge(PackedCounter::top());
        assert_eq!(
            merged.as_raw(),
            PackedCounter::generic().as_raw() + PackedCounter::top().as_raw()
        );
    }

    #[test]
    fn test_merge_sequence() {
        let mut counter = PackedCounter::top();
        for i in 0..100 {
            let increment = if i % 4 == 0 { PackedCounter::top() } else { PackedCounter::generic() };
            counter = counter.merge(increment);
        }
        // 1 initial top + 25 tops + 75 generics
        assert_eq!(counter.decode(), (101, 26));
    }

    #[test]
    fn test_merge_does_not_carry() {
        let full = PackedCounter::encode(5, u32::MAX);
        assert_eq!(full.merge(PackedCounter::top()).decode(), (6, u32::MAX));

        let full = PackedCounter::encode(u32::MAX, 2);
        assert_eq!(full.merge(PackedCounter::top()).decode(), (u32::MAX, 3));
    }
}

//! Log-scale histogram for observation tracking.
//!
//! This module provides a fixed-bucket histogram whose bucket boundaries
//! grow geometrically, so every bucket midpoint lies within roughly 5% of
//! the values it stands for. Percentiles, minimum and maximum are estimates
//! at that resolution, not exact values.

use std::fmt;

/// Upper (exclusive) bucket boundaries.
///
/// Bucket `i` covers `[BUCKET_OFFSETS[i - 1], BUCKET_OFFSETS[i])`, bucket 0
/// covers `[0, 1)`, and one extra overflow bucket holds everything from the
/// last boundary upward.
pub const BUCKET_OFFSETS: [u64; 126] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 13, 14, 15, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50,
    55, 61, 67, 74, 82, 91, 100, 111, 122, 135, 150, 165, 183, 202, 223, 246, 272, 301, 332,
    367, 406, 449, 496, 548, 606, 669, 740, 817, 903, 999, 1104, 1220, 1348, 1490, 1647, 1820,
    2011, 2223, 2457, 2716, 3001, 3317, 3666, 4052, 4479, 4950, 5471, 6047, 6684, 7387, 8165,
    9024, 9974, 11024, 12184, 13467, 14884, 16451, 18182, 20096, 22212, 24550, 27134, 29990,
    33147, 36636, 40492, 44754, 49465, 54672, 60427, 66787, 73818, 81588, 90176, 99668, 110160,
    121755, 134572, 148737, 164393, 181698, 200824, 221963, 245328, 271152, 299694, 331240,
    366108, 404645, 447240, 494317, 546351, 603861, 667426, 737681, 815331, 901156, 996014,
    1100858,
];

/// Number of buckets including the overflow bucket.
pub const NUM_BUCKETS: usize = BUCKET_OFFSETS.len() + 1;

/// Value reported when an estimate falls into the overflow bucket.
pub const OVERFLOW_SENTINEL: u64 = u64::MAX;

/// Fixed-bucket histogram.
///
/// Counts are signed because [`Histogram::minus`] does not validate that its
/// operands are in before/after order. The histogram has no internal
/// synchronization; shared use goes through [`HistogramMetric`].
///
/// [`HistogramMetric`]: super::HistogramMetric
#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    /// Counts per bucket, the last entry being the overflow bucket.
    buckets: [i64; NUM_BUCKETS],
    /// Total count of observations.
    count: i64,
    /// Sum of all raw observed values.
    sum: i64,
}

impl Histogram {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self {
            buckets: [0; NUM_BUCKETS],
            count: 0,
            sum: 0,
        }
    }

    /// Build a histogram from a sequence of values.
    pub fn from_values(values: impl IntoIterator<Item = u64>) -> Self {
        let mut hist = Self::new();
        for value in values {
            hist.add(value);
        }
        hist
    }

    /// Index of the bucket a value falls into.
    ///
    /// A value equal to a boundary belongs to the next bucket, since
    /// boundaries are exclusive upper bounds.
    pub fn bucket_index(value: u64) -> usize {
        BUCKET_OFFSETS.partition_point(|&boundary| boundary <= value)
    }

    /// Record a value and return the new observation count.
    pub fn add(&mut self, value: u64) -> i64 {
        self.sum = self.sum.wrapping_add(value as i64);
        self.add_to_bucket(Self::bucket_index(value))
    }

    fn add_to_bucket(&mut self, index: usize) -> i64 {
        self.buckets[index] += 1;
        self.count += 1;
        self.count
    }

    /// Get the total count of observations.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Get the sum of all observed values.
    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Check whether no observations are recorded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get a copy of all bucket counts, overflow bucket last.
    pub fn buckets(&self) -> Vec<i64> {
        self.buckets.to_vec()
    }

    /// Reset all counts to zero.
    pub fn clear(&mut self) {
        self.buckets = [0; NUM_BUCKETS];
        self.count = 0;
        self.sum = 0;
    }

    /// Get an approximate percentile (e.g., 0.50 for P50, 0.99 for P99).
    ///
    /// Returns the midpoint of the bucket holding the target rank, `0` for an
    /// empty histogram and [`OVERFLOW_SENTINEL`] when the rank lands in the
    /// overflow bucket. `p == 0.0` is the minimum.
    pub fn percentile(&self, p: f64) -> u64 {
        if p == 0.0 {
            return self.minimum();
        }

        let target = p * self.count as f64;
        let mut total = 0i64;
        let mut index = 0usize;

        while (total as f64) < target && index < NUM_BUCKETS {
            total += self.buckets[index];
            index += 1;
        }

        if index == 0 {
            0
        } else {
            Self::midpoint(index - 1)
        }
    }

    /// Get the approximate maximum observed value.
    pub fn maximum(&self) -> u64 {
        if self.buckets[NUM_BUCKETS - 1] > 0 {
            return OVERFLOW_SENTINEL;
        }
        if self.count == 0 {
            return 0;
        }
        self.buckets[..BUCKET_OFFSETS.len()]
            .iter()
            .rposition(|&count| count != 0)
            .map_or(0, Self::midpoint)
    }

    /// Get the approximate minimum observed value.
    pub fn minimum(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        self.buckets[..BUCKET_OFFSETS.len()]
            .iter()
            .position(|&count| count != 0)
            .map_or(OVERFLOW_SENTINEL, Self::midpoint)
    }

    /// Midpoint of a bucket.
    fn midpoint(index: usize) -> u64 {
        if index == 0 {
            0
        } else if index >= BUCKET_OFFSETS.len() {
            OVERFLOW_SENTINEL
        } else {
            (BUCKET_OFFSETS[index - 1] + BUCKET_OFFSETS[index] - 1) / 2
        }
    }

    /// Add another histogram's observations into this one.
    pub fn merge(&mut self, other: &Histogram) {
        if other.count == 0 {
            return;
        }
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
        self.count += other.count;
        self.sum = self.sum.wrapping_add(other.sum);
    }

    /// Subtract another histogram from this one, producing a new histogram.
    ///
    /// Bucket counts may go negative when `other` is not an earlier state of
    /// `self`.
    pub fn minus(&self, other: &Histogram) -> Histogram {
        let mut rv = Histogram::new();
        for (i, slot) in rv.buckets.iter_mut().enumerate() {
            *slot = self.buckets[i] - other.buckets[i];
        }
        rv.count = self.count - other.count;
        rv.sum = self.sum.wrapping_sub(other.sum);
        rv
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Histogram count={} sum={}", self.count, self.sum)?;
        for (i, &count) in self.buckets.iter().enumerate() {
            if count == 0 {
                continue;
            }
            match BUCKET_OFFSETS.get(i) {
                Some(boundary) => write!(f, " <{}={}", boundary, count)?,
                None => write!(f, " inf={}", count)?,
            }
        }
        write!(f, " />")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_add() {
        let mut hist = Histogram::new();
        assert_eq!(hist.add(50), 1);
        assert_eq!(hist.add(200), 2);
        assert_eq!(hist.add(1500), 3);

        assert_eq!(hist.count(), 3);
        assert_eq!(hist.sum(), 50 + 200 + 1500);
    }

    #[test]
    fn test_count_matches_bucket_total() {
        let values: Vec<u64> = (0..5000).map(|i| (i * 7919) % 2_000_000).collect();
        let hist = Histogram::from_values(values.iter().copied());

        assert_eq!(hist.count(), values.len() as i64);
        assert_eq!(hist.sum(), values.iter().sum::<u64>() as i64);
        assert_eq!(hist.buckets().iter().sum::<i64>(), hist.count());
    }

    #[test]
    fn test_bucket_index_boundaries() {
        assert_eq!(Histogram::bucket_index(0), 0);
        // Exactly on a boundary goes to the next bucket.
        assert_eq!(Histogram::bucket_index(1), 1);
        assert_eq!(Histogram::bucket_index(10), 10);
        assert_eq!(Histogram::bucket_index(11), 10);
        assert_eq!(Histogram::bucket_index(12), 11);
        assert_eq!(Histogram::bucket_index(1_100_857), BUCKET_OFFSETS.len() - 1);
        assert_eq!(Histogram::bucket_index(1_100_858), BUCKET_OFFSETS.len());
        assert_eq!(Histogram::bucket_index(u64::MAX), BUCKET_OFFSETS.len());
    }

    #[test]
    fn test_bucket_index_monotonic() {
        let mut last = 0;
        for value in 0..1_200_000u64 {
            let index = Histogram::bucket_index(value);
            assert!(index >= last, "index decreased at {}", value);
            last = index;
        }
    }

    #[test]
    fn test_boundaries_increasing() {
        assert!(BUCKET_OFFSETS.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_percentile_median() {
        let hist = Histogram::from_values(1..=100);
        let p50 = hist.percentile(0.5);
        // The true median sits in the [50, 55) bucket.
        assert!((50..55).contains(&p50), "p50 was {}", p50);
        assert_eq!(Histogram::bucket_index(p50), Histogram::bucket_index(50));
    }

    #[test]
    fn test_percentile_empty() {
        let hist = Histogram::new();
        assert_eq!(hist.percentile(0.0), 0);
        assert_eq!(hist.percentile(0.5), 0);
        assert_eq!(hist.percentile(0.99), 0);
        assert_eq!(hist.minimum(), 0);
        assert_eq!(hist.maximum(), 0);
    }

    #[test]
    fn test_percentile_overflow() {
        let mut hist = Histogram::new();
        hist.add(10);
        hist.add(5_000_000);

        assert_eq!(hist.percentile(0.99), OVERFLOW_SENTINEL);
        assert_eq!(hist.maximum(), OVERFLOW_SENTINEL);
        assert_eq!(hist.minimum(), 10);
    }

    #[test]
    fn test_minimum_overflow_only() {
        let hist = Histogram::from_values([2_000_000, 3_000_000]);
        assert_eq!(hist.minimum(), OVERFLOW_SENTINEL);
        assert_eq!(hist.percentile(0.0), OVERFLOW_SENTINEL);
    }

    #[test]
    fn test_min_max_midpoints() {
        let hist = Histogram::from_values([100, 5000, 1000]);
        // 100 lies in [100, 111), 5000 in [4950, 5471).
        assert_eq!(hist.minimum(), 105);
        assert_eq!(hist.maximum(), 5210);
    }

    #[test]
    fn test_zero_values() {
        let hist = Histogram::from_values([0, 0, 0]);
        assert_eq!(hist.count(), 3);
        assert_eq!(hist.maximum(), 0);
        assert_eq!(hist.percentile(0.5), 0);
    }

    #[test]
    fn test_merge() {
        let a = Histogram::from_values([1, 5, 50]);
        let b = Histogram::from_values([5, 500, 5_000_000]);
        let c = Histogram::from_values([77]);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.count(), 6);
        assert_eq!(ab.sum(), a.sum() + b.sum());

        let mut ab_c = ab.clone();
        ab_c.merge(&c);
        let mut bc = b.clone();
        bc.merge(&c);
        let mut a_bc = a.clone();
        a_bc.merge(&bc);
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn test_merge_empty_is_noop() {
        let mut hist = Histogram::from_values([3, 4]);
        let before = hist.clone();
        hist.merge(&Histogram::new());
        assert_eq!(hist, before);
    }

    #[test]
    fn test_minus_self_is_empty() {
        let hist = Histogram::from_values([1, 99, 12_345, 9_999_999]);
        let diff = hist.minus(&hist);
        assert_eq!(diff, Histogram::new());
        assert_eq!(diff.count(), 0);
        assert_eq!(diff.sum(), 0);
    }

    #[test]
    fn test_minus_before_after() {
        let before = Histogram::from_values([10, 20]);
        let mut after = before.clone();
        after.add(30);
        after.add(40);

        let delta = after.minus(&before);
        assert_eq!(delta, Histogram::from_values([30, 40]));
    }

    #[test]
    fn test_minus_reversed_goes_negative() {
        let small = Histogram::from_values([10]);
        let large = Histogram::from_values([10, 10]);
        let diff = small.minus(&large);
        assert_eq!(diff.count(), -1);
        assert_eq!(diff.buckets()[Histogram::bucket_index(10)], -1);
    }

    #[test]
    fn test_clear() {
        let mut hist = Histogram::from_values([1000, 2000]);
        assert_eq!(hist.count(), 2);

        hist.clear();

        assert_eq!(hist.count(), 0);
        assert_eq!(hist.sum(), 0);
        assert!(hist.buckets().iter().all(|&count| count == 0));
    }

    #[test]
    fn test_display_lists_non_empty_buckets() {
        let hist = Histogram::from_values([0, 2_000_000]);
        assert_eq!(hist.to_string(), "<Histogram count=2 sum=2000000 <1=1 inf=1 />");
    }
}

//! Sub-carrier sets and the carrier matching / reservation sizing
//! policies used during the RTS/CTS handshake.

use core::fmt;

use crate::{Ts, MAX_CARRIERS};

/// A set of sub-carrier indices, bit-packed into one word.
///
/// Replaces the index-array-with-`-1`-sentinels representation common
/// in simulator code; set operations make the sentinel unnecessary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CarrierSet(u64);

impl CarrierSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The first `count` carriers, all present.
    pub fn all(count: usize) -> Self {
        debug_assert!(count <= MAX_CARRIERS);
        if count >= MAX_CARRIERS {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub fn insert(&mut self, carrier: usize) {
        if carrier < MAX_CARRIERS {
            self.0 |= 1 << carrier;
        }
    }

    pub fn remove(&mut self, carrier: usize) {
        if carrier < MAX_CARRIERS {
            self.0 &= !(1 << carrier);
        }
    }

    pub fn contains(&self, carrier: usize) -> bool {
        carrier < MAX_CARRIERS && self.0 & (1 << carrier) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Keep only the `max` lowest-indexed carriers.
    pub fn truncate(self, max: usize) -> Self {
        let mut out = Self::empty();
        for (n, carrier) in self.iter().enumerate() {
            if n >= max {
                break;
            }
            out.insert(carrier);
        }
        out
    }

    /// Carrier indices in ascending order.
    pub fn iter(&self) -> Bits {
        Bits(self.0)
    }
}

impl core::iter::FromIterator<usize> for CarrierSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::empty();
        for c in iter {
            set.insert(c);
        }
        set
    }
}

impl fmt::Display for CarrierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (n, c) in self.iter().enumerate() {
            if n > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "}}")
    }
}

/// Ascending iterator over set bits
pub struct Bits(u64);

impl Iterator for Bits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let idx = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(idx)
    }
}

/// Intersect the requester's and responder's free-carrier sets,
/// keeping at most `max_count` carriers.
///
/// Tie-break policy: first match by ascending index wins. This gives
/// no fairness guarantee across competing peers; it is the observed
/// protocol behaviour, kept as an explicit policy function.
pub fn match_carriers(mine: CarrierSet, theirs: CarrierSet, max_count: usize) -> CarrierSet {
    mine.intersection(theirs).truncate(max_count)
}

/// Time needed to move `bytes` over `matched` parallel carriers at
/// `bitrate_per_carrier` bits/s, plus the ACK exchange overhead when
/// the protocol runs in acknowledged mode (zero otherwise).
pub fn reservation_duration(
    bytes: u32,
    matched: usize,
    bitrate_per_carrier: f64,
    ack_overhead: Ts,
) -> Ts {
    if matched == 0 {
        return 0;
    }
    let secs = (8 * bytes) as f64 / (matched as f64 * bitrate_per_carrier);
    (secs * 1_000_000.0) as Ts + ack_overhead
}

/// Traffic priority of a node, used by the carrier-share policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    High,
}

/// Number of data carriers a node of the given priority may claim.
///
/// High priority gets an even share of the data band; low priority
/// deliberately takes three times that share (low-priority traffic is
/// expected to be sparse, so over-allocating it costs little). Kept as
/// a named policy rather than an inlined factor.
pub fn carrier_share(priority: Priority, data_carriers: usize, node_count: usize) -> usize {
    let even = data_carriers / node_count.max(1);
    match priority {
        Priority::High => even,
        Priority::Low => 3 * even,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_basics() {
        let mut set = CarrierSet::empty();
        assert!(set.is_empty());

        set.insert(0);
        set.insert(5);
        set.insert(5);
        assert_eq!(set.len(), 2);
        assert!(set.contains(5));
        assert!(!set.contains(3));

        set.remove(5);
        assert!(!set.contains(5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn iter_is_ascending() {
        let set: CarrierSet = [7usize, 2, 12, 3].iter().copied().collect();
        let order: std::vec::Vec<usize> = set.iter().collect();
        assert_eq!(order, [2, 3, 7, 12]);
    }

    #[test]
    fn match_stops_at_max_count() {
        let mine: CarrierSet = [0usize, 1, 2, 3, 4, 5].iter().copied().collect();
        let theirs: CarrierSet = [1usize, 2, 3, 4, 5, 6].iter().copied().collect();

        let matched = match_carriers(mine, theirs, 3);
        let order: std::vec::Vec<usize> = matched.iter().collect();

        // First three matches by ascending index
        assert_eq!(order, [1, 2, 3]);
    }

    #[test]
    fn match_disjoint_sets_is_empty() {
        let mine: CarrierSet = [0usize, 2, 4].iter().copied().collect();
        let theirs: CarrierSet = [1usize, 3, 5].iter().copied().collect();
        assert!(match_carriers(mine, theirs, 8).is_empty());
    }

    #[test]
    fn partial_match_shrinks_reservation() {
        // 3 of 5 free carriers match: duration reflects the reduced
        // parallelism compared to a full match.
        let mine = CarrierSet::all(5);
        let theirs: CarrierSet = [0usize, 2, 4, 7, 9].iter().copied().collect();

        let matched = match_carriers(mine, theirs, 5);
        assert_eq!(matched.len(), 3);

        let full = reservation_duration(1200, 5, 2000.0, 0);
        let partial = reservation_duration(1200, matched.len(), 2000.0, 0);
        assert!(partial > full);
        // 8*1200/(3*2000) s = 1.6 s
        assert_eq!(partial, 1_600_000);
    }

    #[test]
    fn ack_overhead_only_added_when_requested() {
        let without = reservation_duration(500, 4, 1000.0, 0);
        let with = reservation_duration(500, 4, 1000.0, 70_000);
        assert_eq!(with, without + 70_000);
    }

    #[test]
    fn low_priority_takes_triple_share() {
        assert_eq!(carrier_share(Priority::High, 20, 4), 5);
        assert_eq!(carrier_share(Priority::Low, 20, 4), 15);
        // Degenerate node count does not divide by zero
        assert_eq!(carrier_share(Priority::High, 20, 0), 20);
    }
}

//! The open-addressing engine shared by the hash containers.
//!
//! [`RobinHoodTable`] only stores handles. The containers keep their keys and
//! values in an arena and use the table to map hashes to arena indices.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::error::Error;
use crate::error::Result;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bucket<T> {
    hash: u64,
    /// Probe steps from `hash % slots` to the slot holding this bucket.
    dist: usize,
    value: T,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot<T> {
    Empty,
    /// A removed bucket. Probes walk past it, inserts may reuse it.
    Tombstone,
    Occupied(Bucket<T>),
}

/// Debug statistics about probe distances.
///
/// Compiled with `cfg(test)` or the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeStats {
    /// Number of live buckets.
    pub populated: usize,
    /// Total number of slots.
    pub slots: usize,
    /// Number of tombstoned slots.
    pub tombstones: usize,
    /// Largest distance of any live bucket from its home slot.
    pub max_distance: usize,
    /// Mean distance of live buckets from their home slots.
    pub mean_distance: f64,
    /// `histogram[d]` is the number of live buckets at distance `d`.
    pub histogram: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeStats {
    /// Pretty-print the statistics, including a horizontal histogram.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Robin Hood Probe Statistics ===");
        println!(
            "Population: {}/{} slots ({} tombstones)",
            self.populated, self.slots, self.tombstones
        );
        println!(
            "Distance: max {}, mean {:.3}",
            self.max_distance, self.mean_distance
        );

        let widest = self.histogram.iter().copied().max().unwrap_or(0);
        if widest == 0 {
            println!("distance histogram: empty");
            return;
        }

        for (dist, count) in self.histogram.iter().enumerate() {
            let bar = (count * 60).div_ceil(widest);
            println!("{dist:>4} | {:<60} {count}", "█".repeat(bar));
        }
    }
}

/// An open-addressing hash table using Robin Hood probing.
///
/// `RobinHoodTable<T>` stores small `Copy` handles (typically indices into
/// an arena) and leaves hashing and equality to the caller, in the same
/// manner as a raw hash table: every operation takes the precomputed hash and
/// a predicate over stored values.
///
/// Collisions are resolved by linear probing. While walking the probe
/// sequence, an incoming bucket that is strictly farther from its home slot
/// than the resident takes the resident's slot and the resident continues
/// down the sequence. Ties favour the resident, so buckets sharing a home
/// slot keep their insertion order.
///
/// Removal leaves a tombstone instead of shifting buckets back. Lookups walk
/// past tombstones and stop at the first empty slot; inserts reuse them.
///
/// The table never grows by itself. Owners decide when to [`rehash`] based
/// on their load factor, which also guarantees there is always a free slot.
///
/// [`rehash`]: RobinHoodTable::rehash
///
/// ## Example
///
/// ```rust
/// use robin_heap::robin_hood::RobinHoodTable;
///
/// let mut table = RobinHoodTable::with_slots(53).unwrap();
///
/// // Two handles sharing home slot 7.
/// let first = table.insert(7, 100u32, |_, _| {}).unwrap();
/// let second = table.insert(7, 200u32, |_, _| {}).unwrap();
/// assert_eq!((first, second), (7, 8));
///
/// assert_eq!(table.find(7, |&v| v == 200), Some(8));
/// assert_eq!(table.remove(7), Some(100));
///
/// // The tombstone left at slot 7 does not hide the second handle.
/// assert_eq!(table.find(7, |&v| v == 200), Some(8));
/// ```
#[derive(Clone)]
pub struct RobinHoodTable<T> {
    slots: Vec<Slot<T>>,
    populated: usize,
    tombstones: usize,
}

impl<T> Debug for RobinHoodTable<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;

        f.debug_struct("RobinHoodTable")
            .field(
                "slots",
                &self
                    .slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Empty => "..".to_string(),
                        Slot::Tombstone => "xx".to_string(),
                        Slot::Occupied(b) => format!("{:?}+{}", b.value, b.dist),
                    })
                    .collect::<Vec<String>>()
                    .join(", "),
            )
            .field("populated", &self.populated)
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

impl<T> RobinHoodTable<T>
where
    T: Copy,
{
    /// Creates a table with exactly `slots` slots, all empty.
    ///
    /// Returns [`Error::Invalid`] for zero slots and [`Error::Alloc`] if the
    /// slot array cannot be allocated.
    pub fn with_slots(slots: usize) -> Result<Self> {
        if slots == 0 {
            return Err(Error::Invalid);
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(slots)
            .map_err(|_| Error::Alloc)?;
        buffer.resize(slots, Slot::Empty);

        Ok(Self {
            slots: buffer,
            populated: 0,
            tombstones: 0,
        })
    }

    /// Returns the number of slots.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of live buckets.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live buckets.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of tombstoned slots.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Returns `true` if live buckets and tombstones together reach
    /// `load_factor` of the slots.
    pub fn is_saturated(&self, load_factor: f64) -> bool {
        (self.populated + self.tombstones) as f64 >= self.slots.len() as f64 * load_factor
    }

    #[inline(always)]
    fn home(&self, hash: u64) -> usize {
        (hash % self.slots.len() as u64) as usize
    }

    #[inline(always)]
    fn next(&self, pos: usize) -> usize {
        if pos + 1 == self.slots.len() { 0 } else { pos + 1 }
    }

    /// Returns the live value at slot `pos`.
    pub fn get(&self, pos: usize) -> Option<&T> {
        match self.slots.get(pos) {
            Some(Slot::Occupied(bucket)) => Some(&bucket.value),
            _ => None,
        }
    }

    /// Returns the distance of the live bucket at slot `pos` from its home
    /// slot.
    pub fn distance(&self, pos: usize) -> Option<usize> {
        match self.slots.get(pos) {
            Some(Slot::Occupied(bucket)) => Some(bucket.dist),
            _ => None,
        }
    }

    /// Walks the probe sequence for `hash`, yielding every live bucket
    /// stored with that hash together with its slot.
    ///
    /// The walk starts at the home slot, skips tombstones and stops at the
    /// first empty slot or after visiting every slot once.
    pub fn probe(&self, hash: u64) -> Probe<'_, T> {
        Probe {
            table: self,
            pos: self.home(hash),
            steps: 0,
            hash,
        }
    }

    /// Finds the slot of the first live bucket with `hash` matching `eq`.
    pub fn find(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<usize> {
        self.probe(hash)
            .find(|(_, value)| eq(value))
            .map(|(pos, _)| pos)
    }

    /// Inserts `value` under `hash` using Robin Hood displacement.
    ///
    /// `relocated` is called with every value placed by this call and the
    /// slot it now occupies: once for `value` itself and once for each
    /// resident it displaced. Owners use it to keep back-references current.
    ///
    /// Returns the first slot claimed during the walk, which is where
    /// `value` itself ends up. Fails with [`Error::Invalid`] without touching
    /// the table if there is no free slot.
    pub fn insert(
        &mut self,
        hash: u64,
        value: T,
        mut relocated: impl FnMut(T, usize),
    ) -> Result<usize> {
        if self.populated >= self.slots.len() {
            return Err(Error::Invalid);
        }

        let mut pos = self.home(hash);
        let mut carried = Bucket {
            hash,
            dist: 0,
            value,
        };
        let mut first = None;

        loop {
            match &mut self.slots[pos] {
                Slot::Occupied(resident) => {
                    if resident.dist < carried.dist {
                        core::mem::swap(resident, &mut carried);
                        relocated(resident.value, pos);
                        first.get_or_insert(pos);
                    }
                }
                vacant => {
                    if matches!(vacant, Slot::Tombstone) {
                        self.tombstones -= 1;
                    }
                    *vacant = Slot::Occupied(carried);
                    self.populated += 1;
                    relocated(carried.value, pos);

                    return Ok(*first.get_or_insert(pos));
                }
            }

            pos = self.next(pos);
            carried.dist += 1;
        }
    }

    /// Removes the live bucket at slot `pos`, leaving a tombstone.
    pub fn remove(&mut self, pos: usize) -> Option<T> {
        self.vacate(pos).map(|bucket| bucket.value)
    }

    pub(crate) fn vacate(&mut self, pos: usize) -> Option<Bucket<T>> {
        let slot = self.slots.get_mut(pos)?;
        let Slot::Occupied(bucket) = *slot else {
            return None;
        };

        *slot = Slot::Tombstone;
        self.populated -= 1;
        self.tombstones += 1;

        Some(bucket)
    }

    /// Puts a bucket taken by [`vacate`](Self::vacate) back into its
    /// tombstoned slot. Returns `false` if the slot was reused meanwhile.
    pub(crate) fn reinstate(&mut self, pos: usize, bucket: Bucket<T>) -> bool {
        match self.slots.get_mut(pos) {
            Some(slot) if matches!(slot, Slot::Tombstone) => {
                *slot = Slot::Occupied(bucket);
                self.populated += 1;
                self.tombstones -= 1;
                true
            }
            _ => false,
        }
    }

    /// Empties every slot, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
        self.populated = 0;
        self.tombstones = 0;
    }

    /// Builds a new table with `slots` slots holding every live bucket of
    /// this one, without tombstones.
    ///
    /// This table is left untouched. Fails with [`Error::Alloc`] if the new
    /// slot array cannot be allocated, [`Error::Invalid`] if it is too small
    /// to hold every live bucket, and [`Error::Corrupted`] if the new table
    /// does not end up with the same live count.
    pub fn rehash(&self, slots: usize) -> Result<Self> {
        if slots <= self.populated {
            return Err(Error::Invalid);
        }

        let mut table = Self::with_slots(slots)?;
        for slot in &self.slots {
            if let Slot::Occupied(bucket) = slot {
                table.insert(bucket.hash, bucket.value, |_, _| {})?;
            }
        }

        if table.populated != self.populated {
            tracing::error!(
                expected = self.populated,
                found = table.populated,
                "live count mismatch after rehash"
            );
            return Err(Error::Corrupted);
        }

        tracing::debug!(
            from = self.slots.len(),
            to = slots,
            populated = self.populated,
            dropped_tombstones = self.tombstones,
            "rehashed robin hood table"
        );

        Ok(table)
    }

    /// Returns an iterator over live values and their slots, in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            slots: self.slots.iter().enumerate(),
            remaining: self.populated,
        }
    }

    /// Collects probe-distance statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_stats(&self) -> ProbeStats {
        let mut histogram = Vec::new();
        let mut total = 0usize;

        for slot in &self.slots {
            if let Slot::Occupied(bucket) = slot {
                if histogram.len() <= bucket.dist {
                    histogram.resize(bucket.dist + 1, 0);
                }
                histogram[bucket.dist] += 1;
                total += bucket.dist;
            }
        }

        ProbeStats {
            populated: self.populated,
            slots: self.slots.len(),
            tombstones: self.tombstones,
            max_distance: histogram.len().saturating_sub(1),
            mean_distance: if self.populated == 0 {
                0.0
            } else {
                total as f64 / self.populated as f64
            },
            histogram,
        }
    }
}

/// Iterator over the live buckets along one probe sequence.
///
/// Created by [`RobinHoodTable::probe`].
pub struct Probe<'a, T> {
    table: &'a RobinHoodTable<T>,
    pos: usize,
    steps: usize,
    hash: u64,
}

impl<'a, T> Iterator for Probe<'a, T>
where
    T: Copy,
{
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let slots = &self.table.slots;

        while self.steps < slots.len() {
            let pos = self.pos;
            self.pos = self.table.next(pos);
            self.steps += 1;

            match &slots[pos] {
                Slot::Empty => {
                    self.steps = slots.len();
                    return None;
                }
                Slot::Occupied(bucket) if bucket.hash == self.hash => {
                    return Some((pos, &bucket.value));
                }
                _ => {}
            }
        }

        None
    }
}

/// An iterator over the live values of a [`RobinHoodTable`] and their
/// slots, in slot order.
pub struct Iter<'a, T> {
    slots: core::iter::Enumerate<core::slice::Iter<'a, Slot<T>>>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        for (pos, slot) in self.slots.by_ref() {
            if let Slot::Occupied(bucket) = slot {
                self.remaining -= 1;
                return Some((pos, &bucket.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some((pos, slot)) = self.slots.next_back() {
            if let Slot::Occupied(bucket) = slot {
                self.remaining -= 1;
                return Some((pos, &bucket.value));
            }
        }
        None
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn hash(&self, key: u64) -> u64 {
            let mut h = SipHasher::new_with_keys(self.k0, self.k1);
            h.write_u64(key);
            h.finish()
        }
    }

    fn home_of(table: &RobinHoodTable<u64>, hash: u64) -> usize {
        (hash % table.slots() as u64) as usize
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table = RobinHoodTable::with_slots(97).unwrap();

        for k in 0..64u64 {
            table.insert(state.hash(k), k, |_, _| {}).unwrap();
        }
        assert_eq!(table.len(), 64);

        for k in 0..64u64 {
            let pos = table.find(state.hash(k), |&v| v == k).unwrap();
            assert_eq!(table.get(pos), Some(&k), "{:#?}", table);
        }
        assert!(table.find(state.hash(999), |&v| v == 999).is_none());
    }

    #[test]
    fn zero_slots_is_invalid() {
        assert_eq!(
            RobinHoodTable::<u64>::with_slots(0).unwrap_err(),
            Error::Invalid
        );
    }

    #[test]
    fn displacement_moves_closer_resident() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        let mut moves = vec![];

        table.insert(0, 'a', |_, _| {}).unwrap();
        table.insert(0, 'b', |_, _| {}).unwrap();
        table.insert(1, 'c', |_, _| {}).unwrap();
        assert_eq!(table.distance(1), Some(1));
        assert_eq!(table.get(2), Some(&'c'));
        assert_eq!(table.distance(2), Some(1));

        // 'd' reaches slot 2 at distance 2 and evicts 'c' (distance 1).
        let first = table
            .insert(0, 'd', |v, pos| moves.push((v, pos)))
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(moves, vec![('d', 2), ('c', 3)]);
        assert_eq!(table.get(2), Some(&'d'));
        assert_eq!(table.distance(2), Some(2));
        assert_eq!(table.get(3), Some(&'c'));
        assert_eq!(table.distance(3), Some(2));
    }

    #[test]
    fn ties_favour_the_resident() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        for v in 0..5u64 {
            table.insert(11, v, |_, _| {}).unwrap();
        }

        let order: Vec<u64> = table.probe(11).map(|(_, &v)| v).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn distances_match_final_positions() {
        let state = HashState::default();
        let mut table = RobinHoodTable::with_slots(769).unwrap();

        for k in 0..560u64 {
            table.insert(state.hash(k), k, |_, _| {}).unwrap();
        }

        let slots = table.slots();
        for (pos, &k) in table.iter() {
            let home = home_of(&table, state.hash(k));
            let expected = (pos + slots - home) % slots;
            assert_eq!(table.distance(pos), Some(expected), "{:#?}", table);
        }

        // Without removals, a neighbour can be at most one step farther.
        for pos in 0..slots {
            let next = (pos + 1) % slots;
            if let (Some(here), Some(there)) = (table.distance(pos), table.distance(next)) {
                assert!(there <= here + 1, "slot {pos}: {here} -> {there}");
            }
        }
    }

    #[test]
    fn wraps_around_the_end() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        table.insert(52, 1u64, |_, _| {}).unwrap();
        let pos = table.insert(52, 2u64, |_, _| {}).unwrap();

        assert_eq!(pos, 0);
        assert_eq!(table.distance(0), Some(1));
        assert_eq!(table.find(52, |&v| v == 2), Some(0));
    }

    #[test]
    fn tombstones_do_not_stop_lookups() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        table.insert(3, 1u64, |_, _| {}).unwrap();
        table.insert(3, 2u64, |_, _| {}).unwrap();

        assert_eq!(table.remove(3), Some(1));
        assert_eq!(table.tombstones(), 1);
        assert_eq!(table.find(3, |&v| v == 2), Some(4));

        // A new bucket with the same home reuses the tombstone.
        assert_eq!(table.insert(3, 3u64, |_, _| {}).unwrap(), 3);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.find(3, |&v| v == 2), Some(4));
        assert_eq!(table.find(3, |&v| v == 3), Some(3));
    }

    #[test]
    fn remove_empty_slot_is_none() {
        let mut table = RobinHoodTable::<u64>::with_slots(53).unwrap();
        assert_eq!(table.remove(0), None);
        assert_eq!(table.remove(1000), None);
        assert_eq!(table.tombstones(), 0);
    }

    #[test]
    fn lookups_terminate_without_empty_slots() {
        let mut table = RobinHoodTable::with_slots(3).unwrap();
        for v in 0..3u64 {
            table.insert(v, v, |_, _| {}).unwrap();
        }
        assert_eq!(table.insert(0, 9, |_, _| {}), Err(Error::Invalid));

        table.remove(1);
        assert!(table.find(1, |&v| v == 1).is_none());
        assert!(table.find(7, |&v| v == 7).is_none());
    }

    #[test]
    fn vacate_and_reinstate() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        let pos = table.insert(5, 42u64, |_, _| {}).unwrap();

        let bucket = table.vacate(pos).unwrap();
        assert!(table.is_empty());
        assert!(table.reinstate(pos, bucket));
        assert_eq!(table.find(5, |&v| v == 42), Some(pos));
        assert_eq!(table.tombstones(), 0);
        assert!(!table.reinstate(pos, bucket));
    }

    #[test]
    fn rehash_keeps_values_and_drops_tombstones() {
        let state = HashState::default();
        let mut table = RobinHoodTable::with_slots(97).unwrap();
        for k in 0..60u64 {
            table.insert(state.hash(k), k, |_, _| {}).unwrap();
        }
        for k in (0..60u64).step_by(3) {
            let pos = table.find(state.hash(k), |&v| v == k).unwrap();
            table.remove(pos);
        }

        let rehashed = table.rehash(191).unwrap();
        assert_eq!(rehashed.slots(), 191);
        assert_eq!(rehashed.len(), 40);
        assert_eq!(rehashed.tombstones(), 0);
        for k in 0..60u64 {
            let found = rehashed.find(state.hash(k), |&v| v == k).is_some();
            assert_eq!(found, k % 3 != 0);
        }

        // The source is untouched.
        assert_eq!(table.slots(), 97);
        assert_eq!(table.tombstones(), 20);
    }

    #[test]
    fn rehash_too_small_is_invalid() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        for v in 0..10u64 {
            table.insert(v, v, |_, _| {}).unwrap();
        }
        assert_eq!(table.rehash(10).unwrap_err(), Error::Invalid);
    }

    #[test]
    fn iter_both_ends() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        for v in [5u64, 9, 40] {
            table.insert(v, v, |_, _| {}).unwrap();
        }

        let forward: Vec<u64> = table.iter().map(|(_, &v)| v).collect();
        let backward: Vec<u64> = table.iter().rev().map(|(_, &v)| v).collect();
        assert_eq!(forward, vec![5, 9, 40]);
        assert_eq!(backward, vec![40, 9, 5]);
        assert_eq!(table.iter().len(), 3);
    }

    #[test]
    fn clear_resets_counters() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        for v in 0..10u64 {
            table.insert(v, v, |_, _| {}).unwrap();
        }
        table.remove(0);
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn saturation_counts_tombstones() {
        let mut table = RobinHoodTable::with_slots(4).unwrap();
        table.insert(0, 0u64, |_, _| {}).unwrap();
        table.insert(1, 1u64, |_, _| {}).unwrap();
        assert!(!table.is_saturated(0.75));

        table.remove(0);
        table.insert(2, 2u64, |_, _| {}).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.is_saturated(0.75));
    }

    #[test]
    fn probe_stats_histogram() {
        let mut table = RobinHoodTable::with_slots(53).unwrap();
        for v in 0..4u64 {
            table.insert(0, v, |_, _| {}).unwrap();
        }
        let stats = table.probe_stats();

        assert_eq!(stats.populated, 4);
        assert_eq!(stats.max_distance, 3);
        assert_eq!(stats.histogram, vec![1, 1, 1, 1]);
        assert!((stats.mean_distance - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    #[cfg(feature = "std")]
    fn stats_output() {
        let state = HashState::default();
        let mut table = RobinHoodTable::with_slots(1531).unwrap();
        for k in 0..1100u64 {
            table.insert(state.hash(k), k, |_, _| {}).unwrap();
        }
        table.probe_stats().print();
    }
}

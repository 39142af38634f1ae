use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use slab::Slab;

use crate::DEFAULT_LOAD_FACTOR;
use crate::DefaultHashBuilder;
use crate::callbacks::NotifyExt;
use crate::callbacks::SharedCallbacks;
use crate::error::Error;
use crate::error::Result;
use crate::primes;
use crate::robin_hood::RobinHoodTable;

/// A hash map that allows several entries under the same key.
///
/// Entries live in an arena indexed by a single [`RobinHoodTable`]. Entries
/// with equal keys share a home slot and therefore a probe sequence; lookups
/// report them in probe order. Without removals that is insertion order,
/// since Robin Hood ties favour the resident.
///
/// Growth, tombstone purging and failure semantics match
/// [`BidiMap`](crate::BidiMap).
///
/// ## Example
///
/// ```rust
/// use robin_heap::MultiMap;
///
/// let mut tags: MultiMap<&str, &str> = MultiMap::with_capacity(8).unwrap();
/// tags.insert("rust", "systems").unwrap();
/// tags.insert("rust", "safe").unwrap();
/// tags.insert("c", "systems").unwrap();
///
/// assert_eq!(tags.key_count(&"rust"), 2);
/// assert_eq!(tags.get(&"rust"), Ok(&"systems"));
///
/// let all: Vec<_> = tags.get_all(&"rust").collect();
/// assert_eq!(all, vec![&"systems", &"safe"]);
///
/// assert_eq!(tags.remove(&"rust"), Ok(("rust", "systems")));
/// assert_eq!(tags.len(), 2);
/// ```
#[derive(Clone)]
pub struct MultiMap<K, V, S = DefaultHashBuilder> {
    entries: Slab<(K, V)>,
    table: RobinHoodTable<usize>,
    load_factor: f64,
    hash_builder: S,
    callbacks: Option<SharedCallbacks>,
}

impl<K, V, S> Debug for MultiMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(
                self.table
                    .iter()
                    .filter_map(|(_, &id)| self.entries.get(id).map(|(k, v)| (k, v))),
            )
            .finish()
    }
}

impl<K, V, S> MultiMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a multimap able to hold `capacity` entries before growing,
    /// using the default load factor and a default hasher.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, DEFAULT_LOAD_FACTOR, S::default())
    }

    /// Creates a multimap able to hold `capacity` entries before growing at
    /// `load_factor`, using a default hasher.
    pub fn with_load_factor(capacity: usize, load_factor: f64) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, load_factor, S::default())
    }
}

impl<K, V, S> MultiMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a multimap able to hold `capacity` entries before growing,
    /// using the default load factor and `hash_builder`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, DEFAULT_LOAD_FACTOR, hash_builder)
    }

    /// Creates a multimap able to hold `capacity` entries before growing at
    /// `load_factor`.
    ///
    /// Fails with [`Error::Invalid`] if `capacity` is zero, if `load_factor`
    /// is not strictly between 0 and 1, or if the slot count would overflow,
    /// and with [`Error::Alloc`] if the table cannot be allocated.
    pub fn with_load_factor_and_hasher(
        capacity: usize,
        load_factor: f64,
        hash_builder: S,
    ) -> Result<Self> {
        if capacity == 0 || !(load_factor > 0.0 && load_factor < 1.0) {
            return Err(Error::Invalid);
        }

        let slots = primes::slots_for(capacity, load_factor).ok_or(Error::Invalid)?;

        Ok(Self {
            entries: Slab::new(),
            table: RobinHoodTable::with_slots(slots)?,
            load_factor,
            hash_builder,
            callbacks: None,
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the multimap holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.table.slots()
    }

    /// Returns the load factor the multimap grows at.
    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns `true` if the next insert will grow the table.
    pub fn is_full(&self) -> bool {
        self.capacity() as f64 * self.load_factor <= self.len() as f64
    }

    /// Returns a reference to the multimap's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Replaces the callbacks fired by this multimap. `None` disables them.
    pub fn set_callbacks(&mut self, callbacks: Option<SharedCallbacks>) {
        self.callbacks = callbacks;
    }

    /// Slots and arena ids of every entry with `key`, in probe order.
    fn matching<'a>(&'a self, key: &'a K) -> impl Iterator<Item = (usize, usize)> + 'a {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .probe(hash)
            .filter(move |&(_, &id)| self.entries.get(id).is_some_and(|(k, _)| k == key))
            .map(|(pos, &id)| (pos, id))
    }

    /// Inserts an entry. Entries with an equal key are kept alongside it.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        if self.is_full() {
            let slots =
                primes::slots_for(self.capacity() + 1, self.load_factor).ok_or(Error::Alloc)?;
            self.rebuild(slots)?;
        } else if self.table.is_saturated(self.load_factor) {
            tracing::trace!(
                slots = self.capacity(),
                tombstones = self.table.tombstones(),
                "purging tombstones"
            );
            self.rebuild(self.capacity())?;
        }

        let hash = self.hash_builder.hash_one(&key);
        let id = self.entries.insert((key, value));

        if self.table.insert(hash, id, |_, _| {}).is_err() {
            self.entries.remove(id);
            tracing::error!(slots = self.capacity(), "multimap table has no free slot");
            return Err(Error::Corrupted);
        }

        self.callbacks.notify(|cb| cb.on_create());
        Ok(())
    }

    /// Returns the value of the first entry with `key`.
    pub fn get(&self, key: &K) -> Result<&V> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (_, id) = self.matching(key).next().ok_or(Error::NotFound)?;
        let (_, value) = self.entries.get(id).ok_or(Error::Corrupted)?;

        self.callbacks.notify(|cb| cb.on_read());
        Ok(value)
    }

    /// Returns the values of every entry with `key`, in probe order.
    pub fn get_all<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a {
        self.matching(key)
            .filter_map(move |(_, id)| self.entries.get(id).map(|(_, v)| v))
    }

    /// Returns `true` if at least one entry has `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.callbacks.notify(|cb| cb.on_read());
        self.matching(key).next().is_some()
    }

    /// Returns the number of entries with `key`.
    pub fn key_count(&self, key: &K) -> usize {
        self.matching(key).count()
    }

    /// Replaces the value of the first entry with `key`, returning the old
    /// value.
    pub fn update(&mut self, key: &K, value: V) -> Result<V> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (_, id) = self.matching(key).next().ok_or(Error::NotFound)?;
        let (_, slot) = self.entries.get_mut(id).ok_or(Error::Corrupted)?;
        let old = core::mem::replace(slot, value);

        self.callbacks.notify(|cb| cb.on_update());
        Ok(old)
    }

    /// Replaces the value of every entry with `key`, returning the old values
    /// in probe order.
    pub fn update_all(&mut self, key: &K, value: V) -> Result<Vec<V>>
    where
        V: Clone,
    {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let ids: Vec<usize> = self.matching(key).map(|(_, id)| id).collect();
        if ids.is_empty() {
            return Err(Error::NotFound);
        }

        let mut old = Vec::with_capacity(ids.len());
        for id in ids {
            let (_, slot) = self.entries.get_mut(id).ok_or(Error::Corrupted)?;
            old.push(core::mem::replace(slot, value.clone()));
            self.callbacks.notify(|cb| cb.on_update());
        }

        Ok(old)
    }

    /// Removes the first entry with `key`, returning it.
    pub fn remove(&mut self, key: &K) -> Result<(K, V)> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (pos, id) = self.matching(key).next().ok_or(Error::NotFound)?;
        self.unlink(pos, id)
    }

    /// Removes every entry with `key`, returning them in probe order.
    pub fn remove_all(&mut self, key: &K) -> Result<Vec<(K, V)>> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let found: Vec<(usize, usize)> = self.matching(key).collect();
        if found.is_empty() {
            return Err(Error::NotFound);
        }

        found
            .into_iter()
            .map(|(pos, id)| self.unlink(pos, id))
            .collect()
    }

    fn unlink(&mut self, pos: usize, id: usize) -> Result<(K, V)> {
        if self.table.get(pos) != Some(&id) || !self.entries.contains(id) {
            tracing::error!(pos, id, "table slot does not hold the expected entry");
            return Err(Error::Corrupted);
        }

        self.table.remove(pos);
        let entry = self.entries.remove(id);

        self.callbacks.notify(|cb| cb.on_delete());
        Ok(entry)
    }

    /// Rehashes the table so that the multimap can hold `capacity` entries
    /// before growing.
    ///
    /// Fails with [`Error::Invalid`] if the new slot count cannot hold the
    /// current entries below the load factor; on any failure the multimap
    /// keeps its old table.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.len() {
            return Err(Error::Invalid);
        }

        let slots = primes::slots_for(capacity, self.load_factor).ok_or(Error::Invalid)?;
        if slots == self.capacity() {
            self.callbacks.notify(|cb| cb.on_resize());
            return Ok(());
        }

        if self.len() as f64 >= slots as f64 * self.load_factor {
            return Err(Error::Invalid);
        }

        self.rebuild(slots)
    }

    /// Shrinks the table to the smallest prime slot count that holds the
    /// current entries below the load factor.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.resize(self.len() + 1)
    }

    fn rebuild(&mut self, slots: usize) -> Result<()> {
        let table = self.table.rehash(slots)?;
        if table.len() != self.entries.len() {
            tracing::error!(
                entries = self.entries.len(),
                table = table.len(),
                "table size disagrees with arena"
            );
            return Err(Error::Corrupted);
        }

        self.table = table;
        tracing::debug!(slots, len = self.len(), "resized multimap");
        self.callbacks.notify(|cb| cb.on_resize());
        Ok(())
    }

    /// Removes every entry, keeping the table allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.table.clear();
    }

    /// Returns an iterator over the entries, in slot order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator {
        Iter {
            slots: self.table.iter(),
            entries: &self.entries,
        }
    }

    /// Collects probe-distance statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_stats(&self) -> crate::robin_hood::ProbeStats {
        self.table.probe_stats()
    }
}

struct Iter<'a, K, V> {
    slots: crate::robin_hood::Iter<'a, usize>,
    entries: &'a Slab<(K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        self.slots
            .by_ref()
            .find_map(|(_, &id)| entries.get(id).map(|(k, v)| (k, v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        while let Some((_, &id)) = self.slots.next_back() {
            if let Some((k, v)) = entries.get(id) {
                return Some((k, v));
            }
        }
        None
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V, S> PartialEq for MultiMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    /// Two multimaps are equal if they hold the same multiset of entries.
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        self.iter().all(|(key, value)| {
            let ours = self.get_all(key).filter(|v| *v == value).count();
            let theirs = other.get_all(key).filter(|v| *v == value).count();
            ours == theirs
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;
    use core::hash::Hasher;
    use core::sync::atomic::AtomicUsize;
    use core::sync::atomic::Ordering;

    use proptest::prelude::*;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::callbacks::Callbacks;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Clone, Default)]
    struct IdentityHashBuilder;

    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = self.0.wrapping_shl(8) | b as u64;
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    impl BuildHasher for IdentityHashBuilder {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher(0)
        }
    }

    type TestMap<K, V> = MultiMap<K, V, SipHashBuilder>;

    #[test]
    fn construction_validates_arguments() {
        assert_eq!(
            TestMap::<u64, u64>::with_capacity(0).unwrap_err(),
            Error::Invalid
        );
        assert_eq!(
            TestMap::<u64, u64>::with_load_factor(8, 1.0).unwrap_err(),
            Error::Invalid
        );
        assert_eq!(
            TestMap::<u64, u64>::with_load_factor(8, 0.75)
                .unwrap()
                .capacity(),
            53
        );
    }

    #[test]
    fn equal_keys_coexist() {
        let mut map = TestMap::with_capacity(8).unwrap();
        for v in 0..5u32 {
            map.insert("k", v).unwrap();
        }
        map.insert("other", 99).unwrap();

        assert_eq!(map.len(), 6);
        assert_eq!(map.key_count(&"k"), 5);
        assert_eq!(map.key_count(&"other"), 1);
        assert_eq!(map.key_count(&"none"), 0);
        assert!(map.contains(&"k"));
        assert!(!map.contains(&"none"));
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut map: MultiMap<u64, u64, IdentityHashBuilder> =
            MultiMap::with_capacity(8).unwrap();
        map.insert(3, 30).unwrap();
        map.insert(4, 40).unwrap();
        map.insert(3, 31).unwrap();
        map.insert(3, 32).unwrap();

        assert_eq!(map.get(&3), Ok(&30));
        let all: Vec<u64> = map.get_all(&3).copied().collect();
        assert_eq!(all, vec![30, 31, 32]);
        assert_eq!(map.get(&4), Ok(&40));
    }

    #[test]
    fn lookups_on_empty_map() {
        let mut map = TestMap::<u64, u64>::with_capacity(4).unwrap();
        assert_eq!(map.get(&1), Err(Error::Empty));
        assert_eq!(map.update(&1, 1), Err(Error::Empty));
        assert_eq!(map.update_all(&1, 1), Err(Error::Empty));
        assert_eq!(map.remove(&1), Err(Error::Empty));
        assert_eq!(map.remove_all(&1), Err(Error::Empty));
        assert_eq!(map.get_all(&1).count(), 0);
    }

    #[test]
    fn missing_key_is_not_found() {
        let mut map = TestMap::with_capacity(4).unwrap();
        map.insert(1u64, 1u64).unwrap();

        assert_eq!(map.get(&2), Err(Error::NotFound));
        assert_eq!(map.update(&2, 0), Err(Error::NotFound));
        assert_eq!(map.update_all(&2, 0), Err(Error::NotFound));
        assert_eq!(map.remove(&2), Err(Error::NotFound));
        assert_eq!(map.remove_all(&2), Err(Error::NotFound));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn update_first_and_all() {
        let mut map: MultiMap<u64, u64, IdentityHashBuilder> =
            MultiMap::with_capacity(8).unwrap();
        map.insert(1, 10).unwrap();
        map.insert(1, 11).unwrap();
        map.insert(2, 20).unwrap();

        assert_eq!(map.update(&1, 100), Ok(10));
        assert_eq!(map.get_all(&1).copied().collect::<Vec<_>>(), vec![100, 11]);

        assert_eq!(map.update_all(&1, 7), Ok(vec![100, 11]));
        assert_eq!(map.get_all(&1).copied().collect::<Vec<_>>(), vec![7, 7]);
        assert_eq!(map.get(&2), Ok(&20));
    }

    #[test]
    fn remove_first_and_all() {
        let mut map: MultiMap<u64, u64, IdentityHashBuilder> =
            MultiMap::with_capacity(8).unwrap();
        for v in 0..4u64 {
            map.insert(5, v).unwrap();
        }
        map.insert(6, 60).unwrap();

        assert_eq!(map.remove(&5), Ok((5, 0)));
        assert_eq!(map.key_count(&5), 3);

        assert_eq!(map.remove_all(&5), Ok(vec![(5, 1), (5, 2), (5, 3)]));
        assert!(!map.contains(&5));
        assert_eq!(map.get(&6), Ok(&60));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn growth_and_shrink() {
        let mut map = TestMap::with_load_factor(4, 0.75).unwrap();
        for k in 0..500u64 {
            map.insert(k % 50, k).unwrap();
        }
        assert!(map.capacity() > 500);
        for k in 0..50u64 {
            assert_eq!(map.key_count(&k), 10);
        }

        for k in 5..50u64 {
            map.remove_all(&k).unwrap();
        }
        map.shrink_to_fit().unwrap();
        assert_eq!(map.capacity(), 97);
        assert_eq!(map.len(), 50);

        assert_eq!(map.resize(10), Err(Error::Invalid));
        assert_eq!(map.capacity(), 97);
    }

    #[test]
    fn churn_purges_tombstones() {
        let mut map = TestMap::with_capacity(8).unwrap();
        for round in 0..400u64 {
            map.insert(round % 3, round).unwrap();
            if round >= 6 {
                map.remove(&(round % 3)).unwrap();
            }
        }

        assert_eq!(map.capacity(), 53);
        assert_eq!(map.len(), 6);
        for k in 0..3u64 {
            assert_eq!(map.key_count(&k), 2);
        }
    }

    #[test]
    fn equality_is_a_multiset_comparison() {
        let mut a = TestMap::with_capacity(4).unwrap();
        let mut b = TestMap::with_capacity(200).unwrap();

        for (k, v) in [(1u64, 1u64), (1, 1), (1, 2), (2, 3)] {
            a.insert(k, v).unwrap();
        }
        for (k, v) in [(2u64, 3u64), (1, 2), (1, 1), (1, 1)] {
            b.insert(k, v).unwrap();
        }
        assert_eq!(a, b);

        b.update(&2, 4).unwrap();
        assert_ne!(a, b);

        let mut c = TestMap::with_capacity(4).unwrap();
        for (k, v) in [(1u64, 1u64), (1, 2), (1, 2), (2, 3)] {
            c.insert(k, v).unwrap();
        }
        assert_ne!(a, c);
    }

    #[test]
    fn clone_and_clear() {
        let mut map = TestMap::with_capacity(8).unwrap();
        map.insert(1u64, 1u64).unwrap();
        map.insert(1, 2).unwrap();
        let copy = map.clone();

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 53);
        assert_eq!(copy.key_count(&1), 2);
        assert_eq!(copy.iter().len(), 2);
    }

    #[test]
    fn callbacks_fire_on_success_only() {
        #[derive(Default)]
        struct Deletes(AtomicUsize);

        impl Callbacks for Deletes {
            fn on_delete(&self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let hooks = Arc::new(Deletes::default());
        let mut map = TestMap::with_capacity(8).unwrap();
        map.set_callbacks(Some(hooks.clone()));

        for v in 0..3u64 {
            map.insert(7u64, v).unwrap();
        }
        let _ = map.remove(&8);
        map.remove_all(&7).unwrap();

        assert_eq!(hooks.0.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn debug_repeats_keys() {
        let mut map: MultiMap<u64, &str, IdentityHashBuilder> =
            MultiMap::with_capacity(8).unwrap();
        map.insert(1, "a").unwrap();
        map.insert(1, "b").unwrap();

        assert_eq!(alloc::format!("{map:?}"), r#"{1: "a", 1: "b"}"#);
    }

    proptest! {
        #[test]
        fn counts_match_model(ops in proptest::collection::vec((any::<bool>(), 0u8..16, any::<u8>()), 1..300)) {
            let mut map: TestMap<u8, u8> = MultiMap::with_capacity(4).unwrap();
            let mut model: Vec<(u8, u8)> = Vec::new();

            for (insert, k, v) in ops {
                if insert {
                    map.insert(k, v).unwrap();
                    model.push((k, v));
                } else {
                    let removed = map.remove(&k);
                    match model.iter().position(|&(mk, _)| mk == k) {
                        Some(_) => {
                            let (rk, rv) = removed.unwrap();
                            prop_assert_eq!(rk, k);
                            let at = model.iter().position(|&e| e == (rk, rv));
                            prop_assert!(at.is_some());
                            if let Some(at) = at {
                                model.swap_remove(at);
                            }
                        }
                        None => prop_assert!(removed.is_err()),
                    }
                }
            }

            prop_assert_eq!(map.len(), model.len());
            for k in 0..16u8 {
                let mut expected: Vec<u8> =
                    model.iter().filter(|&&(mk, _)| mk == k).map(|&(_, v)| v).collect();
                let mut found: Vec<u8> = map.get_all(&k).copied().collect();
                expected.sort_unstable();
                found.sort_unstable();
                prop_assert_eq!(found, expected);
            }
        }
    }
}

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

/// Side indices into `BidiMap::tables` and `Entry::slots`.
const KEYS: usize = 0;
const VALUES: usize = 1;

#[derive(Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    /// Slot of this entry in the key table and in the value table.
    slots: [usize; 2],
}

/// A bidirectional map with unique keys and unique values.
///
/// Every pair is stored once in an arena and indexed by two
/// [`RobinHoodTable`]s: one hashed by key, one hashed by value. Each arena
/// entry remembers its slot in both tables, so removing a pair through either
/// side tombstones its twin in the other table without a second lookup.
///
/// Growth is driven by the load factor. When `len() >= capacity() *
/// load_factor()` the next insert rehashes both tables into the next prime
/// slot count. When tombstones push a table to that threshold without the
/// live count doing so, the tables are rehashed at the same size instead.
///
/// Failed operations leave the map exactly as it was.
///
/// ## Example
///
/// ```rust
/// use robin_heap::BidiMap;
/// use robin_heap::Error;
///
/// let mut ports: BidiMap<&str, u16> = BidiMap::with_capacity(16).unwrap();
/// ports.insert("http", 80).unwrap();
/// ports.insert("https", 443).unwrap();
///
/// assert_eq!(ports.get_value(&"https"), Ok(&443));
/// assert_eq!(ports.get_key(&80), Ok(&"http"));
///
/// // Values are unique too.
/// assert_eq!(ports.insert("www", 80), Err(Error::Duplicate));
///
/// assert_eq!(ports.update_key(&80, "web"), Ok("http"));
/// assert_eq!(ports.remove_by_value(&80), Ok(("web", 80)));
/// assert_eq!(ports.len(), 1);
/// ```
#[derive(Clone)]
pub struct BidiMap<K, V, S = DefaultHashBuilder> {
    entries: Slab<Entry<K, V>>,
    tables: [RobinHoodTable<usize>; 2],
    load_factor: f64,
    hash_builder: S,
    callbacks: Option<SharedCallbacks>,
}

impl<K, V, S> Debug for BidiMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.tables[KEYS].iter().filter_map(|(_, &id)| {
                self.entries.get(id).map(|entry| (&entry.key, &entry.value))
            }))
            .finish()
    }
}

impl<K, V, S> BidiMap<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a map able to hold `capacity` pairs before growing, using the
    /// default load factor and a default hasher.
    ///
    /// See [`with_load_factor_and_hasher`](Self::with_load_factor_and_hasher)
    /// for the failure modes.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, DEFAULT_LOAD_FACTOR, S::default())
    }

    /// Creates a map able to hold `capacity` pairs before growing at
    /// `load_factor`, using a default hasher.
    pub fn with_load_factor(capacity: usize, load_factor: f64) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, load_factor, S::default())
    }
}

impl<K, V, S> BidiMap<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a map able to hold `capacity` pairs before growing, using the
    /// default load factor and `hash_builder` for both keys and values.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self> {
        Self::with_load_factor_and_hasher(capacity, DEFAULT_LOAD_FACTOR, hash_builder)
    }

    /// Creates a map able to hold `capacity` pairs before growing at
    /// `load_factor`.
    ///
    /// Each table gets the smallest tabled prime number of slots that is at
    /// least `capacity / load_factor`.
    ///
    /// Fails with [`Error::Invalid`] if `capacity` is zero, if `load_factor`
    /// is not strictly between 0 and 1, or if the slot count would overflow,
    /// and with [`Error::Alloc`] if the tables cannot be allocated.
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
            tables: [
                RobinHoodTable::with_slots(slots)?,
                RobinHoodTable::with_slots(slots)?,
            ],
            load_factor,
            hash_builder,
            callbacks: None,
        })
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of slots in each table.
    pub fn capacity(&self) -> usize {
        self.tables[KEYS].slots()
    }

    /// Returns the load factor the map grows at.
    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns `true` if the next insert will grow the tables.
    pub fn is_full(&self) -> bool {
        self.capacity() as f64 * self.load_factor <= self.len() as f64
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Replaces the callbacks fired by this map. `None` disables them.
    pub fn set_callbacks(&mut self, callbacks: Option<SharedCallbacks>) {
        self.callbacks = callbacks;
    }

    /// Returns the slot and arena id of the pair with `key`.
    fn locate_key(&self, key: &K) -> Option<(usize, usize)> {
        let hash = self.hash_builder.hash_one(key);
        self.tables[KEYS]
            .probe(hash)
            .find(|&(_, &id)| self.entries.get(id).is_some_and(|e| e.key == *key))
            .map(|(pos, &id)| (pos, id))
    }

    /// Returns the slot and arena id of the pair with `value`.
    fn locate_value(&self, value: &V) -> Option<(usize, usize)> {
        let hash = self.hash_builder.hash_one(value);
        self.tables[VALUES]
            .probe(hash)
            .find(|&(_, &id)| self.entries.get(id).is_some_and(|e| e.value == *value))
            .map(|(pos, &id)| (pos, id))
    }

    /// Inserts a new pair.
    ///
    /// Fails with [`Error::Duplicate`] if either `key` or `value` is already
    /// present, in which case the map is unchanged. Otherwise grows the
    /// tables first if the map is full.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        if self.locate_key(&key).is_some() || self.locate_value(&value).is_some() {
            return Err(Error::Duplicate);
        }

        if self.is_full() {
            let slots =
                primes::slots_for(self.capacity() + 1, self.load_factor).ok_or(Error::Alloc)?;
            self.rebuild(slots)?;
        } else if self
            .tables
            .iter()
            .any(|table| table.is_saturated(self.load_factor))
        {
            tracing::trace!(
                slots = self.capacity(),
                tombstones = self.tables[KEYS].tombstones(),
                "purging tombstones"
            );
            self.rebuild(self.capacity())?;
        }

        let key_hash = self.hash_builder.hash_one(&key);
        let value_hash = self.hash_builder.hash_one(&value);
        let id = self.entries.insert(Entry {
            key,
            value,
            slots: [0; 2],
        });

        let Self {
            entries, tables, ..
        } = self;
        let [key_table, value_table] = tables;

        if key_table
            .insert(key_hash, id, |moved, pos| link(entries, moved, KEYS, pos))
            .is_err()
        {
            entries.remove(id);
            tracing::error!(slots = key_table.slots(), "key table has no free slot");
            return Err(Error::Corrupted);
        }

        if value_table
            .insert(value_hash, id, |moved, pos| link(entries, moved, VALUES, pos))
            .is_err()
        {
            key_table.remove(entries[id].slots[KEYS]);
            entries.remove(id);
            tracing::error!(slots = value_table.slots(), "value table has no free slot");
            return Err(Error::Corrupted);
        }

        self.callbacks.notify(|cb| cb.on_create());
        Ok(())
    }

    /// Removes the pair with `key`, returning it.
    ///
    /// Fails with [`Error::Empty`] on an empty map and [`Error::NotFound`] if
    /// `key` is absent.
    pub fn remove_by_key(&mut self, key: &K) -> Result<(K, V)> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (pos, id) = self.locate_key(key).ok_or(Error::NotFound)?;
        self.unlink(id, KEYS, pos)
    }

    /// Removes the pair with `value`, returning it.
    ///
    /// Fails with [`Error::Empty`] on an empty map and [`Error::NotFound`] if
    /// `value` is absent.
    pub fn remove_by_value(&mut self, value: &V) -> Result<(K, V)> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (pos, id) = self.locate_value(value).ok_or(Error::NotFound)?;
        self.unlink(id, VALUES, pos)
    }

    /// Tombstones both slots of entry `id`, found through `side` at `pos`,
    /// and frees the entry.
    fn unlink(&mut self, id: usize, side: usize, pos: usize) -> Result<(K, V)> {
        let other = 1 - side;
        let twin = self.twin_slot(id, side, pos)?;

        self.tables[side].remove(pos);
        self.tables[other].remove(twin);
        let Entry { key, value, .. } = self.entries.remove(id);

        self.callbacks.notify(|cb| cb.on_delete());
        Ok((key, value))
    }

    /// Checks that entry `id` is stored at `pos` on `side` and that its
    /// back-reference into the other table points back at it. Returns the
    /// slot in the other table.
    fn twin_slot(&self, id: usize, side: usize, pos: usize) -> Result<usize> {
        let other = 1 - side;
        let entry = self.entries.get(id).ok_or(Error::Corrupted)?;
        let twin = entry.slots[other];

        if entry.slots[side] != pos || self.tables[other].get(twin) != Some(&id) {
            tracing::error!(
                id,
                side,
                pos,
                twin,
                "back-reference does not match table contents"
            );
            return Err(Error::Corrupted);
        }

        Ok(twin)
    }

    /// Moves entry `id` in the `side` table to the probe sequence of `hash`.
    ///
    /// The old slot is tombstoned first so the entry does not collide with
    /// itself. If the new slot cannot be claimed the old bucket is put back.
    fn relocate(&mut self, id: usize, side: usize, hash: u64) -> Result<()> {
        let old = self.entries.get(id).ok_or(Error::Corrupted)?.slots[side];
        let bucket = self.tables[side].vacate(old).ok_or(Error::Corrupted)?;

        let Self {
            entries, tables, ..
        } = self;
        let table = &mut tables[side];

        if table
            .insert(hash, id, |moved, pos| link(entries, moved, side, pos))
            .is_err()
        {
            table.reinstate(old, bucket);
            tracing::error!(id, side, "could not relocate entry, restored old slot");
            return Err(Error::Corrupted);
        }

        Ok(())
    }

    /// Renames the key paired with `value` to `new_key`, returning the old
    /// key.
    ///
    /// Renaming a key to itself succeeds without touching the tables. Fails
    /// with [`Error::Empty`] on an empty map, [`Error::NotFound`] if `value`
    /// is absent and [`Error::Duplicate`] if `new_key` belongs to another
    /// pair.
    pub fn update_key(&mut self, value: &V, new_key: K) -> Result<K> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (value_pos, id) = self.locate_value(value).ok_or(Error::NotFound)?;

        let same = self.entries.get(id).is_some_and(|e| e.key == new_key);
        if !same {
            if self.locate_key(&new_key).is_some() {
                return Err(Error::Duplicate);
            }

            self.twin_slot(id, VALUES, value_pos)?;
            let hash = self.hash_builder.hash_one(&new_key);
            self.relocate(id, KEYS, hash)?;
        }

        let entry = self.entries.get_mut(id).ok_or(Error::Corrupted)?;
        let old = core::mem::replace(&mut entry.key, new_key);

        self.callbacks.notify(|cb| cb.on_update());
        Ok(old)
    }

    /// Replaces the value paired with `key` by `new_value`, returning the old
    /// value.
    ///
    /// Replacing a value with an equal one succeeds without touching the
    /// tables. Fails with [`Error::Empty`] on an empty map,
    /// [`Error::NotFound`] if `key` is absent and [`Error::Duplicate`] if
    /// `new_value` belongs to another pair.
    pub fn update_value(&mut self, key: &K, new_value: V) -> Result<V> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (key_pos, id) = self.locate_key(key).ok_or(Error::NotFound)?;

        let same = self.entries.get(id).is_some_and(|e| e.value == new_value);
        if !same {
            if self.locate_value(&new_value).is_some() {
                return Err(Error::Duplicate);
            }

            self.twin_slot(id, KEYS, key_pos)?;
            let hash = self.hash_builder.hash_one(&new_value);
            self.relocate(id, VALUES, hash)?;
        }

        let entry = self.entries.get_mut(id).ok_or(Error::Corrupted)?;
        let old = core::mem::replace(&mut entry.value, new_value);

        self.callbacks.notify(|cb| cb.on_update());
        Ok(old)
    }

    /// Returns the value paired with `key`.
    pub fn get_value(&self, key: &K) -> Result<&V> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (_, id) = self.locate_key(key).ok_or(Error::NotFound)?;
        let entry = self.entries.get(id).ok_or(Error::Corrupted)?;

        self.callbacks.notify(|cb| cb.on_read());
        Ok(&entry.value)
    }

    /// Returns the key paired with `value`.
    pub fn get_key(&self, value: &V) -> Result<&K> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let (_, id) = self.locate_value(value).ok_or(Error::NotFound)?;
        let entry = self.entries.get(id).ok_or(Error::Corrupted)?;

        self.callbacks.notify(|cb| cb.on_read());
        Ok(&entry.key)
    }

    /// Returns `true` if some pair has `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.callbacks.notify(|cb| cb.on_read());
        self.locate_key(key).is_some()
    }

    /// Returns `true` if some pair has `value`.
    pub fn contains_value(&self, value: &V) -> bool {
        self.callbacks.notify(|cb| cb.on_read());
        self.locate_value(value).is_some()
    }

    /// Rehashes both tables so that the map can hold `capacity` pairs before
    /// growing.
    ///
    /// Both growing and shrinking are supported. Resizing to the current slot
    /// count is a no-op. Fails with [`Error::Invalid`] if the new slot count
    /// cannot hold the current pairs below the load factor; on any failure
    /// the map keeps its old tables.
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

    /// Shrinks the tables to the smallest prime slot count that holds the
    /// current pairs below the load factor.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.resize(self.len() + 1)
    }

    /// Rehashes both tables into `slots` slots and refreshes every
    /// back-reference. The old tables are only replaced once both new ones
    /// are complete.
    fn rebuild(&mut self, slots: usize) -> Result<()> {
        let keys = self.tables[KEYS].rehash(slots)?;
        let values = self.tables[VALUES].rehash(slots)?;

        if keys.len() != self.entries.len() || values.len() != self.entries.len() {
            tracing::error!(
                entries = self.entries.len(),
                keys = keys.len(),
                values = values.len(),
                "table sizes disagree with arena"
            );
            return Err(Error::Corrupted);
        }

        self.tables = [keys, values];
        for side in [KEYS, VALUES] {
            for (pos, &id) in self.tables[side].iter() {
                link(&mut self.entries, id, side, pos);
            }
        }

        tracing::debug!(slots, len = self.len(), "resized bidirectional map");
        self.callbacks.notify(|cb| cb.on_resize());
        Ok(())
    }

    /// Removes every pair, keeping the table allocations.
    pub fn clear(&mut self) {
        self.entries.clear();
        for table in &mut self.tables {
            table.clear();
        }
    }

    /// Returns an iterator over the pairs, in key-table slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.tables[KEYS].iter(),
            entries: &self.entries,
        }
    }

    /// Returns an iterator over the keys, in key-table slot order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values, in key-table slot order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator {
        self.iter().map(|(_, value)| value)
    }

    /// Collects probe-distance statistics for the key and value tables.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_stats(
        &self,
    ) -> (
        crate::robin_hood::ProbeStats,
        crate::robin_hood::ProbeStats,
    ) {
        (
            self.tables[KEYS].probe_stats(),
            self.tables[VALUES].probe_stats(),
        )
    }
}

/// Records that entry `id` now lives at `pos` in the `side` table.
fn link<K, V>(entries: &mut Slab<Entry<K, V>>, id: usize, side: usize, pos: usize) {
    if let Some(entry) = entries.get_mut(id) {
        entry.slots[side] = pos;
    }
}

impl<K, V, S> PartialEq for BidiMap<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq,
    S: BuildHasher,
{
    /// Two maps are equal if they hold the same pairs, regardless of
    /// capacity, load factor or layout.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, value)| {
                other
                    .locate_key(key)
                    .and_then(|(_, id)| other.entries.get(id))
                    .is_some_and(|entry| entry.value == *value)
            })
    }
}

impl<K, V, S> Eq for BidiMap<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq,
    S: BuildHasher,
{
}

impl<'a, K, V, S> IntoIterator for &'a BidiMap<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq,
    S: BuildHasher,
{
    type IntoIter = Iter<'a, K, V>;
    type Item = (&'a K, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the pairs of a [`BidiMap`].
///
/// Created by [`BidiMap::iter`].
pub struct Iter<'a, K, V> {
    slots: crate::robin_hood::Iter<'a, usize>,
    entries: &'a Slab<Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        self.slots
            .by_ref()
            .find_map(|(_, &id)| entries.get(id).map(|e| (&e.key, &e.value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        while let Some((_, &id)) = self.slots.next_back() {
            if let Some(entry) = entries.get(id) {
                return Some((&entry.key, &entry.value));
            }
        }
        None
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

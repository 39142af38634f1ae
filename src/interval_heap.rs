use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt::Debug;

use crate::callbacks::NotifyExt;
use crate::callbacks::SharedCallbacks;
use crate::error::Error;
use crate::error::Result;

/// A three-way ordering over `T`.
///
/// Implemented for [`Natural`] when `T: Ord`, and for any
/// `Fn(&T, &T) -> Ordering` closure.
pub trait Comparator<T> {
    /// Compares `a` with `b`.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Orders values by their [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<T> Comparator<T> for Natural
where
    T: Ord,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

impl<T, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// A double-ended priority queue.
///
/// Values are kept in pairs: node `p` stores its minimum at index `2p` and
/// its maximum at `2p + 1`. The minimums form a min-heap, the maximums a
/// max-heap, and every node's interval contains the intervals of its
/// children. When the length is odd the last node holds a single value,
/// which counts as both its minimum and its maximum.
///
/// Both ends are available in O(1); inserts and removals at either end are
/// O(log n). The backing store grows fourfold when full.
///
/// ## Example
///
/// ```rust
/// use robin_heap::IntervalHeap;
///
/// let mut heap = IntervalHeap::with_capacity(8).unwrap();
/// for v in [5, 1, 8, 3] {
///     heap.insert(v).unwrap();
/// }
///
/// assert_eq!(heap.min(), Ok(&1));
/// assert_eq!(heap.max(), Ok(&8));
///
/// assert_eq!(heap.remove_max(), Ok(8));
/// assert_eq!(heap.remove_min(), Ok(1));
/// assert_eq!(heap.into_sorted_vec(), vec![3, 5]);
/// ```
#[derive(Clone)]
pub struct IntervalHeap<T, C = Natural> {
    values: Vec<T>,
    /// Number of values the heap holds before growing. Always even.
    capacity: usize,
    comparator: C,
    callbacks: Option<SharedCallbacks>,
}

impl<T, C> Debug for IntervalHeap<T, C>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IntervalHeap")
            .field("values", &self.values)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> IntervalHeap<T>
where
    T: Ord,
{
    /// Creates a heap ordered by `T`'s [`Ord`] implementation.
    ///
    /// See [`with_capacity_and_comparator`](Self::with_capacity_and_comparator)
    /// for the failure modes.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_comparator(capacity, Natural)
    }
}

fn even_capacity(capacity: usize) -> Result<usize> {
    if capacity == 0 || capacity == usize::MAX {
        return Err(Error::Invalid);
    }

    Ok(capacity + (capacity & 1))
}

impl<T, C> IntervalHeap<T, C>
where
    C: Comparator<T>,
{
    /// Creates a heap able to hold `capacity` values, rounded up to an even
    /// number, before growing.
    ///
    /// Fails with [`Error::Invalid`] if `capacity` is zero or `usize::MAX`,
    /// and with [`Error::Alloc`] if the backing store cannot be allocated.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Result<Self> {
        let capacity = even_capacity(capacity)?;

        let mut values = Vec::new();
        values
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Alloc)?;

        Ok(Self {
            values,
            capacity,
            comparator,
            callbacks: None,
        })
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the heap holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of values the heap holds before growing.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the next insert will grow the backing store.
    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    /// Returns the comparator ordering this heap.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Replaces the callbacks fired by this heap. `None` disables them.
    pub fn set_callbacks(&mut self, callbacks: Option<SharedCallbacks>) {
        self.callbacks = callbacks;
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        self.comparator.compare(&self.values[a], &self.values[b]) == Ordering::Less
    }

    /// Index of node `node`'s maximum, which is its minimum on a lone node.
    #[inline]
    fn max_index(&self, node: usize) -> usize {
        if 2 * node + 1 < self.values.len() {
            2 * node + 1
        } else {
            2 * node
        }
    }

    fn grow(&mut self) -> Result<()> {
        let capacity = self.capacity.checked_mul(4).ok_or(Error::Alloc)?;
        self.values
            .try_reserve_exact(capacity - self.values.len())
            .map_err(|_| Error::Alloc)?;

        tracing::debug!(from = self.capacity, to = capacity, "grew interval heap");
        self.capacity = capacity;
        self.callbacks.notify(|cb| cb.on_resize());
        Ok(())
    }

    /// Inserts `value`, growing the backing store if the heap is full.
    pub fn insert(&mut self, value: T) -> Result<()> {
        if self.is_full() {
            self.grow()?;
        }

        self.values.push(value);
        let mut pos = self.values.len() - 1;

        // Completing a pair: keep min <= max within it.
        if pos % 2 == 1 && self.less(pos, pos - 1) {
            self.values.swap(pos - 1, pos);
            pos -= 1;
        }

        if pos >= 2 {
            let parent = (pos / 2 - 1) / 2;
            if self.less(pos, 2 * parent) {
                self.float_up_min(pos);
            } else if self.less(2 * parent + 1, pos) {
                self.float_up_max(pos);
            }
        }

        self.callbacks.notify(|cb| cb.on_create());
        Ok(())
    }

    fn float_up_min(&mut self, mut pos: usize) {
        let mut node = pos / 2;
        while node > 0 {
            let parent = (node - 1) / 2;
            if !self.less(pos, 2 * parent) {
                break;
            }

            self.values.swap(pos, 2 * parent);
            pos = 2 * parent;
            node = parent;
        }
    }

    fn float_up_max(&mut self, mut pos: usize) {
        let mut node = pos / 2;
        while node > 0 {
            let parent = (node - 1) / 2;
            if !self.less(2 * parent + 1, pos) {
                break;
            }

            self.values.swap(pos, 2 * parent + 1);
            pos = 2 * parent + 1;
            node = parent;
        }
    }

    /// Restores the heap after the root minimum was replaced.
    fn float_down_min(&mut self) {
        let len = self.values.len();
        let mut node = 0;

        loop {
            let min = 2 * node;
            if min + 1 < len && self.less(min + 1, min) {
                self.values.swap(min, min + 1);
            }

            let left = 2 * (2 * node + 1);
            if left >= len {
                break;
            }

            let right = left + 2;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };

            if !self.less(child, min) {
                break;
            }

            self.values.swap(min, child);
            node = child / 2;
        }
    }

    /// Restores the heap after the root maximum was replaced.
    fn float_down_max(&mut self) {
        let len = self.values.len();
        let mut node = 0;

        loop {
            let max = 2 * node + 1;
            if max >= len {
                break;
            }
            if self.less(max, max - 1) {
                self.values.swap(max - 1, max);
            }

            let left = 2 * node + 1;
            if 2 * left >= len {
                break;
            }

            let mut child = self.max_index(left);
            let right = left + 1;
            if 2 * right < len {
                let candidate = self.max_index(right);
                if self.less(child, candidate) {
                    child = candidate;
                }
            }

            if !self.less(max, child) {
                break;
            }

            self.values.swap(max, child);
            node = child / 2;
        }
    }

    /// Returns the smallest value.
    pub fn min(&self) -> Result<&T> {
        self.values.first().ok_or(Error::Empty)
    }

    /// Returns the largest value.
    pub fn max(&self) -> Result<&T> {
        match self.values.len() {
            0 => Err(Error::Empty),
            1 => Ok(&self.values[0]),
            _ => Ok(&self.values[1]),
        }
    }

    /// Removes and returns the smallest value.
    pub fn remove_min(&mut self) -> Result<T> {
        let len = self.values.len();
        if len == 0 {
            return Err(Error::Empty);
        }

        let min = if len <= 2 {
            self.values.remove(0)
        } else {
            // The last node gives up its minimum. A full node keeps its
            // maximum as a lone value.
            let last = if len % 2 == 0 {
                self.values.swap_remove(len - 2)
            } else {
                self.values.pop().ok_or(Error::Corrupted)?
            };
            let min = core::mem::replace(&mut self.values[0], last);
            self.float_down_min();
            min
        };

        self.callbacks.notify(|cb| cb.on_delete());
        Ok(min)
    }

    /// Removes and returns the largest value.
    pub fn remove_max(&mut self) -> Result<T> {
        let len = self.values.len();
        if len == 0 {
            return Err(Error::Empty);
        }

        let last = self.values.pop().ok_or(Error::Corrupted)?;
        let max = if len <= 2 {
            last
        } else {
            let max = core::mem::replace(&mut self.values[1], last);
            self.float_down_max();
            max
        };

        self.callbacks.notify(|cb| cb.on_delete());
        Ok(max)
    }

    /// Replaces the smallest value with `value`, returning the old minimum.
    ///
    /// If `value` is larger than the current maximum it becomes the new
    /// maximum and the old maximum sinks through the minimums.
    pub fn update_min(&mut self, value: T) -> Result<T> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let old = core::mem::replace(&mut self.values[0], value);
        self.float_down_min();

        self.callbacks.notify(|cb| cb.on_update());
        Ok(old)
    }

    /// Replaces the largest value with `value`, returning the old maximum.
    ///
    /// If `value` is smaller than the current minimum it becomes the new
    /// minimum and the old minimum sinks through the maximums.
    pub fn update_max(&mut self, value: T) -> Result<T> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let root = self.max_index(0);
        let old = core::mem::replace(&mut self.values[root], value);
        if root == 1 {
            self.float_down_max();
        }

        self.callbacks.notify(|cb| cb.on_update());
        Ok(old)
    }

    /// Returns `true` if some value compares equal to `value`.
    pub fn contains(&self, value: &T) -> bool {
        self.callbacks.notify(|cb| cb.on_read());
        self.values
            .iter()
            .any(|v| self.comparator.compare(v, value) == Ordering::Equal)
    }

    /// Returns the value stored at `index` of the internal layout.
    ///
    /// Index 0 is the minimum and index 1 the maximum; beyond that the
    /// layout is only meaningful in terms of the heap invariants.
    pub fn get(&self, index: usize) -> Result<&T> {
        self.values.get(index).ok_or(Error::Range)
    }

    /// Changes the capacity to `capacity`, rounded up to an even number.
    ///
    /// Fails with [`Error::Invalid`] if `capacity` is below the current
    /// length, zero or `usize::MAX`, and with [`Error::Alloc`] if the backing
    /// store cannot grow. The heap is unchanged on failure.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.values.len() {
            return Err(Error::Invalid);
        }

        let capacity = even_capacity(capacity)?;
        if capacity > self.values.capacity() {
            self.values
                .try_reserve_exact(capacity - self.values.len())
                .map_err(|_| Error::Alloc)?;
        } else {
            self.values.shrink_to(capacity);
        }

        tracing::debug!(from = self.capacity, to = capacity, "resized interval heap");
        self.capacity = capacity;
        self.callbacks.notify(|cb| cb.on_resize());
        Ok(())
    }

    /// Removes every value, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Returns an iterator over the values in the internal layout.
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.values.iter()
    }

    /// Drains the heap into a vector in ascending order.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut sorted = Vec::with_capacity(self.values.len());
        while let Ok(value) = self.remove_min() {
            sorted.push(value);
        }
        sorted
    }
}

impl<T, C> PartialEq for IntervalHeap<T, C>
where
    C: Comparator<T>,
{
    /// Two heaps are equal if they hold the same values under this heap's
    /// comparator, regardless of layout or capacity.
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        let compare = |a: &&T, b: &&T| self.comparator.compare(a, b);

        let mut ours: Vec<&T> = self.values.iter().collect();
        let mut theirs: Vec<&T> = other.values.iter().collect();
        ours.sort_by(compare);
        theirs.sort_by(compare);

        ours.iter()
            .zip(&theirs)
            .all(|(a, b)| compare(a, b) == Ordering::Equal)
    }
}

impl<'a, T, C> IntoIterator for &'a IntervalHeap<T, C>
where
    C: Comparator<T>,
{
    type IntoIter = core::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A bidirectional map backed by two Robin Hood hash tables.
///
/// This module provides a `BidiMap` that keeps a bijection between keys and
/// values, with constant expected time lookups in both directions.
pub mod bidi_map;

mod callbacks;
mod error;

/// A double-ended priority queue stored as an interval heap.
pub mod interval_heap;

/// A hash multimap backed by a Robin Hood hash table.
///
/// This module provides a `MultiMap` where a key may map to several values.
pub mod multi_map;

mod primes;

pub mod robin_hood;

pub use bidi_map::BidiMap;
pub use callbacks::Callbacks;
pub use callbacks::SharedCallbacks;
pub use error::Error;
pub use error::Result;
pub use interval_heap::Comparator;
pub use interval_heap::IntervalHeap;
pub use interval_heap::Natural;
pub use multi_map::MultiMap;
pub use robin_hood::RobinHoodTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used by the hash containers unless another is
        /// supplied.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used by the hash containers unless another is
        /// supplied.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Hasher builder used by the hash containers unless another is
        /// supplied.
        #[allow(deprecated)]
        pub type DefaultHashBuilder = core::hash::BuildHasherDefault<core::hash::SipHasher>;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "load-factor-fifty")] {
        /// Load factor used by the hash containers unless another is
        /// supplied.
        pub const DEFAULT_LOAD_FACTOR: f64 = 0.5;
    } else if #[cfg(feature = "load-factor-ninety")] {
        /// Load factor used by the hash containers unless another is
        /// supplied.
        pub const DEFAULT_LOAD_FACTOR: f64 = 0.9;
    } else {
        /// Load factor used by the hash containers unless another is
        /// supplied.
        pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;
    }
}

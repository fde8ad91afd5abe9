// SPDX-License-Identifier: Apache-2.0

//! FASH library
//!
//! Fixed-capacity hash tables and exact-match search over sorted integer
//! arrays, both built around one primitive: compare many keys against a
//! needle in a single wide instruction and act on the resulting bitmask.
//!
//! - Block binary search over sorted `i16` / `i32` / `i64` arrays
//! - 16-target bulk search over sorted `i32` arrays
//! - Bucket hash tables from `u64` keys to any `Copy` value, with 16- or
//!   128-slot buckets and parallel or interleaved key/value storage
//! - A closed-form overflow model for sizing tables up front
//!
//! ## Hardware support
//! - **AVX2 / NEON** are used on stable Rust where available
//! - **AVX-512** is available behind the `fash-nightly` feature
//! - `disable-simd` forces the scalar kernels everywhere
//!
//! ## Usage
//!
//! ```rust
//! use fash::{FashError, FlatTable};
//!
//! // Sorted-array search
//! let v: Vec<i32> = (0..=1030).collect();
//! assert_eq!(fash::index_match_i32(&v, 503), Some(503));
//!
//! // Bucket table: 2^10 buckets of 16 slots
//! let mut table = FlatTable::<u32>::new(10)?;
//! table.insert(42, 7)?;
//! assert_eq!(table.get(42), Some(&7));
//! assert_eq!(table.insert(0, 1), Err(FashError::InvalidKey));
//!
//! // Check available SIMD capabilities
//! let caps = fash::get_hw_capabilities();
//! println!("Has AVX-512: {}", caps.has_avx512);
//! # Ok::<(), FashError>(())
//! ```

#![allow(clippy::missing_safety_doc)]

pub mod aligned;
pub mod capacity;
pub mod constants;
pub mod dispatch;
pub mod hash;
pub mod probe;
pub mod search;
pub mod table;
pub mod types;

pub use dispatch::*;
pub use types::*;

pub use capacity::{bucket_overflow_probability, recommend_bits, table_overflow_probability};
pub use hash::{mix64, mix64_x8};
pub use search::SearchLane;
pub use table::{
    BucketTable, Flat16, FlatKvTable, FlatTable, Geometry, InterleavedSlots, ParallelSlots, Slot,
    SlotStorage, Wide128, WideKvTable, WideTable,
};

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod search_tests;
#[cfg(test)]
#[path = "tests/table_tests.rs"]
mod table_tests;
#[cfg(test)]
#[path = "tests/capacity_tests.rs"]
mod capacity_tests;
#[cfg(test)]
#[path = "tests/probe_tests.rs"]
mod probe_tests;

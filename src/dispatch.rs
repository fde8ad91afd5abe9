// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::needless_range_loop)]
//! # FASH dispatch framework
//!
//! This module picks the instruction set every probe and search kernel runs on
//! and exposes the free-function API of the crate. Detection runs once; the
//! chosen [`Backend`] is cached in a static atomic and is the only shared state
//! in the crate. Tables capture the backend at construction, search functions
//! read it on every call.
//!
//! ## Backend order
//! 1. AVX-512 (F + BW + DQ), only with the `fash-nightly` feature
//! 2. AVX2
//! 3. NEON
//! 4. Scalar
//!
//! The `disable-simd` feature pins everything to the scalar backend.

use std::sync::atomic::{AtomicU8, Ordering};

use log::{debug, trace};

use super::constants::*;

#[cfg(target_arch = "aarch64")]
use std::arch::is_aarch64_feature_detected;

use crate::hash;
use crate::search::{self, SearchLane};
use crate::types::Backend;

// =============================================================================
//  HARDWARE DETECTION & SIMD CAPABILITIES
// =============================================================================

/// Hardware capability detection used by the FASH dispatch layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCapabilities {
    pub has_avx512: bool,
    pub has_avx2: bool,
    pub has_neon: bool,
}

/// Detect SIMD capabilities at runtime.
///
/// - `has_avx512`: AVX-512 F, BW and DQ are all present and the crate was built
///   with `fash-nightly`
/// - `has_avx2`: AVX2 is present
/// - `has_neon`: NEON is present (always true on aarch64)
impl HardwareCapabilities {
    #[inline]
    pub fn detect() -> Self {
        HardwareCapabilities {
            has_avx512: Self::detect_avx512(),
            has_avx2: Self::detect_avx2(),
            has_neon: Self::detect_neon(),
        }
    }

    fn detect_avx512() -> bool {
        #[allow(unused_mut)]
        let mut detected_avx512 = false;

        #[cfg(target_arch = "x86_64")]
        #[cfg(feature = "fash-nightly")]
        if is_x86_feature_detected!("avx512f")
            && is_x86_feature_detected!("avx512bw")
            && is_x86_feature_detected!("avx512dq")
        {
            detected_avx512 = true;
        }

        detected_avx512
    }

    fn detect_avx2() -> bool {
        #[allow(unused_mut)]
        let mut detected_avx2 = false;

        #[cfg(target_arch = "x86_64")]
        if is_x86_feature_detected!("avx2") {
            detected_avx2 = true;
        }

        detected_avx2
    }

    fn detect_neon() -> bool {
        #[allow(unused_mut)]
        let mut detected_neon = false;

        #[cfg(target_arch = "aarch64")]
        if is_aarch64_feature_detected!("neon") {
            detected_neon = true;
        }

        detected_neon
    }

    /// Best backend these capabilities allow.
    pub fn best_backend(&self) -> Backend {
        if cfg!(feature = "disable-simd") {
            return Backend::Scalar;
        }
        if self.has_avx512 {
            Backend::Avx512
        } else if self.has_avx2 {
            Backend::Avx2
        } else if self.has_neon {
            Backend::Neon
        } else {
            Backend::Scalar
        }
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Get information about available SIMD capabilities
#[inline]
pub fn get_hw_capabilities() -> HardwareCapabilities {
    HardwareCapabilities::detect()
}

/// Check if a specific SIMD instruction set is available
///
/// Accepts the backend names `"avx512"`, `"avx2"`, `"neon"` and `"scalar"`.
#[inline]
pub fn has_hw_support(instruction_set: &str) -> bool {
    let caps = get_hw_capabilities();
    match instruction_set {
        "avx512" => caps.has_avx512,
        "avx2" => caps.has_avx2,
        "neon" => caps.has_neon,
        "scalar" => true,
        _ => false,
    }
}

// 0 = not yet detected, otherwise backend_code + 1
static SELECTED_BACKEND: AtomicU8 = AtomicU8::new(0);

fn backend_code(backend: Backend) -> u8 {
    match backend {
        Backend::Scalar => 1,
        Backend::Avx2 => 2,
        Backend::Avx512 => 3,
        Backend::Neon => 4,
    }
}

fn backend_from_code(code: u8) -> Option<Backend> {
    match code {
        1 => Some(Backend::Scalar),
        2 => Some(Backend::Avx2),
        3 => Some(Backend::Avx512),
        4 => Some(Backend::Neon),
        _ => None,
    }
}

/// Backend used by the free functions and by tables built with `new`.
///
/// Detected on first call and cached; later calls are one relaxed load.
#[inline]
pub fn selected_backend() -> Backend {
    if let Some(backend) = backend_from_code(SELECTED_BACKEND.load(Ordering::Relaxed)) {
        return backend;
    }

    let caps = get_hw_capabilities();
    let backend = caps.best_backend();
    debug!(
        "FASH BACKEND: selected {} (avx512={}, avx2={}, neon={}, disable-simd={})",
        backend.name(),
        caps.has_avx512,
        caps.has_avx2,
        caps.has_neon,
        cfg!(feature = "disable-simd")
    );
    SELECTED_BACKEND.store(backend_code(backend), Ordering::Relaxed);
    backend
}

/// Whether kernels for `backend` can run on this CPU and build.
pub fn backend_available(backend: Backend) -> bool {
    if backend == Backend::Scalar {
        return true;
    }
    if cfg!(feature = "disable-simd") {
        return false;
    }
    let caps = get_hw_capabilities();
    match backend {
        Backend::Avx512 => caps.has_avx512,
        Backend::Avx2 => caps.has_avx2,
        Backend::Neon => caps.has_neon,
        Backend::Scalar => true,
    }
}

// =============================================================================
//  SEARCH FUNCTIONS - EXACT MATCH IN SORTED ARRAYS
// =============================================================================

/// Find the index of `find` in an ascending `i16` array with block binary search
///
/// Each step compares one 32-lane block against the target, so a search over
/// `n` elements touches about `log2(n / 32)` blocks plus one masked tail.
///
/// # Arguments
/// * `v` - Ascending array; duplicates allowed
/// * `find` - Value to look for
///
/// # Returns
/// * `Some(i)` with `v[i] == find`
/// * `None` if no element equals `find`
///
/// Unsorted input never reads out of bounds; the answer is then unspecified.
///
/// # Examples
/// ```rust
/// use fash::index_match_i16;
///
/// let v: Vec<i16> = (0..100).collect();
/// assert_eq!(index_match_i16(&v, 42), Some(42));
/// assert_eq!(index_match_i16(&v, 500), None);
/// ```
#[inline]
pub fn index_match_i16(v: &[i16], find: i16) -> Option<usize> {
    trace!("INDEX_MATCH_I16 DISPATCH: v.len()={}, find={}", v.len(), find);
    search::index_match_with(v, find, selected_backend())
}

/// Find the index of `find` in an ascending `i32` array with block binary search
///
/// 16 lanes per block. See [`index_match_i16`] for the contract.
///
/// # Examples
/// ```rust
/// use fash::index_match_i32;
///
/// let v: Vec<i32> = (0..=1030).collect();
/// assert_eq!(index_match_i32(&v, 503), Some(503));
/// assert_eq!(index_match_i32(&v, 10_000), None);
/// ```
#[inline]
pub fn index_match_i32(v: &[i32], find: i32) -> Option<usize> {
    trace!("INDEX_MATCH_I32 DISPATCH: v.len()={}, find={}", v.len(), find);
    search::index_match_with(v, find, selected_backend())
}

/// Find the index of `find` in an ascending `i64` array with block binary search
///
/// 8 lanes per block. See [`index_match_i16`] for the contract.
///
/// # Examples
/// ```rust
/// use fash::index_match_i64;
///
/// let v = [-7i64, -3, 0, 9, 1 << 40];
/// assert_eq!(index_match_i64(&v, 1 << 40), Some(4));
/// assert_eq!(index_match_i64(&v, 1), None);
/// ```
#[inline]
pub fn index_match_i64(v: &[i64], find: i64) -> Option<usize> {
    trace!("INDEX_MATCH_I64 DISPATCH: v.len()={}, find={}", v.len(), find);
    search::index_match_with(v, find, selected_backend())
}

/// Width-generic form of the `index_match_*` family.
#[inline]
pub fn index_match<T: SearchLane>(v: &[T], find: T) -> Option<usize> {
    trace!("INDEX_MATCH DISPATCH: v.len()={}, lanes={}", v.len(), T::LANES);
    search::index_match_with(v, find, selected_backend())
}

/// Resolve 16 targets against one ascending `i32` array in a single pass
///
/// Every lane runs its own branchless bisection; all lanes share the same
/// number of rounds (`ceil(log2(n))`), so the loop always terminates, absent
/// targets included.
///
/// # Returns
/// Per lane, `Some(i)` with `v[i] == targets[lane]`, or `None`.
///
/// # Examples
/// ```rust
/// use fash::bulk_index_match_i32;
///
/// let v: Vec<i32> = (0..1000).map(|i| i * 2).collect();
/// let mut targets = [0i32; 16];
/// for (lane, t) in targets.iter_mut().enumerate() {
///     *t = lane as i32 * 3;
/// }
/// let found = bulk_index_match_i32(&v, &targets);
/// assert_eq!(found[2], Some(3)); // 6 == v[3]
/// assert_eq!(found[1], None); // 3 is odd
/// ```
///
/// # Performance
/// - Arrays shorter than `SIMD_THRESHOLD_BULK_SEARCH`: scalar lanes
/// - Larger arrays: gathered loads on AVX-512 or AVX2
#[inline]
pub fn bulk_index_match_i32(v: &[i32], targets: &[i32; BULK_LANES]) -> [Option<usize>; BULK_LANES] {
    trace!("BULK_INDEX_MATCH_I32 DISPATCH: v.len()={}", v.len());
    if v.len() < SIMD_THRESHOLD_BULK_SEARCH {
        return search::bulk_index_match_i32_scalar(v, targets);
    }
    search::bulk_index_match_i32_with(v, targets, selected_backend())
}

/// Resolve any number of targets, 16 per pass; one result per target, in order
///
/// # Examples
/// ```rust
/// use fash::bulk_index_match_all_i32;
///
/// let v = [1, 4, 9, 16, 25];
/// assert_eq!(bulk_index_match_all_i32(&v, &[9, 10, 1]), vec![Some(2), None, Some(0)]);
/// ```
#[inline]
pub fn bulk_index_match_all_i32(v: &[i32], targets: &[i32]) -> Vec<Option<usize>> {
    trace!(
        "BULK_INDEX_MATCH_ALL_I32 DISPATCH: v.len()={}, targets.len()={}",
        v.len(),
        targets.len()
    );
    let backend = if v.len() < SIMD_THRESHOLD_BULK_SEARCH {
        Backend::Scalar
    } else {
        selected_backend()
    };
    search::bulk_index_match_all_i32_with(v, targets, backend)
}

// =============================================================================
//  HASH FUNCTIONS
// =============================================================================

/// Mix eight keys with the selected backend; lane `i` equals `mix64(keys[i])`
///
/// # Examples
/// ```rust
/// use fash::{mix64, mix64_batch};
///
/// let keys = [1u64, 2, 3, 4, 5, 6, 7, 8];
/// let mixed = mix64_batch(&keys);
/// assert_eq!(mixed[3], mix64(4));
/// ```
#[inline]
pub fn mix64_batch(keys: &[u64; MIX_BATCH]) -> [u64; MIX_BATCH] {
    trace!("MIX64_BATCH DISPATCH");
    hash::mix64_x8(keys, selected_backend())
}

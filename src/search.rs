// SPDX-License-Identifier: Apache-2.0

//! Exact-match search over sorted integer arrays
//!
//! `index_match_with` is a binary search over 512-bit blocks: every step loads
//! one block of `L` lanes and compares all of them against the target at once,
//! so the number of dependent memory round trips drops from `log2(n)` to about
//! `log2(n / L)`. The compare itself goes through [`crate::probe`], which is
//! what makes the same loop run on AVX-512, AVX2, NEON or plain scalar code.
//!
//! `bulk_index_match_i32_*` resolve 16 independent targets against one array,
//! one target per lane, with gathered loads and a branchless bisection step.
//!
//! ## Performance notes
//! Both loops are bounded by construction. Neither reads outside the input
//! slice, sorted or not; an unsorted input just produces an unspecified answer.

#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::all)]

use std::fmt::Debug;

use crate::constants::{BULK_LANES, LANES_512_I16, LANES_512_I32, LANES_512_I64, MAX_SEARCH_PROBES};
use crate::probe::{self, lowest_set_bit};
use crate::types::Backend;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
  __m256i, _mm256_add_epi32, _mm256_andnot_si256, _mm256_castsi256_ps, _mm256_cmpeq_epi32,
  _mm256_cmpgt_epi32, _mm256_i32gather_epi32, _mm256_loadu_si256, _mm256_movemask_ps,
  _mm256_set1_epi32, _mm256_setzero_si256, _mm256_storeu_si256,
};

#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
use std::arch::x86_64::{
  _mm512_add_epi32, _mm512_cmpeq_epi32_mask, _mm512_cmple_epi32_mask, _mm512_i32gather_epi32,
  _mm512_loadu_si512, _mm512_mask_add_epi32, _mm512_set1_epi32, _mm512_setzero_si512,
  _mm512_storeu_si512,
};

#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
use crate::constants::LANES_AVX512_I32;
#[cfg(target_arch = "x86_64")]
use crate::constants::LANES_AVX2_I32;

/// Element types the block search understands.
///
/// `LANES` is the block width: how many elements fit one 512-bit register.
pub trait SearchLane: Copy + PartialOrd + Debug {
  const LANES: usize;

  /// Bit `i` set when `block[i] == find`; `block` holds at most `LANES` elements.
  fn eq_mask(block: &[Self], find: Self, backend: Backend) -> u64;
}

impl SearchLane for i16 {
  const LANES: usize = LANES_512_I16;

  #[inline]
  fn eq_mask(block: &[Self], find: Self, backend: Backend) -> u64 {
    probe::eq_mask_i16(block, find, backend)
  }
}

impl SearchLane for i32 {
  const LANES: usize = LANES_512_I32;

  #[inline]
  fn eq_mask(block: &[Self], find: Self, backend: Backend) -> u64 {
    probe::eq_mask_i32(block, find, backend)
  }
}

impl SearchLane for i64 {
  const LANES: usize = LANES_512_I64;

  #[inline]
  fn eq_mask(block: &[Self], find: Self, backend: Backend) -> u64 {
    probe::eq_mask_i64(block, find, backend)
  }
}

// =============================================================================
//  SINGLE TARGET BLOCK SEARCH
// =============================================================================

/// Find an index `i` with `v[i] == find` in an ascending slice.
///
/// The slice splits into an aligned prefix of whole blocks and a tail shorter
/// than one block. The prefix is bisected block by block: `lo` is the first
/// block still in play and `delta` the number of blocks in play. A hit anywhere
/// in the probed block returns its lowest matching lane. On a miss the first
/// lane decides the side: above `find` keeps `lo` and the lower half, otherwise
/// the block and everything below it are discarded. The tail is compared once
/// with a masked load.
pub fn index_match_with<T: SearchLane>(v: &[T], find: T, backend: Backend) -> Option<usize> {
  let n = v.len();
  if n == 0 {
    return None;
  }

  let lanes = T::LANES;
  let vec_n = n - n % lanes;

  let mut lo = 0usize;
  let mut delta = vec_n / lanes;
  let mut probes = 0usize;

  while delta > 0 {
    probes += 1;
    if probes > MAX_SEARCH_PROBES {
      log::error!("index_match: probe limit exceeded (n={}, lo={}, delta={})", n, lo, delta);
      break;
    }

    let half = delta / 2;
    let mid = (lo + half) * lanes;
    let block = &v[mid..mid + lanes];

    if let Some(lane) = lowest_set_bit(T::eq_mask(block, find, backend)) {
      return Some(mid + lane);
    }

    if block[0] > find {
      delta = half;
    } else {
      lo += half + 1;
      delta -= half + 1;
    }
  }

  let tail = &v[vec_n..];
  if tail.is_empty() {
    return None;
  }
  lowest_set_bit(T::eq_mask(tail, find, backend)).map(|lane| vec_n + lane)
}

// =============================================================================
//  BULK SEARCH (16 TARGETS, ONE ARRAY)
// =============================================================================

// Every lane starts with base 0 and the whole array in play. Each round probes
// `base + half`; lanes whose probed value is <= their target move their base up
// by `half`, the others keep it. `len` shrinks identically for all lanes, so
// after ceil(log2(n)) rounds every base sits on the last element <= its target
// and one final gather settles Found / NotFound per lane.

/// Reference implementation of the 16-lane bulk search.
pub fn bulk_index_match_i32_scalar(v: &[i32], targets: &[i32; BULK_LANES]) -> [Option<usize>; BULK_LANES] {
  let mut out = [None; BULK_LANES];
  let n = v.len();
  if n == 0 {
    return out;
  }

  let mut base = [0usize; BULK_LANES];
  let mut len = n;
  while len > 1 {
    let half = len / 2;
    for lane in 0..BULK_LANES {
      let advance = (v[base[lane] + half] <= targets[lane]) as usize;
      base[lane] += half * advance;
    }
    len -= half;
  }

  for lane in 0..BULK_LANES {
    if v[base[lane]] == targets[lane] {
      out[lane] = Some(base[lane]);
    }
  }
  out
}

// AVX-512 bulk search: one gather per round for all 16 lanes.
//
// # Safety
// Requires AVX-512F, `0 < v.len() <= i32::MAX`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
pub unsafe fn bulk_index_match_i32_avx512(
  v: &[i32],
  targets: &[i32; BULK_LANES],
) -> [Option<usize>; BULK_LANES] {
  const LANES: usize = LANES_AVX512_I32;
  let target_vec = _mm512_loadu_si512(targets.as_ptr().cast());
  let mut base = _mm512_setzero_si512();
  let mut len = v.len();

  while len > 1 {
    let half = len / 2;
    let half_vec = _mm512_set1_epi32(half as i32);
    let probe_idx = _mm512_add_epi32(base, half_vec);
    let values = _mm512_i32gather_epi32::<4>(probe_idx, v.as_ptr().cast());
    let le_mask = _mm512_cmple_epi32_mask(values, target_vec);
    base = _mm512_mask_add_epi32(base, le_mask, base, half_vec);
    len -= half;
  }

  let values = _mm512_i32gather_epi32::<4>(base, v.as_ptr().cast());
  let eq_mask = _mm512_cmpeq_epi32_mask(values, target_vec);

  let mut idx = [0i32; LANES];
  _mm512_storeu_si512(idx.as_mut_ptr().cast(), base);

  let mut out = [None; BULK_LANES];
  for lane in 0..LANES {
    if eq_mask & (1 << lane) != 0 {
      out[lane] = Some(idx[lane] as usize);
    }
  }
  out
}

// AVX2 bulk search: the 16 lanes run as two 8-lane halves sharing each round.
//
// # Safety
// Requires AVX2, `0 < v.len() <= i32::MAX`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn bulk_index_match_i32_avx2(
  v: &[i32],
  targets: &[i32; BULK_LANES],
) -> [Option<usize>; BULK_LANES] {
  const LANES: usize = LANES_AVX2_I32;
  let targets_lo = _mm256_loadu_si256(targets.as_ptr().cast());
  let targets_hi = _mm256_loadu_si256(targets.as_ptr().add(LANES).cast());
  let mut base_lo = _mm256_setzero_si256();
  let mut base_hi = _mm256_setzero_si256();
  let mut len = v.len();

  while len > 1 {
    let half = len / 2;
    let half_vec = _mm256_set1_epi32(half as i32);

    let values_lo = _mm256_i32gather_epi32::<4>(v.as_ptr(), _mm256_add_epi32(base_lo, half_vec));
    let values_hi = _mm256_i32gather_epi32::<4>(v.as_ptr(), _mm256_add_epi32(base_hi, half_vec));

    // Advance where !(value > target), i.e. value <= target.
    let gt_lo = _mm256_cmpgt_epi32(values_lo, targets_lo);
    let gt_hi = _mm256_cmpgt_epi32(values_hi, targets_hi);
    base_lo = _mm256_add_epi32(base_lo, _mm256_andnot_si256(gt_lo, half_vec));
    base_hi = _mm256_add_epi32(base_hi, _mm256_andnot_si256(gt_hi, half_vec));
    len -= half;
  }

  let eq_lo = _mm256_cmpeq_epi32(_mm256_i32gather_epi32::<4>(v.as_ptr(), base_lo), targets_lo);
  let eq_hi = _mm256_cmpeq_epi32(_mm256_i32gather_epi32::<4>(v.as_ptr(), base_hi), targets_hi);
  let eq_mask = (_mm256_movemask_ps(_mm256_castsi256_ps(eq_lo)) as u32 & 0xFF)
    | ((_mm256_movemask_ps(_mm256_castsi256_ps(eq_hi)) as u32 & 0xFF) << LANES);

  let mut idx = [0i32; BULK_LANES];
  _mm256_storeu_si256(idx.as_mut_ptr() as *mut __m256i, base_lo);
  _mm256_storeu_si256(idx.as_mut_ptr().add(LANES) as *mut __m256i, base_hi);

  let mut out = [None; BULK_LANES];
  for lane in 0..BULK_LANES {
    if eq_mask & (1 << lane) != 0 {
      out[lane] = Some(idx[lane] as usize);
    }
  }
  out
}

/// Run the bulk search on `backend`, falling back to the scalar kernel where
/// the backend has no gather or the array is too long for 32-bit indices.
pub fn bulk_index_match_i32_with(
  v: &[i32],
  targets: &[i32; BULK_LANES],
  backend: Backend,
) -> [Option<usize>; BULK_LANES] {
  if v.is_empty() || v.len() > i32::MAX as usize {
    return bulk_index_match_i32_scalar(v, targets);
  }
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { bulk_index_match_i32_avx512(v, targets) },
    #[cfg(target_arch = "x86_64")]
    Backend::Avx2 => unsafe { bulk_index_match_i32_avx2(v, targets) },
    _ => bulk_index_match_i32_scalar(v, targets),
  }
}

/// Bulk search over any number of targets, 16 per pass.
///
/// The last pass is padded with copies of its first target; padded lanes are
/// dropped from the result.
pub fn bulk_index_match_all_i32_with(v: &[i32], targets: &[i32], backend: Backend) -> Vec<Option<usize>> {
  let mut out = Vec::with_capacity(targets.len());
  for chunk in targets.chunks(BULK_LANES) {
    let mut lanes = [chunk[0]; BULK_LANES];
    lanes[..chunk.len()].copy_from_slice(chunk);
    let found = bulk_index_match_i32_with(v, &lanes, backend);
    out.extend_from_slice(&found[..chunk.len()]);
  }
  out
}

// SPDX-License-Identifier: Apache-2.0

//! Vector probe primitives
//!
//! The search and table algorithms are written once against the small set of
//! operations in this module: broadcast a needle, compare it against a block of
//! lanes with one wide equality compare, and hand back a bitmask whose bit `i`
//! is set when lane `i` matched. Partial blocks use masked loads so lanes past
//! the end of the slice are never read and can never match.
//!
//! Each primitive has AVX-512, AVX2, NEON and scalar kernels. The `Backend`
//! argument selects one; the scalar kernel is the reference the others are
//! tested against.

#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::all)]

use crate::constants::{KEYS_PER_CHUNK, LANES_512_I16, LANES_512_I32, LANES_512_I64};
use crate::types::Backend;

#[cfg(target_arch = "x86_64")]
use crate::constants::{LANES_AVX2_I16, LANES_AVX2_I32, LANES_AVX2_U64};
#[cfg(target_arch = "aarch64")]
use crate::constants::{LANES_NEON_I16, LANES_NEON_I32, LANES_NEON_U64};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
  _mm256_castsi256_pd, _mm256_castsi256_ps, _mm256_cmpeq_epi16, _mm256_cmpeq_epi32,
  _mm256_cmpeq_epi64, _mm256_loadu_si256, _mm256_movemask_epi8, _mm256_movemask_pd,
  _mm256_movemask_ps, _mm256_packs_epi16, _mm256_permute4x64_epi64, _mm256_set1_epi16,
  _mm256_set1_epi32, _mm256_set1_epi64x,
};

#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
use std::arch::x86_64::{
  _mm512_cmpeq_epi64_mask, _mm512_i64gather_epi64, _mm512_loadu_si512,
  _mm512_mask_cmpeq_epi16_mask, _mm512_mask_cmpeq_epi32_mask, _mm512_mask_cmpeq_epi64_mask,
  _mm512_maskz_loadu_epi16, _mm512_maskz_loadu_epi32, _mm512_maskz_loadu_epi64,
  _mm512_set1_epi16, _mm512_set1_epi32, _mm512_set1_epi64,
};

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::{
  vaddvq_u16, vaddvq_u32, vaddvq_u64, vandq_u16, vandq_u32, vandq_u64, vceqq_s16, vceqq_s32,
  vceqq_s64, vceqq_u64, vdupq_n_s16, vdupq_n_s32, vdupq_n_s64, vdupq_n_u64, vld1q_s16,
  vld1q_s32, vld1q_s64, vld1q_u16, vld1q_u32, vld1q_u64,
};

#[cfg(target_arch = "aarch64")]
const NEON_BIT_WEIGHTS_U16: [u16; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
#[cfg(target_arch = "aarch64")]
const NEON_BIT_WEIGHTS_U32: [u32; 4] = [1, 2, 4, 8];
#[cfg(target_arch = "aarch64")]
const NEON_BIT_WEIGHTS_U64: [u64; 2] = [1, 2];

/// Index of the lowest set bit, `None` for an empty mask.
#[inline(always)]
pub fn lowest_set_bit(mask: u64) -> Option<usize> {
  if mask == 0 {
    None
  } else {
    Some(mask.trailing_zeros() as usize)
  }
}

/// Record type whose first field is its `u64` key.
///
/// # Safety
/// Implementors must be `#[repr(C)]` with the key stored at offset 0, so
/// gathers at multiples of `size_of::<Self>()` read exactly the keys.
pub unsafe trait KeyedRecord: Copy {
  fn key(&self) -> u64;
}

// =============================================================================
//  U64 KEY CHUNKS (hash table, parallel layout)
// =============================================================================

/// Compare eight contiguous keys against `needle`.
///
/// Bit `i` of the result is set when `chunk[i] == needle`. Chunks shorter than
/// eight keys are compared lane by lane.
#[inline]
pub fn eq_mask_u64x8(chunk: &[u64], needle: u64, backend: Backend) -> u8 {
  if chunk.len() < KEYS_PER_CHUNK {
    return eq_mask_u64x8_scalar(chunk, needle);
  }
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { eq_mask_u64x8_avx512(chunk, needle) },
    #[cfg(target_arch = "x86_64")]
    Backend::Avx2 => unsafe { eq_mask_u64x8_avx2(chunk, needle) },
    #[cfg(target_arch = "aarch64")]
    Backend::Neon => unsafe { eq_mask_u64x8_neon(chunk, needle) },
    _ => eq_mask_u64x8_scalar(chunk, needle),
  }
}

#[inline]
pub fn eq_mask_u64x8_scalar(chunk: &[u64], needle: u64) -> u8 {
  let mut mask = 0u8;
  for (i, &key) in chunk.iter().take(KEYS_PER_CHUNK).enumerate() {
    mask |= ((key == needle) as u8) << i;
  }
  mask
}

// AVX-512: one load, one compare, the compare result is already the mask.
//
// # Safety
// Requires AVX-512F and `chunk.len() >= 8`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
#[inline]
pub unsafe fn eq_mask_u64x8_avx512(chunk: &[u64], needle: u64) -> u8 {
  let keys = _mm512_loadu_si512(chunk.as_ptr().cast());
  _mm512_cmpeq_epi64_mask(keys, _mm512_set1_epi64(needle as i64))
}

// AVX2: two 4-lane halves, movemask_pd yields one bit per 64-bit lane.
//
// # Safety
// Requires AVX2 and `chunk.len() >= 8`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn eq_mask_u64x8_avx2(chunk: &[u64], needle: u64) -> u8 {
  let needle_vec = _mm256_set1_epi64x(needle as i64);
  let lo = _mm256_loadu_si256(chunk.as_ptr().cast());
  let hi = _mm256_loadu_si256(chunk.as_ptr().add(LANES_AVX2_U64).cast());
  let lo_mask = _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpeq_epi64(lo, needle_vec)));
  let hi_mask = _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpeq_epi64(hi, needle_vec)));
  (lo_mask | (hi_mask << LANES_AVX2_U64)) as u8
}

// NEON: four 2-lane compares, lane bits folded with a weighted horizontal add.
//
// # Safety
// Requires NEON and `chunk.len() >= 8`.
#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
pub unsafe fn eq_mask_u64x8_neon(chunk: &[u64], needle: u64) -> u8 {
  let needle_vec = vdupq_n_u64(needle);
  let weights = vld1q_u64(NEON_BIT_WEIGHTS_U64.as_ptr());
  let mut mask = 0u8;
  for part in 0..KEYS_PER_CHUNK / LANES_NEON_U64 {
    let keys = vld1q_u64(chunk.as_ptr().add(part * LANES_NEON_U64));
    let bits = vaddvq_u64(vandq_u64(vceqq_u64(keys, needle_vec), weights)) as u8;
    mask |= bits << (part * LANES_NEON_U64);
  }
  mask
}

// =============================================================================
//  KEYED RECORDS (hash table, interleaved layout)
// =============================================================================

/// Compare the keys of up to eight consecutive records against `needle`.
///
/// On AVX-512 the keys are pulled out of the records with one strided gather;
/// elsewhere they are compared one record at a time.
#[inline]
pub fn eq_mask_keyed_x8<T: KeyedRecord>(records: &[T], needle: u64, backend: Backend) -> u8 {
  if records.len() < KEYS_PER_CHUNK {
    return eq_mask_keyed_x8_scalar(records, needle);
  }
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { eq_mask_keyed_x8_avx512(records, needle) },
    _ => eq_mask_keyed_x8_scalar(records, needle),
  }
}

#[inline]
pub fn eq_mask_keyed_x8_scalar<T: KeyedRecord>(records: &[T], needle: u64) -> u8 {
  let mut mask = 0u8;
  for (i, record) in records.iter().take(KEYS_PER_CHUNK).enumerate() {
    mask |= ((record.key() == needle) as u8) << i;
  }
  mask
}

// # Safety
// Requires AVX-512F and `records.len() >= 8`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
#[inline]
pub unsafe fn eq_mask_keyed_x8_avx512<T: KeyedRecord>(records: &[T], needle: u64) -> u8 {
  let stride = std::mem::size_of::<T>() as i64;
  let byte_offsets: [i64; 8] = [
    0,
    stride,
    2 * stride,
    3 * stride,
    4 * stride,
    5 * stride,
    6 * stride,
    7 * stride,
  ];
  let offsets = _mm512_loadu_si512(byte_offsets.as_ptr().cast());
  let keys = _mm512_i64gather_epi64::<1>(offsets, records.as_ptr().cast());
  _mm512_cmpeq_epi64_mask(keys, _mm512_set1_epi64(needle as i64))
}

// =============================================================================
//  SEARCH BLOCKS (i16 / i32 / i64)
// =============================================================================

/// Compare up to 32 `i16` lanes against `find`.
///
/// A full block is one 512-bit register. A shorter block is loaded under a
/// lane mask and compared under the same mask, so lanes past `block.len()`
/// report no match even when the fill value equals `find`.
#[inline]
pub fn eq_mask_i16(block: &[i16], find: i16, backend: Backend) -> u64 {
  let len = block.len().min(LANES_512_I16);
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { eq_mask_i16_avx512(block, find, len) },
    #[cfg(target_arch = "x86_64")]
    Backend::Avx2 if len == LANES_512_I16 => unsafe { eq_mask_i16_avx2(block, find) },
    #[cfg(target_arch = "aarch64")]
    Backend::Neon if len == LANES_512_I16 => unsafe { eq_mask_i16_neon(block, find) },
    _ => eq_mask_i16_scalar(&block[..len], find),
  }
}

#[inline]
pub fn eq_mask_i16_scalar(block: &[i16], find: i16) -> u64 {
  let mut mask = 0u64;
  for (i, &value) in block.iter().take(LANES_512_I16).enumerate() {
    mask |= ((value == find) as u64) << i;
  }
  mask
}

// # Safety
// Requires AVX-512F + AVX-512BW and `len <= block.len()`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f,avx512bw")]
#[inline]
pub unsafe fn eq_mask_i16_avx512(block: &[i16], find: i16, len: usize) -> u64 {
  let load_mask: u32 = if len >= LANES_512_I16 {
    u32::MAX
  } else {
    (1u32 << len) - 1
  };
  let values = _mm512_maskz_loadu_epi16(load_mask, block.as_ptr());
  _mm512_mask_cmpeq_epi16_mask(load_mask, values, _mm512_set1_epi16(find)) as u64
}

// AVX2 has no 16-bit movemask: compare two halves, saturate-pack the 16-bit
// results down to bytes, undo the per-128-bit-lane interleave of the pack and
// take the byte movemask.
//
// # Safety
// Requires AVX2 and `block.len() >= 32`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn eq_mask_i16_avx2(block: &[i16], find: i16) -> u64 {
  let find_vec = _mm256_set1_epi16(find);
  let lo = _mm256_loadu_si256(block.as_ptr().cast());
  let hi = _mm256_loadu_si256(block.as_ptr().add(LANES_AVX2_I16).cast());
  let packed = _mm256_packs_epi16(
    _mm256_cmpeq_epi16(lo, find_vec),
    _mm256_cmpeq_epi16(hi, find_vec),
  );
  let ordered = _mm256_permute4x64_epi64::<0b11_01_10_00>(packed);
  (_mm256_movemask_epi8(ordered) as u32) as u64
}

// # Safety
// Requires NEON and `block.len() >= 32`.
#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
pub unsafe fn eq_mask_i16_neon(block: &[i16], find: i16) -> u64 {
  let find_vec = vdupq_n_s16(find);
  let weights = vld1q_u16(NEON_BIT_WEIGHTS_U16.as_ptr());
  let mut mask = 0u64;
  for part in 0..LANES_512_I16 / LANES_NEON_I16 {
    let values = vld1q_s16(block.as_ptr().add(part * LANES_NEON_I16));
    let bits = vaddvq_u16(vandq_u16(vceqq_s16(values, find_vec), weights)) as u64;
    mask |= bits << (part * LANES_NEON_I16);
  }
  mask
}

/// Compare up to 16 `i32` lanes against `find`. Same masking rules as [`eq_mask_i16`].
#[inline]
pub fn eq_mask_i32(block: &[i32], find: i32, backend: Backend) -> u64 {
  let len = block.len().min(LANES_512_I32);
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { eq_mask_i32_avx512(block, find, len) },
    #[cfg(target_arch = "x86_64")]
    Backend::Avx2 if len == LANES_512_I32 => unsafe { eq_mask_i32_avx2(block, find) },
    #[cfg(target_arch = "aarch64")]
    Backend::Neon if len == LANES_512_I32 => unsafe { eq_mask_i32_neon(block, find) },
    _ => eq_mask_i32_scalar(&block[..len], find),
  }
}

#[inline]
pub fn eq_mask_i32_scalar(block: &[i32], find: i32) -> u64 {
  let mut mask = 0u64;
  for (i, &value) in block.iter().take(LANES_512_I32).enumerate() {
    mask |= ((value == find) as u64) << i;
  }
  mask
}

// # Safety
// Requires AVX-512F and `len <= block.len()`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
#[inline]
pub unsafe fn eq_mask_i32_avx512(block: &[i32], find: i32, len: usize) -> u64 {
  let load_mask: u16 = if len >= LANES_512_I32 {
    u16::MAX
  } else {
    (1u16 << len) - 1
  };
  let values = _mm512_maskz_loadu_epi32(load_mask, block.as_ptr());
  _mm512_mask_cmpeq_epi32_mask(load_mask, values, _mm512_set1_epi32(find)) as u64
}

// # Safety
// Requires AVX2 and `block.len() >= 16`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn eq_mask_i32_avx2(block: &[i32], find: i32) -> u64 {
  let find_vec = _mm256_set1_epi32(find);
  let lo = _mm256_loadu_si256(block.as_ptr().cast());
  let hi = _mm256_loadu_si256(block.as_ptr().add(LANES_AVX2_I32).cast());
  let lo_mask = _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpeq_epi32(lo, find_vec))) as u64;
  let hi_mask = _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpeq_epi32(hi, find_vec))) as u64;
  (lo_mask & 0xFF) | ((hi_mask & 0xFF) << LANES_AVX2_I32)
}

// # Safety
// Requires NEON and `block.len() >= 16`.
#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
pub unsafe fn eq_mask_i32_neon(block: &[i32], find: i32) -> u64 {
  let find_vec = vdupq_n_s32(find);
  let weights = vld1q_u32(NEON_BIT_WEIGHTS_U32.as_ptr());
  let mut mask = 0u64;
  for part in 0..LANES_512_I32 / LANES_NEON_I32 {
    let values = vld1q_s32(block.as_ptr().add(part * LANES_NEON_I32));
    let bits = vaddvq_u32(vandq_u32(vceqq_s32(values, find_vec), weights)) as u64;
    mask |= bits << (part * LANES_NEON_I32);
  }
  mask
}

/// Compare up to 8 `i64` lanes against `find`. Same masking rules as [`eq_mask_i16`].
#[inline]
pub fn eq_mask_i64(block: &[i64], find: i64, backend: Backend) -> u64 {
  let len = block.len().min(LANES_512_I64);
  match backend {
    #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
    Backend::Avx512 => unsafe { eq_mask_i64_avx512(block, find, len) },
    #[cfg(target_arch = "x86_64")]
    Backend::Avx2 if len == LANES_512_I64 => unsafe { eq_mask_i64_avx2(block, find) },
    #[cfg(target_arch = "aarch64")]
    Backend::Neon if len == LANES_512_I64 => unsafe { eq_mask_i64_neon(block, find) },
    _ => eq_mask_i64_scalar(&block[..len], find),
  }
}

#[inline]
pub fn eq_mask_i64_scalar(block: &[i64], find: i64) -> u64 {
  let mut mask = 0u64;
  for (i, &value) in block.iter().take(LANES_512_I64).enumerate() {
    mask |= ((value == find) as u64) << i;
  }
  mask
}

// # Safety
// Requires AVX-512F and `len <= block.len()`.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
#[inline]
pub unsafe fn eq_mask_i64_avx512(block: &[i64], find: i64, len: usize) -> u64 {
  let load_mask: u8 = if len >= LANES_512_I64 {
    u8::MAX
  } else {
    (1u8 << len) - 1
  };
  let values = _mm512_maskz_loadu_epi64(load_mask, block.as_ptr());
  _mm512_mask_cmpeq_epi64_mask(load_mask, values, _mm512_set1_epi64(find)) as u64
}

// # Safety
// Requires AVX2 and `block.len() >= 8`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn eq_mask_i64_avx2(block: &[i64], find: i64) -> u64 {
  let find_vec = _mm256_set1_epi64x(find);
  let lo = _mm256_loadu_si256(block.as_ptr().cast());
  let hi = _mm256_loadu_si256(block.as_ptr().add(LANES_AVX2_U64).cast());
  let lo_mask = _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpeq_epi64(lo, find_vec))) as u64;
  let hi_mask = _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpeq_epi64(hi, find_vec))) as u64;
  (lo_mask & 0xF) | ((hi_mask & 0xF) << LANES_AVX2_U64)
}

// # Safety
// Requires NEON and `block.len() >= 8`.
#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
pub unsafe fn eq_mask_i64_neon(block: &[i64], find: i64) -> u64 {
  let find_vec = vdupq_n_s64(find);
  let weights = vld1q_u64(NEON_BIT_WEIGHTS_U64.as_ptr());
  let mut mask = 0u64;
  for part in 0..LANES_512_I64 / LANES_NEON_U64 {
    let values = vld1q_s64(block.as_ptr().add(part * LANES_NEON_U64));
    let bits = vaddvq_u64(vandq_u64(vceqq_s64(values, find_vec), weights));
    mask |= bits << (part * LANES_NEON_U64);
  }
  mask
}

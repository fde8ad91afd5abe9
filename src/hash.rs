// SPDX-License-Identifier: Apache-2.0

//! Avalanche mixer and bucket/probe derivation
//!
//! Three xorshift-multiply rounds spread every input bit over the whole word.
//! This is a dispersion function for bucket selection, not a cryptographic
//! hash. The low bits of the mixed value pick the bucket, the high bits pick
//! where the probe starts inside it; the two never overlap for supported
//! table sizes.

#![allow(unsafe_op_in_unsafe_fn)]

use crate::constants::*;
use crate::types::Backend;

#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
use std::arch::x86_64::{
    _mm512_loadu_si512, _mm512_mullo_epi64, _mm512_set1_epi64, _mm512_srli_epi64,
    _mm512_storeu_si512, _mm512_xor_si512,
};

/// Mix one key.
///
/// `mix64(0) == 0`, which is why key 0 doubles as the empty-slot sentinel.
#[inline(always)]
pub const fn mix64(key: u64) -> u64 {
    let mut x = key;
    x = (x ^ (x >> MIX_SHIFT_1A) ^ (x >> MIX_SHIFT_1B)).wrapping_mul(MIX_MUL_1);
    x = (x ^ (x >> MIX_SHIFT_2A) ^ (x >> MIX_SHIFT_2B)).wrapping_mul(MIX_MUL_2);
    x ^ (x >> MIX_SHIFT_3A) ^ (x >> MIX_SHIFT_3B)
}

/// Mix eight keys at once. Lane `i` of the result equals `mix64(keys[i])`.
#[inline]
pub fn mix64_x8(keys: &[u64; MIX_BATCH], backend: Backend) -> [u64; MIX_BATCH] {
    match backend {
        #[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
        Backend::Avx512 => unsafe { mix64_x8_avx512(keys) },
        _ => mix64_x8_scalar(keys),
    }
}

#[inline]
pub fn mix64_x8_scalar(keys: &[u64; MIX_BATCH]) -> [u64; MIX_BATCH] {
    let mut out = [0u64; MIX_BATCH];
    for (dst, &key) in out.iter_mut().zip(keys.iter()) {
        *dst = mix64(key);
    }
    out
}

// 64-bit lane multiplies need AVX-512DQ; AVX2 and NEON have no equivalent,
// so those backends use the scalar form.
//
// # Safety
// Requires AVX-512F + AVX-512DQ.
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f,avx512dq")]
#[inline]
pub unsafe fn mix64_x8_avx512(keys: &[u64; MIX_BATCH]) -> [u64; MIX_BATCH] {
    let mul_1 = _mm512_set1_epi64(MIX_MUL_1 as i64);
    let mul_2 = _mm512_set1_epi64(MIX_MUL_2 as i64);

    let mut x = _mm512_loadu_si512(keys.as_ptr().cast());
    let a = _mm512_srli_epi64::<31>(x);
    let b = _mm512_srli_epi64::<62>(x);
    x = _mm512_mullo_epi64(_mm512_xor_si512(x, _mm512_xor_si512(a, b)), mul_1);
    let a = _mm512_srli_epi64::<27>(x);
    let b = _mm512_srli_epi64::<54>(x);
    x = _mm512_mullo_epi64(_mm512_xor_si512(x, _mm512_xor_si512(a, b)), mul_2);
    let a = _mm512_srli_epi64::<30>(x);
    let b = _mm512_srli_epi64::<60>(x);
    x = _mm512_xor_si512(x, _mm512_xor_si512(a, b));

    let mut out = [0u64; MIX_BATCH];
    _mm512_storeu_si512(out.as_mut_ptr().cast(), x);
    out
}

/// Bucket index from the low `bucket_bits` bits of a mixed hash.
#[inline(always)]
pub fn bucket_index(hash: u64, bucket_bits: u32) -> usize {
    let mask = if bucket_bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bucket_bits) - 1
    };
    (hash & mask) as usize
}

/// Probe start offset inside a bucket from the top `slot_bits` bits of a mixed hash.
#[inline(always)]
pub fn probe_offset(hash: u64, slot_bits: u32) -> usize {
    if slot_bits == 0 {
        0
    } else {
        (hash >> (u64::BITS - slot_bits)) as usize
    }
}

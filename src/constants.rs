// SPDX-License-Identifier: Apache-2.0

//! Common constants used across implementations
//!
//! This module centralizes lane counts, bucket geometry, mixer constants and the
//! dispatch thresholds used by the scalar/SIMD paths.

// =============================================================================
// SEARCH BLOCK WIDTHS
// =============================================================================

// The block search always probes one 512-bit register worth of elements,
// whatever backend executes the compare. Narrower backends split the block
// into several registers, so every backend visits the same blocks and returns
// the same index.
pub const LANES_512_I16: usize = 32; // 512/16 = 32 i16 elements
pub const LANES_512_I32: usize = 16; // 512/32 = 16 i32 elements
pub const LANES_512_I64: usize = 8; // 512/64 = 8 i64 elements

/// Number of independent searches resolved by one bulk pass.
pub const BULK_LANES: usize = 16;

// =============================================================================
// SIMD Lane Counts by Architecture
// =============================================================================

// AVX-512 Constants (nightly feature only)
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
pub use avx512_constants::*;
#[cfg(all(feature = "fash-nightly", target_arch = "x86_64"))]
mod avx512_constants {
    pub const LANES_AVX512_I32: usize = 16; // 512/32 = 16 i32 elements
}

// x86_64 stable constants (AVX2)
#[cfg(target_arch = "x86_64")]
pub use x86_stable_constants::*;
#[cfg(target_arch = "x86_64")]
mod x86_stable_constants {
    pub const LANES_AVX2_U64: usize = 4; // 256/64 = 4 u64 elements
    pub const LANES_AVX2_I32: usize = 8; // 256/32 = 8 i32 elements
    pub const LANES_AVX2_I16: usize = 16; // 256/16 = 16 i16 elements
}

// NEON Constants (ARM64 only)
#[cfg(target_arch = "aarch64")]
pub use neon_constants::*;
#[cfg(target_arch = "aarch64")]
mod neon_constants {
    pub const LANES_NEON_U64: usize = 2; // 128/64 = 2 u64 elements
    pub const LANES_NEON_I32: usize = 4; // 128/32 = 4 i32 elements
    pub const LANES_NEON_I16: usize = 8; // 128/16 = 8 i16 elements
}

// =============================================================================
// HASH TABLE GEOMETRY
// =============================================================================

/// Reserved key marking an empty slot. Storage is zero-filled, so every slot
/// starts out empty.
pub const EMPTY_KEY: u64 = 0;

/// Keys compared per probe step (one 512-bit register of u64).
pub const KEYS_PER_CHUNK: usize = 8;

/// Slots per bucket for the flat geometry.
pub const FLAT_BUCKET_SLOTS: usize = 16;
/// Slots per bucket for the wide geometry.
pub const WIDE_BUCKET_SLOTS: usize = 128;

/// `capacity = 2^(bits + 1)` for the wide geometry, so each 128-slot bucket
/// covers `2^6` of the `2^bits` nominal entries.
pub const WIDE_BUCKET_SHIFT: u32 = 6;

pub const FLAT_MIN_BITS: u32 = 0;
pub const FLAT_MAX_BITS: u32 = 40;
pub const WIDE_MIN_BITS: u32 = WIDE_BUCKET_SHIFT;
pub const WIDE_MAX_BITS: u32 = 44;

/// Table storage alignment; matches the widest vector load.
pub const TABLE_ALIGNMENT: usize = 64;

// =============================================================================
// AVALANCHE MIXER
// =============================================================================

pub const MIX_MUL_1: u64 = 0x319642b2d24d8ec3;
pub const MIX_MUL_2: u64 = 0x96de1b173f119089;

pub const MIX_SHIFT_1A: u32 = 31;
pub const MIX_SHIFT_1B: u32 = 62;
pub const MIX_SHIFT_2A: u32 = 27;
pub const MIX_SHIFT_2B: u32 = 54;
pub const MIX_SHIFT_3A: u32 = 30;
pub const MIX_SHIFT_3B: u32 = 60;

/// Keys mixed per vectorized mixer call.
pub const MIX_BATCH: usize = 8;

// =============================================================================
// Loop guards
// =============================================================================

// A block search over any addressable array halves its span at most
// usize::BITS times; anything beyond that means the loop state is corrupt.
pub const MAX_SEARCH_PROBES: usize = usize::BITS as usize + 1;

// =============================================================================
// SIMD Performance Thresholds
// =============================================================================

// Below this length the bulk search runs its lanes on the scalar backend; the
// single-array search needs no threshold since short arrays only take the tail path.
pub const SIMD_THRESHOLD_BULK_SEARCH: usize = 16;

// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity bucket hash tables
//!
//! One generic table covers the four historical variants. They differ along
//! two independent axes, and each axis is a type parameter:
//!
//! - **Geometry** (`G`): bucket width. [`Flat16`] buckets hold 16 slots and
//!   there are `2^bits` of them; [`Wide128`] buckets hold 128 slots with a total
//!   capacity of `2^(bits + 1)`. Wide buckets absorb far more load variance at
//!   the cost of a longer worst-case scan.
//! - **Storage** (`S`): [`ParallelSlots`] keeps keys and values in two
//!   separate arrays, so a probe touches only key cache lines;
//!   [`InterleavedSlots`] keeps each key next to its value, so a hit costs one
//!   cache line instead of two.
//!
//! ## Probing
//! A key is mixed with [`mix64`]. The low bits select the bucket; the top
//! `log2(S)` bits select a start offset inside it. The bucket is scanned in
//! chunks of 8 keys, one wide compare per chunk, starting at the offset's
//! chunk and wrapping around. Inserts additionally rotate each chunk's
//! empty-slot mask by the offset's lane so keys sharing a bucket start filling
//! at different positions. Every scan visits each chunk at most once.
//!
//! ## Invariants
//! - Key `0` marks an empty slot and is rejected by `insert`.
//! - Slots are never freed; `len` only grows.
//! - A full bucket turns the next insert into it into `BucketOverflow`; the
//!   table itself stays valid.

use std::fmt;
use std::marker::PhantomData;

use bytemuck::Zeroable;
use log::{debug, trace};

use crate::aligned::AlignedBuffer;
use crate::capacity::recommend_bits;
use crate::constants::*;
use crate::dispatch::{backend_available, selected_backend};
use crate::hash::{bucket_index, mix64, mix64_x8, probe_offset};
use crate::probe::{eq_mask_keyed_x8, eq_mask_u64x8, lowest_set_bit, KeyedRecord};
use crate::types::{Backend, FashError, Result, TableStats};

// =============================================================================
//  GEOMETRY
// =============================================================================

/// Bucket width and the `bits` → bucket count rule.
pub trait Geometry: Send + Sync + 'static {
    /// Slots per bucket (`S`).
    const SLOTS: usize;
    /// `log2(SLOTS)`: hash bits used for the probe start offset.
    const SLOT_BITS: u32;
    const MIN_BITS: u32;
    const MAX_BITS: u32;
    const NAME: &'static str;

    /// `log2(bucket_count)` for a table built with `bits`.
    fn bucket_bits(bits: u32) -> u32;

    fn check_bits(bits: u32) -> Result<()> {
        if bits < Self::MIN_BITS || bits > Self::MAX_BITS {
            return Err(FashError::InvalidConfig(format!(
                "{} tables need bits in {}..={}, got {}",
                Self::NAME,
                Self::MIN_BITS,
                Self::MAX_BITS,
                bits
            )));
        }
        Ok(())
    }
}

/// 16-slot buckets, `2^bits` of them.
#[derive(Debug, Clone, Copy)]
pub struct Flat16;

impl Geometry for Flat16 {
    const SLOTS: usize = FLAT_BUCKET_SLOTS;
    const SLOT_BITS: u32 = FLAT_BUCKET_SLOTS.trailing_zeros();
    const MIN_BITS: u32 = FLAT_MIN_BITS;
    const MAX_BITS: u32 = FLAT_MAX_BITS;
    const NAME: &'static str = "flat16";

    #[inline]
    fn bucket_bits(bits: u32) -> u32 {
        bits
    }
}

/// 128-slot buckets, total capacity `2^(bits + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct Wide128;

impl Geometry for Wide128 {
    const SLOTS: usize = WIDE_BUCKET_SLOTS;
    const SLOT_BITS: u32 = WIDE_BUCKET_SLOTS.trailing_zeros();
    const MIN_BITS: u32 = WIDE_MIN_BITS;
    const MAX_BITS: u32 = WIDE_MAX_BITS;
    const NAME: &'static str = "wide128";

    #[inline]
    fn bucket_bits(bits: u32) -> u32 {
        bits - WIDE_BUCKET_SHIFT
    }
}

// =============================================================================
//  STORAGE
// =============================================================================

/// Slot storage for a bucket table.
///
/// `chunk_mask` compares the 8 keys starting at `start` (always a multiple of
/// 8 inside one bucket) against `needle` and returns the match bitmask.
pub trait SlotStorage<V: Copy + Zeroable>: Sized + Send + Sync {
    const NAME: &'static str;

    fn zeroed(capacity: usize) -> Result<Self>;
    fn capacity(&self) -> usize;
    fn key(&self, slot: usize) -> u64;
    fn value(&self, slot: usize) -> &V;
    fn value_mut(&mut self, slot: usize) -> &mut V;
    fn write(&mut self, slot: usize, key: u64, value: V);
    fn chunk_mask(&self, start: usize, needle: u64, backend: Backend) -> u8;
}

/// Keys and values in two parallel 64-byte aligned arrays.
pub struct ParallelSlots<V: Copy + Zeroable> {
    keys: AlignedBuffer<u64>,
    values: AlignedBuffer<V>,
}

impl<V: Copy + Zeroable + Send + Sync> SlotStorage<V> for ParallelSlots<V> {
    const NAME: &'static str = "parallel";

    fn zeroed(capacity: usize) -> Result<Self> {
        let keys = AlignedBuffer::zeroed(capacity, TABLE_ALIGNMENT)?;
        // If this fails, `keys` is released on the way out.
        let values = AlignedBuffer::zeroed(capacity, TABLE_ALIGNMENT)?;
        Ok(Self { keys, values })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    fn key(&self, slot: usize) -> u64 {
        self.keys[slot]
    }

    #[inline]
    fn value(&self, slot: usize) -> &V {
        &self.values[slot]
    }

    #[inline]
    fn value_mut(&mut self, slot: usize) -> &mut V {
        &mut self.values[slot]
    }

    #[inline]
    fn write(&mut self, slot: usize, key: u64, value: V) {
        self.keys[slot] = key;
        self.values[slot] = value;
    }

    #[inline]
    fn chunk_mask(&self, start: usize, needle: u64, backend: Backend) -> u8 {
        eq_mask_u64x8(&self.keys[start..start + KEYS_PER_CHUNK], needle, backend)
    }
}

/// One key/value record per slot.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Slot<V> {
    pub key: u64,
    pub value: V,
}

// SAFETY: both fields are zeroable.
unsafe impl<V: Zeroable> Zeroable for Slot<V> {}

// SAFETY: `#[repr(C)]` with `key` as the first field.
unsafe impl<V: Copy> KeyedRecord for Slot<V> {
    #[inline(always)]
    fn key(&self) -> u64 {
        self.key
    }
}

/// Key/value records in one 64-byte aligned array.
pub struct InterleavedSlots<V: Copy + Zeroable> {
    slots: AlignedBuffer<Slot<V>>,
}

impl<V: Copy + Zeroable + Send + Sync> SlotStorage<V> for InterleavedSlots<V> {
    const NAME: &'static str = "interleaved";

    fn zeroed(capacity: usize) -> Result<Self> {
        Ok(Self {
            slots: AlignedBuffer::zeroed(capacity, TABLE_ALIGNMENT)?,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn key(&self, slot: usize) -> u64 {
        self.slots[slot].key
    }

    #[inline]
    fn value(&self, slot: usize) -> &V {
        &self.slots[slot].value
    }

    #[inline]
    fn value_mut(&mut self, slot: usize) -> &mut V {
        &mut self.slots[slot].value
    }

    #[inline]
    fn write(&mut self, slot: usize, key: u64, value: V) {
        self.slots[slot] = Slot { key, value };
    }

    #[inline]
    fn chunk_mask(&self, start: usize, needle: u64, backend: Backend) -> u8 {
        eq_mask_keyed_x8(&self.slots[start..start + KEYS_PER_CHUNK], needle, backend)
    }
}

// =============================================================================
//  TABLE
// =============================================================================

/// 16-slot buckets, parallel key/value arrays.
pub type FlatTable<V> = BucketTable<V, Flat16, ParallelSlots<V>>;
/// 16-slot buckets, interleaved key/value records.
pub type FlatKvTable<V> = BucketTable<V, Flat16, InterleavedSlots<V>>;
/// 128-slot buckets, parallel key/value arrays.
pub type WideTable<V> = BucketTable<V, Wide128, ParallelSlots<V>>;
/// 128-slot buckets, interleaved key/value records.
pub type WideKvTable<V> = BucketTable<V, Wide128, InterleavedSlots<V>>;

/// Where a key lives: its bucket, and where inside it the scan starts.
#[derive(Debug, Clone, Copy)]
struct ProbePlan {
    bucket: usize,
    base: usize,
    start_chunk: usize,
    start_lane: u32,
}

/// Fixed-capacity open-addressing table from non-zero `u64` keys to `V`.
///
/// Lookups take `&self` and may run from any number of threads at once;
/// `insert` takes `&mut self`, so there is at most one writer and no reader
/// can observe a half-written slot.
pub struct BucketTable<V, G, S>
where
    V: Copy + Zeroable,
    G: Geometry,
    S: SlotStorage<V>,
{
    slots: S,
    bits: u32,
    bucket_bits: u32,
    bucket_count: usize,
    len: usize,
    backend: Backend,
    _marker: PhantomData<(V, G)>,
}

impl<V, G, S> BucketTable<V, G, S>
where
    V: Copy + Zeroable,
    G: Geometry,
    S: SlotStorage<V>,
{
    const CHUNKS_PER_BUCKET: usize = G::SLOTS / KEYS_PER_CHUNK;

    /// Build an empty table sized by `bits` (see [`Geometry`]), probing with
    /// the best backend this CPU supports.
    pub fn new(bits: u32) -> Result<Self> {
        Self::with_backend(bits, selected_backend())
    }

    /// Build an empty table that probes with `backend`.
    ///
    /// Fails with `InvalidConfig` if this CPU or build cannot run `backend`.
    pub fn with_backend(bits: u32, backend: Backend) -> Result<Self> {
        G::check_bits(bits)?;
        if !backend_available(backend) {
            return Err(FashError::InvalidConfig(format!(
                "backend {} is not available on this CPU/build",
                backend.name()
            )));
        }

        let bucket_bits = G::bucket_bits(bits);
        let capacity = 1usize
            .checked_shl(bucket_bits)
            .and_then(|buckets| buckets.checked_mul(G::SLOTS))
            .ok_or_else(|| {
                FashError::InvalidConfig(format!(
                    "{} table with bits={} does not fit the address space",
                    G::NAME,
                    bits
                ))
            })?;

        let slots = S::zeroed(capacity)?;

        debug!(
            "BUCKET_TABLE: {}/{} bits={} buckets={} capacity={} backend={}",
            G::NAME,
            S::NAME,
            bits,
            capacity / G::SLOTS,
            capacity,
            backend.name()
        );

        Ok(Self {
            slots,
            bits,
            bucket_bits,
            bucket_count: capacity / G::SLOTS,
            len: 0,
            backend,
            _marker: PhantomData,
        })
    }

    /// Build the smallest table expected to hold `expected_keys` keys with a
    /// total overflow probability of at most `max_overflow_probability`.
    pub fn with_expected_keys(expected_keys: u64, max_overflow_probability: f64) -> Result<Self> {
        let bits = recommend_bits::<G>(expected_keys, max_overflow_probability).ok_or_else(|| {
            FashError::InvalidConfig(format!(
                "no {} table holds {} keys within overflow probability {}",
                G::NAME,
                expected_keys,
                max_overflow_probability
            ))
        })?;
        Self::new(bits)
    }

    #[inline(always)]
    fn plan(&self, hash: u64) -> ProbePlan {
        let bucket = bucket_index(hash, self.bucket_bits);
        let offset = probe_offset(hash, G::SLOT_BITS);
        ProbePlan {
            bucket,
            base: bucket * G::SLOTS,
            start_chunk: offset / KEYS_PER_CHUNK,
            start_lane: (offset % KEYS_PER_CHUNK) as u32,
        }
    }

    #[inline(always)]
    fn chunk_start(plan: &ProbePlan, step: usize) -> usize {
        let chunk = (plan.start_chunk + step) % Self::CHUNKS_PER_BUCKET;
        plan.base + chunk * KEYS_PER_CHUNK
    }

    /// Slot holding `key`, scanning the bucket in probe order.
    #[inline]
    fn find_slot(&self, key: u64, plan: &ProbePlan) -> Option<usize> {
        for step in 0..Self::CHUNKS_PER_BUCKET {
            let start = Self::chunk_start(plan, step);
            let mask = self.slots.chunk_mask(start, key, self.backend);
            if let Some(lane) = lowest_set_bit(mask as u64) {
                return Some(start + lane);
            }
        }
        None
    }

    /// First empty slot in probe order, lanes rotated by the plan's start lane.
    #[inline]
    fn find_empty(&self, plan: &ProbePlan) -> Option<usize> {
        for step in 0..Self::CHUNKS_PER_BUCKET {
            let start = Self::chunk_start(plan, step);
            let mask = self.slots.chunk_mask(start, EMPTY_KEY, self.backend);
            if mask != 0 {
                let rotated = mask.rotate_right(plan.start_lane);
                let lane = (rotated.trailing_zeros() + plan.start_lane) as usize % KEYS_PER_CHUNK;
                return Some(start + lane);
            }
        }
        None
    }

    #[inline]
    fn locate(&self, key: u64) -> Option<usize> {
        if key == EMPTY_KEY {
            return None;
        }
        self.find_slot(key, &self.plan(mix64(key)))
    }

    /// Store `value` under `key`.
    ///
    /// Key `0` is reserved and fails with `InvalidKey`. If the key's bucket has
    /// no free slot the call fails with `BucketOverflow` and nothing changes.
    /// Keys are not deduplicated: inserting a key twice takes two slots.
    pub fn insert(&mut self, key: u64, value: V) -> Result<()> {
        trace!("BUCKET_TABLE INSERT: key={}", key);
        if key == EMPTY_KEY {
            return Err(FashError::InvalidKey);
        }

        let plan = self.plan(mix64(key));
        match self.find_empty(&plan) {
            Some(slot) => {
                self.slots.write(slot, key, value);
                self.len += 1;
                Ok(())
            }
            None => {
                debug!(
                    "BUCKET_TABLE: bucket {} overflowed inserting key {} (len={}, capacity={})",
                    plan.bucket,
                    key,
                    self.len,
                    self.capacity()
                );
                Err(FashError::BucketOverflow {
                    bucket: plan.bucket,
                    slots: G::SLOTS,
                })
            }
        }
    }

    #[inline]
    pub fn get(&self, key: u64) -> Option<&V> {
        self.locate(key).map(|slot| self.slots.value(slot))
    }

    #[inline]
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let slot = self.locate(key)?;
        Some(self.slots.value_mut(slot))
    }

    #[inline]
    pub fn contains(&self, key: u64) -> bool {
        self.locate(key).is_some()
    }

    /// Look up eight keys, mixing them with one vector pass.
    pub fn get_many(&self, keys: &[u64; MIX_BATCH]) -> [Option<&V>; MIX_BATCH] {
        let hashes = mix64_x8(keys, self.backend);
        let mut out = [None; MIX_BATCH];
        for lane in 0..MIX_BATCH {
            if keys[lane] == EMPTY_KEY {
                continue;
            }
            let plan = self.plan(hashes[lane]);
            out[lane] = self
                .find_slot(keys[lane], &plan)
                .map(|slot| self.slots.value(slot));
        }
        out
    }

    pub fn contains_many(&self, keys: &[u64; MIX_BATCH]) -> [bool; MIX_BATCH] {
        let found = self.get_many(keys);
        let mut out = [false; MIX_BATCH];
        for lane in 0..MIX_BATCH {
            out[lane] = found[lane].is_some();
        }
        out
    }

    /// Whether an insert of `key` would find a free slot right now.
    pub fn has_room(&self, key: u64) -> bool {
        key != EMPTY_KEY && self.find_empty(&self.plan(mix64(key))).is_some()
    }

    /// Occupied slots in `bucket`, `None` if there is no such bucket.
    pub fn bucket_load(&self, bucket: usize) -> Option<usize> {
        if bucket >= self.bucket_count {
            return None;
        }
        let base = bucket * G::SLOTS;
        let empty: u32 = (0..Self::CHUNKS_PER_BUCKET)
            .map(|chunk| {
                self.slots
                    .chunk_mask(base + chunk * KEYS_PER_CHUNK, EMPTY_KEY, self.backend)
                    .count_ones()
            })
            .sum();
        Some(G::SLOTS - empty as usize)
    }

    /// Occupancy summary; walks every bucket.
    pub fn stats(&self) -> TableStats {
        let max_bucket_load = (0..self.bucket_count)
            .filter_map(|bucket| self.bucket_load(bucket))
            .max()
            .unwrap_or(0);
        TableStats {
            len: self.len,
            capacity: self.capacity(),
            buckets: self.bucket_count,
            slots_per_bucket: G::SLOTS,
            max_bucket_load,
            load_factor: self.len as f64 / self.capacity() as f64,
        }
    }

    /// Occupied entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> + '_ {
        (0..self.slots.capacity()).filter_map(move |slot| {
            let key = self.slots.key(slot);
            (key != EMPTY_KEY).then(|| (key, self.slots.value(slot)))
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[inline]
    pub fn slots_per_bucket(&self) -> usize {
        G::SLOTS
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl<V, G, S> fmt::Debug for BucketTable<V, G, S>
where
    V: Copy + Zeroable,
    G: Geometry,
    S: SlotStorage<V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketTable")
            .field("geometry", &G::NAME)
            .field("storage", &S::NAME)
            .field("bits", &self.bits)
            .field("buckets", &self.bucket_count)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("backend", &self.backend)
            .finish()
    }
}

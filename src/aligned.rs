// SPDX-License-Identifier: Apache-2.0

//! Owned, zero-initialized, over-aligned storage
//!
//! Table storage is read one 512-bit register at a time, so every bucket must
//! start on a 64-byte boundary. `Vec<T>` only guarantees `align_of::<T>()`, hence
//! this small RAII wrapper over `std::alloc`. The buffer is released in `Drop`
//! with the exact layout it was allocated with, including when a later
//! allocation in the same constructor fails and `?` unwinds the first one.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::Zeroable;
use log::trace;

use crate::types::{FashError, Result};

pub struct AlignedBuffer<T: Zeroable> {
    ptr: NonNull<T>,
    len: usize,
    // None for zero-sized requests, which never touch the allocator.
    layout: Option<Layout>,
    _marker: PhantomData<T>,
}

// SAFETY: the buffer uniquely owns its allocation, like `Box<[T]>`.
unsafe impl<T: Zeroable + Send> Send for AlignedBuffer<T> {}
unsafe impl<T: Zeroable + Sync> Sync for AlignedBuffer<T> {}

impl<T: Zeroable> AlignedBuffer<T> {
    /// Allocates `len` zeroed elements aligned to at least `align` bytes.
    ///
    /// `align` must be a power of two; it is raised to `align_of::<T>()` when smaller.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        let align = align.max(std::mem::align_of::<T>());
        let failure = |bytes: usize| FashError::AllocationFailure { bytes, align };

        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| failure(usize::MAX))?;

        if bytes == 0 {
            // Zero-sized: no allocation, a well-aligned dangling pointer is enough.
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                layout: None,
                _marker: PhantomData,
            });
        }

        let layout = Layout::from_size_align(bytes, align).map_err(|_| failure(bytes))?;

        // SAFETY: layout has non-zero size; all-zero bytes are a valid `T` by `Zeroable`.
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw).ok_or_else(|| failure(bytes))?;

        trace!("ALIGNED_BUFFER: allocated {} bytes aligned to {}", bytes, align);

        Ok(Self {
            ptr,
            len,
            layout: Some(layout),
            _marker: PhantomData,
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

    /// Alignment the storage was allocated with.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout
            .map(|l| l.align())
            .unwrap_or(std::mem::align_of::<T>())
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T: Zeroable> Deref for AlignedBuffer<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: ptr is valid for `len` initialized elements (or dangling with len 0 / ZST).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable> DerefMut for AlignedBuffer<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: allocated in `zeroed` with this exact layout. Elements are
            // plain data (Zeroable tables store Copy values), nothing to drop.
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
    }
}

impl<T: Zeroable + std::fmt::Debug> std::fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("alignment", &self.alignment())
            .finish()
    }
}

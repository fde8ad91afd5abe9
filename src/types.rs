// SPDX-License-Identifier: Apache-2.0

// types.rs for fash
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FashError {
    #[error("key 0 is reserved as the empty-slot sentinel")]
    InvalidKey,
    #[error("bucket {bucket} is full ({slots} slots)")]
    BucketOverflow { bucket: usize, slots: usize },
    #[error("aligned allocation of {bytes} bytes (align {align}) failed")]
    AllocationFailure { bytes: usize, align: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FashError>;

/// Instruction set a probe or search kernel runs on.
///
/// Every backend produces identical results; they differ only in how many
/// lanes one instruction covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    Scalar,
    Avx2,
    Avx512,
    Neon,
}

impl Backend {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Avx2 => "avx2",
            Backend::Avx512 => "avx512",
            Backend::Neon => "neon",
        }
    }
}

/// Point-in-time occupancy of a bucket table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub len: usize,
    pub capacity: usize,
    pub buckets: usize,
    pub slots_per_bucket: usize,
    pub max_bucket_load: usize,
    pub load_factor: f64,
}

/// Modeled overflow risk for a table geometry at an expected key count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub bits: u32,
    pub expected_keys: u64,
    pub buckets: u64,
    pub slots_per_bucket: u64,
    pub capacity: u64,
    pub load_factor: f64,
    /// Probability that one given bucket receives more keys than it has slots.
    pub bucket_overflow_probability: f64,
    /// Probability that at least one bucket overflows.
    pub table_overflow_probability: f64,
}

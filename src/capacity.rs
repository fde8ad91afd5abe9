// SPDX-License-Identifier: Apache-2.0

//! Bucket overflow model
//!
//! Tables never grow, so `bits` has to be chosen up front. With `N` keys spread
//! uniformly over `B` buckets, the load of one bucket is `Binomial(N, 1/B)`;
//! an insert fails once that load exceeds the bucket width `S`. The helpers
//! here evaluate that tail exactly (in log space, since the interesting values
//! sit around 1e-10) and pick the smallest `bits` that meets a caller's budget.

use log::trace;

use crate::table::Geometry;
use crate::types::{CapacityReport, Result};

// Terms below this fraction of the running sum no longer change an f64 sum.
const TAIL_EPSILON: f64 = 1e-18;
// Upper bound on terms summed past the bucket width; the tail is geometric
// long before this when the mean load is below the width.
const MAX_TAIL_TERMS: u64 = 100_000;

/// Probability that one given bucket receives more than `slots` of
/// `expected_keys` uniformly hashed keys.
pub fn bucket_overflow_probability(expected_keys: u64, buckets: u64, slots: u64) -> f64 {
    if expected_keys <= slots {
        return 0.0;
    }
    if buckets <= 1 {
        return 1.0;
    }

    let n = expected_keys as f64;
    let p = 1.0 / buckets as f64;
    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    // ln of term(k+1) / term(k) without the k-dependent part
    let ln_ratio = |k: u64| ((n - k as f64).ln() - ((k + 1) as f64).ln()) + ln_p - ln_q;

    if n * p < slots as f64 {
        // Mean below the width: the upper tail is small, sum it directly.
        let first = slots + 1;
        let mut ln_term = (0..first).map(|i| ((n - i as f64).ln() - ((i + 1) as f64).ln())).sum::<f64>()
            + first as f64 * ln_p
            + (n - first as f64) * ln_q;

        let mut sum = 0.0;
        let mut k = first;
        while k <= expected_keys && k - first < MAX_TAIL_TERMS {
            let term = ln_term.exp();
            sum += term;
            if term < sum * TAIL_EPSILON {
                break;
            }
            ln_term += ln_ratio(k);
            k += 1;
        }
        sum.min(1.0)
    } else {
        // Mean at or above the width: 1 - P(X <= S) over at most S + 1 terms.
        let mut ln_term = n * ln_q;
        let mut below = 0.0;
        for k in 0..=slots {
            below += ln_term.exp();
            ln_term += ln_ratio(k);
        }
        (1.0 - below).clamp(0.0, 1.0)
    }
}

/// Probability that at least one of `buckets` buckets overflows.
pub fn table_overflow_probability(expected_keys: u64, buckets: u64, slots: u64) -> f64 {
    let per_bucket = bucket_overflow_probability(expected_keys, buckets, slots);
    if per_bucket >= 1.0 {
        return 1.0;
    }
    // 1 - (1 - p)^B, accurate for tiny p
    (-(buckets as f64 * (-per_bucket).ln_1p()).exp_m1()).clamp(0.0, 1.0)
}

impl CapacityReport {
    /// Model a `G` table of `bits` holding `expected_keys` keys.
    pub fn for_geometry<G: Geometry>(expected_keys: u64, bits: u32) -> Result<Self> {
        G::check_bits(bits)?;
        let buckets = 1u64 << G::bucket_bits(bits);
        let slots = G::SLOTS as u64;
        let capacity = buckets * slots;

        let report = CapacityReport {
            bits,
            expected_keys,
            buckets,
            slots_per_bucket: slots,
            capacity,
            load_factor: expected_keys as f64 / capacity as f64,
            bucket_overflow_probability: bucket_overflow_probability(expected_keys, buckets, slots),
            table_overflow_probability: table_overflow_probability(expected_keys, buckets, slots),
        };
        trace!("CAPACITY_REPORT: {} {:?}", G::NAME, report);
        Ok(report)
    }
}

/// Smallest `bits` for which a `G` table holding `expected_keys` keys overflows
/// with probability at most `max_probability`.
pub fn recommend_bits<G: Geometry>(expected_keys: u64, max_probability: f64) -> Option<u32> {
    (G::MIN_BITS..=G::MAX_BITS).find(|&bits| {
        CapacityReport::for_geometry::<G>(expected_keys, bits)
            .map(|report| report.table_overflow_probability <= max_probability)
            .unwrap_or(false)
    })
}

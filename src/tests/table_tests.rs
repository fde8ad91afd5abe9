// SPDX-License-Identifier: Apache-2.0

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
  use log::debug;

  use crate::constants::{FLAT_BUCKET_SLOTS, WIDE_BUCKET_SLOTS};
  use crate::dispatch::backend_available;
  use crate::hash::mix64;
  use crate::table::{
    BucketTable, Flat16, FlatKvTable, FlatTable, Geometry, InterleavedSlots, ParallelSlots,
    SlotStorage, Wide128, WideKvTable, WideTable,
  };
  use crate::test_utils::{config_test_logger, test_backends};
  use crate::types::{Backend, FashError};

  const KEY_BASE: u64 = 1 << 20;

  // =============================================================================
  //   DUAL-PATH TEST HELPERS
  // =============================================================================

  /// Inserts `n` sequential keys into a fresh table per test backend and checks
  /// the round trip. Returns the per-key insert outcome of the scalar table.
  fn check_round_trip_dual_paths<G, S>(bits: u32, n: u64) -> Vec<bool>
  where
    G: Geometry,
    S: SlotStorage<u64>,
  {
    let mut reference: Option<(Vec<bool>, usize)> = None;

    for backend in test_backends() {
      let mut table = BucketTable::<u64, G, S>::with_backend(bits, backend).unwrap();
      let mut inserted = Vec::with_capacity(n as usize);
      for i in 0..n {
        match table.insert(KEY_BASE + i, i) {
          Ok(()) => inserted.push(true),
          Err(FashError::BucketOverflow { slots, .. }) => {
            assert_eq!(slots, G::SLOTS);
            inserted.push(false);
          }
          Err(e) => panic!("unexpected insert error: {}", e),
        }
      }

      for i in 0..n {
        let key = KEY_BASE + i;
        if inserted[i as usize] {
          assert_eq!(table.get(key), Some(&i), "{}: key {}", backend.name(), key);
          assert!(table.contains(key));
        } else {
          assert!(!table.contains(key), "{}: overflowed key {} present", backend.name(), key);
        }
      }
      let ok_count = inserted.iter().filter(|&&ok| ok).count();
      assert_eq!(table.len(), ok_count);

      let max_load = table.stats().max_bucket_load;
      match &reference {
        None => reference = Some((inserted, max_load)),
        Some((expected, expected_load)) => {
          assert_eq!(&inserted, expected, "{} insert outcomes differ from scalar", backend.name());
          assert_eq!(max_load, *expected_load);
        }
      }
    }

    reference.map(|(inserted, _)| inserted).unwrap_or_default()
  }

  /// Keys whose mixed hash lands in `bucket` of a table with `bucket_bits`.
  fn keys_in_bucket(bucket: usize, bucket_bits: u32, count: usize) -> Vec<u64> {
    let mask = (1u64 << bucket_bits) - 1;
    (1u64..)
      .filter(|&k| (mix64(k) & mask) as usize == bucket)
      .take(count)
      .collect()
  }

  fn check_overflow_at_s_plus_one<G, S>(bits: u32)
  where
    G: Geometry,
    S: SlotStorage<u64>,
  {
    let bucket_bits = G::bucket_bits(bits);
    let keys = keys_in_bucket(1 % (1usize << bucket_bits), bucket_bits, G::SLOTS + 1);
    for backend in test_backends() {
      let mut table = BucketTable::<u64, G, S>::with_backend(bits, backend).unwrap();
      for (i, &key) in keys[..G::SLOTS].iter().enumerate() {
        assert!(table.has_room(key));
        table.insert(key, i as u64).unwrap();
      }
      let last = keys[G::SLOTS];
      assert!(!table.has_room(last));
      let err = table.insert(last, 999).unwrap_err();
      assert_eq!(
        err,
        FashError::BucketOverflow {
          bucket: 1 % (1usize << bucket_bits),
          slots: G::SLOTS
        }
      );

      // The failed insert leaves everything in place.
      assert_eq!(table.len(), G::SLOTS);
      assert!(!table.contains(last));
      for (i, &key) in keys[..G::SLOTS].iter().enumerate() {
        assert_eq!(table.get(key), Some(&(i as u64)));
      }
      assert_eq!(table.bucket_load(1 % (1usize << bucket_bits)), Some(G::SLOTS));
    }
  }

  // =============================================================================
  //   SCENARIOS
  // =============================================================================

  #[test]
  fn test_scenario_b_flat_bits_4() {
    config_test_logger();
    // 256 keys into 16 buckets of 16 slots: full load, some buckets overflow.
    let inserted = check_round_trip_dual_paths::<Flat16, ParallelSlots<u64>>(4, 256);
    let ok = inserted.iter().filter(|&&ok| ok).count();
    debug!("scenario B: {} of 256 inserted", ok);
    assert!(ok <= 256 && ok > 128);

    // One key per bucket on average: always fits.
    let inserted = check_round_trip_dual_paths::<Flat16, ParallelSlots<u64>>(4, 16);
    assert!(inserted.iter().all(|&ok| ok));
  }

  #[test]
  fn test_scenario_c_bits_10_no_overflow() {
    config_test_logger();
    let n = 1 << 10;
    assert!(check_round_trip_dual_paths::<Flat16, ParallelSlots<u64>>(10, n).iter().all(|&ok| ok));
    assert!(check_round_trip_dual_paths::<Flat16, InterleavedSlots<u64>>(10, n).iter().all(|&ok| ok));
    assert!(check_round_trip_dual_paths::<Wide128, ParallelSlots<u64>>(10, n).iter().all(|&ok| ok));
    assert!(check_round_trip_dual_paths::<Wide128, InterleavedSlots<u64>>(10, n).iter().all(|&ok| ok));
  }

  #[test]
  fn test_overflow_exactly_at_s_plus_one() {
    config_test_logger();
    check_overflow_at_s_plus_one::<Flat16, ParallelSlots<u64>>(4);
    check_overflow_at_s_plus_one::<Flat16, InterleavedSlots<u64>>(4);
    check_overflow_at_s_plus_one::<Wide128, ParallelSlots<u64>>(8);
    check_overflow_at_s_plus_one::<Wide128, InterleavedSlots<u64>>(8);
  }

  #[test]
  fn test_single_bucket_tables() {
    config_test_logger();
    let mut flat = FlatTable::<u32>::new(0).unwrap();
    assert_eq!(flat.bucket_count(), 1);
    for key in 1..=FLAT_BUCKET_SLOTS as u64 {
      flat.insert(key, key as u32).unwrap();
    }
    assert!(matches!(
      flat.insert(100, 0),
      Err(FashError::BucketOverflow { bucket: 0, slots: FLAT_BUCKET_SLOTS })
    ));

    let mut wide = WideKvTable::<u32>::new(6).unwrap();
    assert_eq!(wide.bucket_count(), 1);
    assert_eq!(wide.capacity(), WIDE_BUCKET_SLOTS);
    for key in 1..=WIDE_BUCKET_SLOTS as u64 {
      wide.insert(key * 7, key as u32).unwrap();
    }
    assert!(matches!(
      wide.insert(1, 0),
      Err(FashError::BucketOverflow { bucket: 0, slots: WIDE_BUCKET_SLOTS })
    ));
    for key in 1..=WIDE_BUCKET_SLOTS as u64 {
      assert_eq!(wide.get(key * 7), Some(&(key as u32)));
    }
  }

  // =============================================================================
  //   KEY 0, LOOKUPS, BATCHES
  // =============================================================================

  #[test]
  fn test_zero_key_rejected_and_table_unchanged() {
    config_test_logger();
    let mut table = FlatKvTable::<u64>::new(4).unwrap();
    table.insert(5, 50).unwrap();
    let before = table.stats();

    assert_eq!(table.insert(0, 1), Err(FashError::InvalidKey));
    assert_eq!(table.stats(), before);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0), None);
    assert!(!table.contains(0));
    assert!(!table.has_room(0));
    assert_eq!(table.get(5), Some(&50));
  }

  #[test]
  fn test_lookups_are_idempotent() {
    config_test_logger();
    let mut table = WideTable::<u64>::new(12).unwrap();
    for i in 1..=500u64 {
      table.insert(i * 1_000_003, i).unwrap();
    }
    let stats = table.stats();
    for _ in 0..3 {
      for i in 1..=500u64 {
        assert_eq!(table.get(i * 1_000_003), Some(&i));
        assert!(!table.contains(i * 1_000_003 + 1));
      }
    }
    assert_eq!(table.stats(), stats);
  }

  #[test]
  fn test_get_mut_updates_in_place() {
    config_test_logger();
    let mut table = FlatTable::<u64>::new(6).unwrap();
    table.insert(77, 1).unwrap();
    if let Some(value) = table.get_mut(77) {
      *value += 41;
    }
    assert_eq!(table.get(77), Some(&42));
    assert!(table.get_mut(78).is_none());
    assert!(table.get_mut(0).is_none());
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn test_get_many_matches_get() {
    config_test_logger();
    for backend in test_backends() {
      let mut table = FlatKvTable::<u64>::with_backend(8, backend).unwrap();
      for i in 1..=300u64 {
        table.insert(i * 31, i).unwrap();
      }
      let keys = [31u64, 0, 62, 5, 9300, 9301, 310, u64::MAX];
      let many = table.get_many(&keys);
      let contained = table.contains_many(&keys);
      for lane in 0..keys.len() {
        assert_eq!(many[lane], table.get(keys[lane]), "{} lane {}", backend.name(), lane);
        assert_eq!(contained[lane], table.contains(keys[lane]));
      }
      assert_eq!(many[0], Some(&1));
      assert_eq!(many[1], None);
      assert_eq!(many[4], Some(&300));
      assert_eq!(many[5], None);
    }
  }

  #[test]
  fn test_duplicate_keys_take_two_slots() {
    config_test_logger();
    let mut table = FlatTable::<u8>::new(2).unwrap();
    table.insert(9, 1).unwrap();
    table.insert(9, 2).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.contains(9));
    assert_eq!(table.iter().filter(|(k, _)| *k == 9).count(), 2);
  }

  // =============================================================================
  //   METADATA
  // =============================================================================

  #[test]
  fn test_geometry_sizes() {
    config_test_logger();
    let flat = FlatTable::<u64>::new(10).unwrap();
    assert_eq!(flat.bucket_count(), 1 << 10);
    assert_eq!(flat.capacity(), 1 << 14);
    assert_eq!(flat.slots_per_bucket(), FLAT_BUCKET_SLOTS);
    assert_eq!(flat.bits(), 10);

    let wide = WideTable::<u64>::new(10).unwrap();
    assert_eq!(wide.bucket_count(), 1 << 4);
    assert_eq!(wide.capacity(), 1 << 11);
    assert_eq!(wide.slots_per_bucket(), WIDE_BUCKET_SLOTS);
    assert!(wide.is_empty());
  }

  #[test]
  fn test_invalid_bits_rejected() {
    config_test_logger();
    assert!(matches!(FlatTable::<u64>::new(41), Err(FashError::InvalidConfig(_))));
    assert!(matches!(WideTable::<u64>::new(5), Err(FashError::InvalidConfig(_))));
    assert!(matches!(WideKvTable::<u64>::new(45), Err(FashError::InvalidConfig(_))));
    assert!(FlatKvTable::<u64>::new(0).is_ok());
  }

  #[test]
  fn test_unavailable_backend_rejected() {
    config_test_logger();
    assert!(FlatTable::<u64>::with_backend(4, Backend::Scalar).is_ok());
    for backend in [Backend::Avx512, Backend::Avx2, Backend::Neon] {
      let result = FlatTable::<u64>::with_backend(4, backend);
      if backend_available(backend) {
        assert_eq!(result.unwrap().backend(), backend);
      } else {
        assert!(matches!(result, Err(FashError::InvalidConfig(_))));
      }
    }
  }

  #[test]
  fn test_stats_and_bucket_load() {
    config_test_logger();
    let mut table = FlatTable::<u64>::new(5).unwrap();
    let empty = table.stats();
    assert_eq!(empty.len, 0);
    assert_eq!(empty.max_bucket_load, 0);
    assert_eq!(empty.load_factor, 0.0);

    for i in 1..=200u64 {
      table.insert(i, i).unwrap();
    }
    let stats = table.stats();
    assert_eq!(stats.len, 200);
    assert_eq!(stats.capacity, 512);
    assert_eq!(stats.buckets, 32);
    assert_eq!(stats.slots_per_bucket, 16);
    assert!((stats.load_factor - 200.0 / 512.0).abs() < 1e-12);
    assert!(stats.max_bucket_load >= 7 && stats.max_bucket_load <= 16);

    let total: usize = (0..table.bucket_count()).filter_map(|b| table.bucket_load(b)).sum();
    assert_eq!(total, 200);
    assert_eq!(table.bucket_load(32), None);
    assert_eq!(table.iter().count(), 200);
  }

  #[test]
  fn test_with_expected_keys() {
    config_test_logger();
    let flat = FlatTable::<u64>::with_expected_keys(1000, 1e-9).unwrap();
    assert_eq!(flat.bits(), 10);
    let wide = WideKvTable::<u64>::with_expected_keys(1000, 1e-9).unwrap();
    assert_eq!(wide.bits(), 10);
    assert!(matches!(
      FlatTable::<u64>::with_expected_keys(u64::MAX, 0.0),
      Err(FashError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_concurrent_readers() {
    config_test_logger();
    let mut table = WideKvTable::<u64>::new(14).unwrap();
    for i in 1..=4000u64 {
      table.insert(i, i * 2).unwrap();
    }
    let table = &table;
    std::thread::scope(|scope| {
      for t in 0..4u64 {
        scope.spawn(move || {
          for i in (1 + t..=4000).step_by(4) {
            assert_eq!(table.get(i), Some(&(i * 2)));
          }
        });
      }
    });
  }
}

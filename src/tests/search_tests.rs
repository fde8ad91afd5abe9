// SPDX-License-Identifier: Apache-2.0

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
  use log::debug;

  use crate::constants::BULK_LANES;
  use crate::dispatch::{
    bulk_index_match_all_i32, bulk_index_match_i32, index_match, index_match_i16,
    index_match_i32, index_match_i64,
  };
  use crate::search::{
    bulk_index_match_all_i32_with, bulk_index_match_i32_scalar, bulk_index_match_i32_with,
    index_match_with, SearchLane,
  };
  use crate::test_utils::{config_test_logger, test_backends};
  use crate::types::Backend;

  // xorshift64; deterministic inputs without a rand dependency
  fn next_rand(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
  }

  // =============================================================================
  //   DUAL-PATH TEST HELPERS
  // =============================================================================

  /// Runs `index_match_with` on every test backend and checks the answer
  /// against `expected_present`, plus agreement with the scalar backend.
  fn check_index_match_dual_paths<T: SearchLane>(v: &[T], find: T, expected_present: bool) {
    let scalar = index_match_with(v, find, Backend::Scalar);
    for backend in test_backends() {
      let result = index_match_with(v, find, backend);
      assert_eq!(
        result, scalar,
        "{} disagrees with scalar for find={:?} (n={})",
        backend.name(),
        find,
        v.len()
      );
      match result {
        Some(i) => {
          assert!(expected_present, "{}: found absent {:?} at {}", backend.name(), find, i);
          assert!(v[i] == find, "{}: v[{}]={:?} != {:?}", backend.name(), i, v[i], find);
        }
        None => assert!(!expected_present, "{}: missed {:?} (n={})", backend.name(), find, v.len()),
      }
    }
  }

  fn check_bulk_dual_paths(v: &[i32], targets: &[i32; BULK_LANES]) {
    let scalar = bulk_index_match_i32_scalar(v, targets);
    for backend in test_backends() {
      let result = bulk_index_match_i32_with(v, targets, backend);
      assert_eq!(result, scalar, "{} bulk disagrees with scalar", backend.name());
    }
    for lane in 0..BULK_LANES {
      let present = v.contains(&targets[lane]);
      match scalar[lane] {
        Some(i) => assert_eq!(v[i], targets[lane], "lane {} wrong index", lane),
        None => assert!(!present, "lane {} missed {}", lane, targets[lane]),
      }
    }
  }

  // =============================================================================
  //   SINGLE TARGET
  // =============================================================================

  #[test]
  fn test_index_match_scenario_a() {
    config_test_logger();
    let v: Vec<i32> = (0..=1030).collect();
    assert_eq!(index_match_i32(&v, 503), Some(503));
    assert_eq!(index_match_i32(&v, 10_000), None);

    for backend in test_backends() {
      assert_eq!(index_match_with(&v, 503, backend), Some(503), "{}", backend.name());
      assert_eq!(index_match_with(&v, 10_000, backend), None, "{}", backend.name());
    }
  }

  #[test]
  fn test_index_match_every_element_i32() {
    config_test_logger();
    let v: Vec<i32> = (0..1031).map(|i| i * 3 - 700).collect();
    for (i, &x) in v.iter().enumerate() {
      assert_eq!(index_match_i32(&v, x), Some(i));
      check_index_match_dual_paths(&v, x, true);
      check_index_match_dual_paths(&v, x + 1, false);
    }
  }

  #[test]
  fn test_index_match_every_element_i16() {
    config_test_logger();
    let v: Vec<i16> = (-600i16..600).map(|i| i * 2).collect();
    for (i, &x) in v.iter().enumerate() {
      assert_eq!(index_match_i16(&v, x), Some(i));
      check_index_match_dual_paths(&v, x, true);
      check_index_match_dual_paths(&v, x + 1, false);
    }
    assert_eq!(index_match_i16(&v, i16::MIN), None);
    assert_eq!(index_match_i16(&v, i16::MAX), None);
  }

  #[test]
  fn test_index_match_every_element_i64() {
    config_test_logger();
    let v: Vec<i64> = (0..517i64).map(|i| (i << 33) - (1 << 40)).collect();
    for (i, &x) in v.iter().enumerate() {
      assert_eq!(index_match_i64(&v, x), Some(i));
      check_index_match_dual_paths(&v, x, true);
      check_index_match_dual_paths(&v, x + 1, false);
    }
    assert_eq!(index_match_i64(&v, i64::MIN), None);
    assert_eq!(index_match_i64(&v, i64::MAX), None);
  }

  #[test]
  fn test_index_match_all_lengths_small() {
    config_test_logger();
    // Every length around the block boundaries of all three widths.
    for n in 0..100i32 {
      let v: Vec<i32> = (0..n).map(|i| i * 2).collect();
      for x in -2..=(2 * n + 2) {
        let present = x >= 0 && x % 2 == 0 && x < 2 * n;
        check_index_match_dual_paths(&v, x, present);
      }
      let v64: Vec<i64> = v.iter().map(|&x| x as i64).collect();
      let v16: Vec<i16> = v.iter().map(|&x| x as i16).collect();
      for x in -2..=(2 * n + 2) {
        let present = x >= 0 && x % 2 == 0 && x < 2 * n;
        check_index_match_dual_paths(&v64, x as i64, present);
        check_index_match_dual_paths(&v16, x as i16, present);
      }
    }
  }

  #[test]
  fn test_index_match_tail_only() {
    config_test_logger();
    let v = [1i32, 3, 5, 7, 9, 11, 13];
    assert_eq!(v.len(), 7);
    for (i, &x) in v.iter().enumerate() {
      assert_eq!(index_match_i32(&v, x), Some(i));
    }
    assert_eq!(index_match_i32(&v, 0), None);
    assert_eq!(index_match_i32(&v, 4), None);
    assert_eq!(index_match_i32(&v, 14), None);

    // Lanes past the end must not match, whatever value the target has.
    assert_eq!(index_match_i32(&v[..3], 7), None);
    assert_eq!(index_match_i64(&[0i64; 5], 0), Some(0));
    assert_eq!(index_match_i16(&[5i16, 6], 0), None);
  }

  #[test]
  fn test_index_match_empty() {
    config_test_logger();
    assert_eq!(index_match_i16(&[], 0), None);
    assert_eq!(index_match_i32(&[], 0), None);
    assert_eq!(index_match_i64(&[], 0), None);
    assert_eq!(index_match::<i32>(&[], 7), None);
  }

  #[test]
  fn test_index_match_generic_matches_width_specific() {
    config_test_logger();
    let v: Vec<i64> = (0..300).map(|i| i * 5).collect();
    for x in [0i64, 5, 500, 1495, 1496, -5] {
      assert_eq!(index_match(&v, x), index_match_i64(&v, x), "x={}", x);
    }
  }

  #[test]
  fn test_index_match_duplicates() {
    config_test_logger();
    // Runs of equal values straddling block boundaries.
    let mut v: Vec<i32> = Vec::new();
    for value in 0..60 {
      for _ in 0..(value % 7 + 1) {
        v.push(value * 10);
      }
    }
    for value in 0..60 {
      check_index_match_dual_paths(&v, value * 10, true);
      check_index_match_dual_paths(&v, value * 10 + 5, false);
    }

    let flat = vec![42i32; 100];
    let found = index_match_i32(&flat, 42);
    assert!(found.is_some());
    assert_eq!(index_match_i32(&flat, 41), None);
  }

  #[test]
  fn test_index_match_unsorted_is_safe() {
    config_test_logger();
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let v: Vec<i32> = (0..777).map(|_| (next_rand(&mut state) % 5000) as i32).collect();
    for _ in 0..500 {
      let find = (next_rand(&mut state) % 5000) as i32;
      for backend in test_backends() {
        if let Some(i) = index_match_with(&v, find, backend) {
          assert_eq!(v[i], find);
        }
      }
    }
  }

  #[test]
  fn test_index_match_random_sorted() {
    config_test_logger();
    let mut state = 0x1234_5678_9ABC_DEF1u64;
    for round in 0..20 {
      let n = (next_rand(&mut state) % 3000) as usize;
      let mut v: Vec<i64> = (0..n).map(|_| (next_rand(&mut state) % 100_000) as i64).collect();
      v.sort_unstable();
      debug!("random sorted round {}: n={}", round, n);
      for _ in 0..200 {
        let find = (next_rand(&mut state) % 100_000) as i64;
        check_index_match_dual_paths(&v, find, v.binary_search(&find).is_ok());
      }
    }
  }

  // =============================================================================
  //   BULK (16 TARGETS)
  // =============================================================================

  #[test]
  fn test_bulk_index_match_mixed_targets() {
    config_test_logger();
    let v: Vec<i32> = (0..1000).map(|i| i * 2).collect();
    let mut targets = [0i32; BULK_LANES];
    for (lane, t) in targets.iter_mut().enumerate() {
      // Even lanes present, odd lanes absent, two lanes out of range.
      *t = if lane % 2 == 0 { lane as i32 * 100 } else { lane as i32 * 100 + 1 };
    }
    targets[3] = -50;
    targets[5] = 5000;

    let found = bulk_index_match_i32(&v, &targets);
    for lane in 0..BULK_LANES {
      if lane % 2 == 0 {
        assert_eq!(found[lane], Some(lane * 50), "lane {}", lane);
      } else {
        assert_eq!(found[lane], None, "lane {}", lane);
      }
    }
    check_bulk_dual_paths(&v, &targets);
  }

  #[test]
  fn test_bulk_index_match_all_absent_terminates() {
    config_test_logger();
    let v: Vec<i32> = (0..4097).map(|i| i * 4).collect();
    let targets: [i32; BULK_LANES] = std::array::from_fn(|lane| lane as i32 * 1000 + 1);
    let found = bulk_index_match_i32(&v, &targets);
    assert!(found.iter().all(|r| r.is_none()));
    check_bulk_dual_paths(&v, &targets);
  }

  #[test]
  fn test_bulk_index_match_small_and_empty() {
    config_test_logger();
    let targets: [i32; BULK_LANES] = std::array::from_fn(|lane| lane as i32);
    assert_eq!(bulk_index_match_i32(&[], &targets), [None; BULK_LANES]);

    let single = [7i32];
    let found = bulk_index_match_i32(&single, &targets);
    for lane in 0..BULK_LANES {
      assert_eq!(found[lane], if lane == 7 { Some(0) } else { None });
    }

    for n in 1..70 {
      let v: Vec<i32> = (0..n).map(|i| i * 3).collect();
      let targets: [i32; BULK_LANES] = std::array::from_fn(|lane| lane as i32 * 13 - 3);
      check_bulk_dual_paths(&v, &targets);
    }
  }

  #[test]
  fn test_bulk_index_match_random() {
    config_test_logger();
    let mut state = 0xDEAD_BEEF_CAFE_F00Du64;
    for _ in 0..30 {
      let n = 1 + (next_rand(&mut state) % 5000) as usize;
      let mut v: Vec<i32> = (0..n).map(|_| (next_rand(&mut state) % 20_000) as i32).collect();
      v.sort_unstable();
      let targets: [i32; BULK_LANES] =
        std::array::from_fn(|_| (next_rand(&mut state) % 20_000) as i32);
      check_bulk_dual_paths(&v, &targets);
    }
  }

  #[test]
  fn test_bulk_index_match_all_slices() {
    config_test_logger();
    let v: Vec<i32> = (0..500).map(|i| i * 7).collect();
    let targets: Vec<i32> = (0..40).map(|i| i * 21 + (i % 3)).collect();

    let found = bulk_index_match_all_i32(&v, &targets);
    assert_eq!(found.len(), targets.len());
    for (t, r) in targets.iter().zip(found.iter()) {
      let expected = v.iter().position(|x| x == t);
      assert_eq!(*r, expected, "target {}", t);
    }

    for backend in test_backends() {
      assert_eq!(bulk_index_match_all_i32_with(&v, &targets, backend), found);
    }
    assert!(bulk_index_match_all_i32(&v, &[]).is_empty());
  }
}

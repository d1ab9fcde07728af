//! Property-Based Test Generators
//!
//! Provides proptest strategies for epoch values that stay inside the
//! ranges the normalizer treats as seconds or milliseconds.

use proptest::prelude::*;

/// 0001-01-01T00:00:00Z
pub const MIN_EPOCH_SECONDS: i64 = -62_135_596_800;
/// 9999-12-31T23:59:59Z
pub const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

/// Strategy for epoch seconds between years 1 and 9999
pub fn epoch_seconds_strategy() -> impl Strategy<Value = i64> {
    MIN_EPOCH_SECONDS..=MAX_EPOCH_SECONDS
}

/// Strategy for whole-second epoch milliseconds above the seconds threshold
///
/// Values are multiples of 1000 so that `t_ms / 1000` is exact.
pub fn epoch_millis_strategy() -> impl Strategy<Value = i64> {
    (1_000_000_001i64..=MAX_EPOCH_SECONDS).prop_map(|secs| secs * 1_000)
}

/// Strategy for fractional epoch seconds around the present era
pub fn epoch_float_seconds_strategy() -> impl Strategy<Value = f64> {
    -1.0e9f64..4.0e9f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_millis_strategy_is_exact_and_above_threshold() {
        let mut runner = TestRunner::default();
        for _ in 0..100 {
            let value = epoch_millis_strategy().new_tree(&mut runner).unwrap().current();
            assert_eq!(value % 1_000, 0);
            assert!(value > 1_000_000_000_000);
        }
    }
}

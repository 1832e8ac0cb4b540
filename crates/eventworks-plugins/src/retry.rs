//! Retry backoff for plugin initialization: exponential with base 3s,
//! multiplier 2, capped at 10 attempts before a transient failure is
//! promoted to permanent.

use std::time::Duration;

/// Delay before the `attempt`-th retry (0-indexed): `base * multiplier^attempt`.
pub fn retry_delay(attempt: u32, base_secs: u64, multiplier: u64) -> Duration {
    let factor = multiplier.saturating_pow(attempt);
    Duration::from_secs(base_secs.saturating_mul(factor))
}

pub fn exhausted(attempt: u32, max_attempts: u32) -> bool {
    attempt >= max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_each_attempt_from_a_three_second_base() {
        assert_eq!(retry_delay(0, 3, 2), Duration::from_secs(3));
        assert_eq!(retry_delay(1, 3, 2), Duration::from_secs(6));
        assert_eq!(retry_delay(3, 3, 2), Duration::from_secs(24));
    }

    #[test]
    fn exhausted_after_ten_attempts() {
        assert!(!exhausted(9, 10));
        assert!(exhausted(10, 10));
    }
}

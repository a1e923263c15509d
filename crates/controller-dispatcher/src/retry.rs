//! Exponential backoff with jitter for the `ErrUnavailable`-only retry
//! policy (§4.4), grounded in the attempt-indexed exponential computation
//! the teacher uses in `manager::core::calculate_backoff`, adapted to the
//! spec's symmetric ±25% jitter rather than the teacher's additive one.

use std::time::Duration;

use controller_core::RetryPolicy;
use rand::Rng;

/// The delay to sleep before retry attempt `attempt` (0-indexed: the delay
/// before the *second* try overall is `backoff_delay(0, policy)`).
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base_ms = policy.base.as_millis() as f64;
    let cap_ms = policy.max_delay.as_millis() as f64;

    let nominal_ms = (base_ms * policy.factor.powi(attempt as i32)).min(cap_ms);
    let multiplier = 1.0 + rand::thread_rng().gen_range(-policy.jitter..=policy.jitter);
    let jittered_ms = (nominal_ms * multiplier).max(0.0);

    Duration::from_millis(jittered_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn backoff_grows_with_attempt_and_stays_within_jitter_band() {
        let policy = policy();
        for attempt in 0..4 {
            let nominal_ms = policy.base.as_millis() as f64 * policy.factor.powi(attempt as i32);
            let expected_nominal = nominal_ms.min(policy.max_delay.as_millis() as f64);
            let delay = backoff_delay(attempt, &policy);
            let lower = (expected_nominal * (1.0 - policy.jitter)).floor() as u64;
            let upper = (expected_nominal * (1.0 + policy.jitter)).ceil() as u64;
            assert!(delay.as_millis() as u64 <= upper, "attempt {attempt}: {delay:?} exceeds {upper}ms");
            assert!(delay.as_millis() as u64 + 1 >= lower.saturating_sub(1), "attempt {attempt}: {delay:?} below {lower}ms");
        }
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let policy = policy();
        let delay = backoff_delay(10, &policy);
        assert!(delay <= policy.max_delay + policy.max_delay.mul_f64(policy.jitter));
    }

    #[test]
    fn default_max_attempts_matches_spec() {
        assert_eq!(RetryPolicy::default().attempts, 3);
    }
}

/*!
 * Retry Logic: Broker-Side Delayed Exchange Backoff
 *
 * The backoff happens in the broker's delayed exchange, not as an
 * in-process sleep: a worker crash between ack and the next attempt does
 * not lose the retry, and a backing-off delivery doesn't hold a prefetch
 * slot for the whole delay window.
 */

use rand::Rng;

/// HTTP status codes that warrant another attempt.
pub const RETRYABLE_CODES: [i32; 5] = [408, 429, 502, 503, 504];

pub fn is_retryable_code(code: i32) -> bool {
    RETRYABLE_CODES.contains(&code)
}

/// Exponential backoff with jitter, in milliseconds.
///
/// `base = min(2^tries * 1000, max_delay_ms)`, then add jitter drawn
/// uniformly from `[0, base/2)`. At `tries = 5` this lands in
/// `[32000, 48000)`; past the cap it saturates to `[max_delay_ms,
/// max_delay_ms * 1.5)`.
pub fn next_delay_ms(tries: u32, max_delay_ms: u64) -> u64 {
    let base = 1000u64
        .saturating_mul(1u64.checked_shl(tries).unwrap_or(u64::MAX))
        .min(max_delay_ms);

    let jitter_ceiling = base / 2;
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..jitter_ceiling)
    };

    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_retryable_code_matches_exact_set() {
        for code in RETRYABLE_CODES {
            assert!(is_retryable_code(code));
        }
        for code in [200, 400, 401, 403, 404, 410, 500, 501] {
            assert!(!is_retryable_code(code));
        }
    }

    #[test]
    fn delay_at_tries_one_is_one_to_one_point_five_seconds() {
        for _ in 0..1000 {
            let delay = next_delay_ms(1, 60_000);
            assert!((2000..3000).contains(&delay), "delay={delay}");
        }
    }

    #[test]
    fn delay_at_tries_five_is_thirtytwo_to_fortyeight_seconds() {
        for _ in 0..1000 {
            let delay = next_delay_ms(5, 60_000);
            assert!((32_000..48_000).contains(&delay), "delay={delay}");
        }
    }

    #[test]
    fn delay_saturates_at_ninety_seconds() {
        for tries in [10, 20, 32] {
            for _ in 0..200 {
                let delay = next_delay_ms(tries, 60_000);
                assert!(delay >= 60_000 && delay < 90_000, "delay={delay}");
            }
        }
    }
}

use std::time::Duration;

const WORKERS: &str = "PULSEGUARD_WORKERS";

/// Worker count from the environment, if set to a positive number
pub fn get_workers() -> Option<usize> {
    std::env::var(WORKERS)
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|&workers| workers > 0)
}

const API_TOKEN: &str = "PULSEGUARD_API_TOKEN";

pub fn get_api_token() -> Option<String> {
    std::env::var(API_TOKEN).ok().filter(|token| !token.is_empty())
}

/// Exponential backoff: `base_ms * 2^(attempt - 1)`, capped at `max_ms`
///
/// Attempt 0 is the first try and never waits.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    Duration::from_millis(delay_ms.min(max_ms))
}

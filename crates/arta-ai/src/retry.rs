use std::time::Duration;

/// True for statuses worth retrying before surfacing an error.
pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Deterministic exponential backoff, capped at 2^6 multiples of the base.
pub fn next_backoff_ms(base_delay_ms: u64, attempt: usize) -> u64 {
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    base_delay_ms.max(1).saturating_mul(2_u64.pow(exponent))
}

/// Numeric `Retry-After` header value, in seconds.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Delay before the given retry attempt, honoring `Retry-After` when present.
pub fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after_seconds: Option<u64>,
) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    Duration::from_millis(next_backoff_ms(base_delay_ms, attempt))
}

/// True for transport-level failures that a fresh attempt can fix.
pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::{next_backoff_ms, parse_retry_after, retry_delay, should_retry_status};

    #[test]
    fn unit_should_retry_status_selects_transient_codes() {
        assert!(should_retry_status(429));
        assert!(should_retry_status(503));
        assert!(should_retry_status(408));
        assert!(!should_retry_status(400));
        assert!(!should_retry_status(401));
        assert!(!should_retry_status(404));
    }

    #[test]
    fn unit_next_backoff_ms_doubles_and_caps() {
        assert_eq!(next_backoff_ms(100, 1), 100);
        assert_eq!(next_backoff_ms(100, 2), 200);
        assert_eq!(next_backoff_ms(100, 3), 400);
        assert_eq!(next_backoff_ms(100, 10), 6_400);
    }

    #[test]
    fn unit_retry_delay_prefers_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        let retry_after = parse_retry_after(&headers);
        assert_eq!(retry_delay(100, 1, retry_after), Duration::from_secs(3));
        assert_eq!(retry_delay(100, 2, None), Duration::from_millis(200));
    }

    #[test]
    fn unit_parse_retry_after_rejects_invalid_values() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }
}

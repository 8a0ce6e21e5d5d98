//! Shared HTTP plumbing for the remote model APIs.

use companion_common::{CompanionError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::Response;

/// Pass a successful response through, or turn an error response into
/// [`CompanionError::Upstream`] carrying the status and any `Retry-After`.
pub async fn check_status(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(CompanionError::Upstream {
        service,
        status: Some(status.as_u16()),
        message: format!("{status}: {}", truncate_body(&body)),
        retry_after_ms,
    })
}

/// Map a transport-level failure (connect, timeout, decode).
pub fn transport_error(service: &'static str, err: reqwest::Error) -> CompanionError {
    CompanionError::upstream(service, err.to_string())
}

/// `Retry-After` in delta-seconds form, as milliseconds. Saturates on
/// absurdly large values; callers clamp to their own maximum delay.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(5000));
        assert_eq!(parse_retry_after(" 12 "), Some(12_000));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn huge_retry_after_saturates() {
        assert_eq!(parse_retry_after("18446744073709551615"), Some(u64::MAX));
        assert_eq!(
            parse_retry_after("18446744073709552"),
            Some(u64::MAX),
            "seconds that overflow once scaled to millis"
        );
        assert_eq!(parse_retry_after("99999999999999999999"), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        assert_eq!(truncate_body(&body).len(), 512);
        assert_eq!(truncate_body("short"), "short");
    }
}

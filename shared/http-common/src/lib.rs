//! Shared HTTP utilities for the URL shortener workspace.
//!
//! Provides common response builders, short-URL construction and time
//! conversion used by the api-server.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Short URL not found",
        "gone" => "Short URL has expired",
        "bad_request" => "Bad request",
        "invalid_url" => "Invalid target URL",
        "invalid_code" => "Invalid short code",
        "conflict" => "Short code already exists",
        "exhausted" => "Failed to generate unique short code",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// URL Building
// ============================================================================

/// Build a short URL for `code`.
///
/// A configured `base` (e.g. `https://sho.rt/`) wins; otherwise the URL is
/// derived from the request host, or left relative when there is none.
pub fn build_short_url(base: Option<&str>, host: &str, code: &str) -> String {
    match base.filter(|b| !b.is_empty()) {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), code),
        None if host.is_empty() => format!("/{}", code),
        None => format!("http://{}/{}", host, code),
    }
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 string to SystemTime.
///
/// Returns an error if the string is not a valid RFC3339 timestamp.
pub fn rfc3339_to_system_time(s: &str) -> Result<SystemTime, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.with_timezone(&Utc).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_json_err() {
        let err = json_err("not_found");
        assert_eq!(err, serde_json::json!({"error": {"code": "not_found", "message": "Short URL not found"}}));

        let err = json_err("invalid_code");
        assert_eq!(err["error"]["message"], "Invalid short code");

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(err, serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}}));
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("bad_request", "Invalid input");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "bad_request", "message": "Invalid input"}})
        );
    }

    #[test]
    fn test_build_short_url() {
        assert_eq!(build_short_url(Some("https://sho.rt/"), "ignored", "abc"), "https://sho.rt/abc");
        assert_eq!(build_short_url(Some(""), "example.com", "abc"), "http://example.com/abc");
        assert_eq!(build_short_url(None, "example.com:8080", "abc"), "http://example.com:8080/abc");
        assert_eq!(build_short_url(None, "", "abc"), "/abc");
    }

    #[test]
    fn test_rfc3339_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let s = system_time_to_rfc3339(t);
        assert_eq!(s, "2023-11-14T22:13:20Z");
        assert_eq!(rfc3339_to_system_time(&s).unwrap(), t);
        assert_eq!(
            rfc3339_to_system_time("2023-11-14T23:13:20+01:00").unwrap(),
            t
        );
        assert!(rfc3339_to_system_time("yesterday").is_err());
    }
}

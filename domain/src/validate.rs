//! Input validation helpers. Keep logic minimal and deterministic.

use url::Url;

use crate::code::in_alphabet;
use crate::{CodePolicy, CoreError, ShortCode};

/// Longest target URL accepted.
pub const MAX_URL_LEN: usize = 2048;

/// Validate a target URL and return it trimmed.
///
/// The URL must parse as absolute, use the http or https scheme and carry a
/// host.
pub fn validate_target_url(s: &str) -> Result<String, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("empty".into()));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(CoreError::InvalidUrl("too long".into()));
    }
    let parsed = Url::parse(trimmed).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidUrl(
            "must start with http:// or https://".into(),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::InvalidUrl("missing host".into()));
    }
    Ok(trimmed.to_string())
}

/// Validate a caller-supplied code against the policy's length bounds and the
/// generator alphabet. Uniqueness is not checked here.
pub fn validate_custom_code(s: &str, policy: &CodePolicy) -> Result<ShortCode, CoreError> {
    let len = s.len();
    if len < policy.min_length || len > policy.max_length {
        return Err(CoreError::InvalidFormat(format!(
            "length must be between {} and {}",
            policy.min_length, policy.max_length
        )));
    }
    if !in_alphabet(s) {
        return Err(CoreError::InvalidFormat(
            "only ASCII letters and digits are allowed".into(),
        ));
    }
    ShortCode::new(s)
}

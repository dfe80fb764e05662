//! Domain library for the URL Shortener.
//!
//! Holds the domain types, ports (traits), error definitions and the
//! [`service::LinkService`] that allocates, resolves and retires short codes.
//! Keep adapters and IO concerns out of this crate; the only storage living
//! here is the in-memory repository used by tests and local demos.

use std::time::SystemTime;

use thiserror::Error;

/// A URL-safe code identifying a short link.
///
/// Construction only checks that the value is non-empty ASCII alphanumeric.
/// Length bounds for caller-supplied codes are a [`CodePolicy`] concern, see
/// [`validate::validate_custom_code`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidFormat("empty".into()));
        }
        if !val.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidFormat("invalid characters".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input data for creating a new short link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewLink {
    pub target_url: String,
    /// Caller-chosen code; validated against the policy and never retried.
    pub custom_code: Option<String>,
    pub expires_at: Option<SystemTime>,
}

/// Partial update of a link. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub target_url: Option<String>,
    /// `Some(None)` clears the expiration.
    pub expires_at: Option<Option<SystemTime>>,
}

/// Stored short link mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortLink {
    pub code: ShortCode,
    pub target_url: String,
    pub created_at: SystemTime,
    /// Last explicit update or deletion.
    pub updated_at: Option<SystemTime>,
    /// Links stop resolving once this instant is reached.
    pub expires_at: Option<SystemTime>,
    /// Number of successful resolutions. Only the store's atomic increment
    /// touches this after creation.
    pub click_count: u64,
    /// Soft-delete flag. Inactive links keep their code reserved.
    pub is_active: bool,
}

impl ShortLink {
    /// Create a new ShortLink with click_count 0 and is_active true.
    pub fn new(code: ShortCode, target_url: String, created_at: SystemTime) -> Self {
        Self {
            code,
            target_url,
            created_at,
            updated_at: None,
            expires_at: None,
            click_count: 0,
            is_active: true,
        }
    }

    /// Check if the link has expired based on the given current time.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            code: self.code.clone(),
            click_count: self.click_count,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        }
    }
}

/// Usage snapshot of a single link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStats {
    pub code: ShortCode,
    pub click_count: u64,
    pub created_at: SystemTime,
    pub expires_at: Option<SystemTime>,
    pub is_active: bool,
}

/// Tunables for code generation and custom code validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodePolicy {
    /// Length of generated codes.
    pub length: usize,
    /// Inclusive bounds for caller-supplied codes.
    pub min_length: usize,
    pub max_length: usize,
    /// How many generated candidates `create` tries before giving up.
    pub max_attempts: usize,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            length: 6,
            min_length: 3,
            max_length: 20,
            max_attempts: 5,
        }
    }
}

impl CodePolicy {
    /// Reject policies that could never produce or accept a valid code.
    pub fn check(&self) -> Result<(), String> {
        if self.min_length == 0 {
            return Err("min_length must be at least 1".into());
        }
        if self.min_length > self.max_length {
            return Err(format!(
                "min_length {} exceeds max_length {}",
                self.min_length, self.max_length
            ));
        }
        if self.length < self.min_length || self.length > self.max_length {
            return Err(format!(
                "length {} outside {}..={}",
                self.length, self.min_length, self.max_length
            ));
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        Ok(())
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Code generator interface. Implementations need not guarantee uniqueness;
/// the service resolves collisions by retrying.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> ShortCode;
}

/// Repository port for persisting and loading links.
///
/// `insert` and `increment_clicks` must be atomic with respect to concurrent
/// callers: one winner per code on insert, no lost increments.
pub trait LinkRepository: Send + Sync {
    /// Persist a new link. Fails with `DuplicateCode` if the code is taken,
    /// including by an inactive link.
    fn insert(&self, link: ShortLink) -> Result<(), CoreError>;
    fn get(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError>;
    /// Write the mutable fields (target_url, expires_at, updated_at) of an
    /// active link. Never touches click_count.
    fn update(&self, link: &ShortLink) -> Result<(), CoreError>;
    /// Soft delete an active link.
    fn delete(&self, code: &ShortCode, deleted_at: SystemTime) -> Result<(), CoreError>;
    /// Atomically increment the click count of an active link.
    fn increment_clicks(&self, code: &ShortCode) -> Result<(), CoreError>;
    /// Active links, newest first.
    fn list(&self, limit: usize) -> Result<Vec<ShortLink>, CoreError>;
}

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid code: {0}")]
    InvalidFormat(String),
    #[error("code already in use")]
    DuplicateCode,
    #[error("no free code found after {attempts} attempts")]
    GenerationExhausted { attempts: usize },
    #[error("not found")]
    NotFound,
    #[error("link is inactive")]
    Inactive,
    #[error("link has expired")]
    Expired,
    #[error("storage error: {0}")]
    Storage(String),
}

pub mod adapters;
pub mod code;
pub mod service;
pub mod validate;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::code::RandomCodeGenerator;
use crate::validate::{validate_custom_code, validate_target_url};
use crate::{
    Clock, CodeGenerator, CodePolicy, CoreError, LinkRepository, LinkStats, LinkUpdate, NewLink,
    ShortCode, ShortLink,
};

/// Application service orchestrating creation, resolution and retirement of
/// short links.
///
/// It is generic over repository, code generator, and clock and holds no
/// mutable state of its own: every shared mutation goes through the
/// repository, so one instance can serve any number of concurrent callers.
pub struct LinkService<R: LinkRepository, G: CodeGenerator, C: Clock> {
    repo: R,
    generator: G,
    clock: C,
    policy: CodePolicy,
}

impl<R: LinkRepository, G: CodeGenerator, C: Clock> LinkService<R, G, C> {
    pub fn new(repo: R, generator: G, clock: C) -> Self {
        Self {
            repo,
            generator,
            clock,
            policy: CodePolicy::default(),
        }
    }

    /// Replace the code policy. The generator keeps its own length; see
    /// [`LinkService::with_random_codes`] to derive both from one policy.
    pub fn with_policy(mut self, policy: CodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CodePolicy {
        &self.policy
    }

    /// Create a new short link.
    ///
    /// A custom code is validated and inserted once; a taken code surfaces as
    /// `DuplicateCode`. Without one, generated candidates are inserted until
    /// one sticks or `max_attempts` collisions have been seen.
    pub fn create(&self, input: NewLink) -> Result<ShortLink, CoreError> {
        let target_url = validate_target_url(&input.target_url)?;
        let now = floor_secs(self.clock.now());
        let expires_at = input.expires_at.map(ceil_secs);

        if let Some(custom) = input.custom_code.as_deref() {
            let code = validate_custom_code(custom, &self.policy)?;
            let link = new_link(code, target_url, now, expires_at);
            self.repo.insert(link.clone())?;
            info!(code = %link.code, "created link with custom code");
            return Ok(link);
        }

        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            let code = self.generator.generate();
            let link = new_link(code, target_url.clone(), now, expires_at);
            match self.repo.insert(link.clone()) {
                Ok(()) => {
                    info!(code = %link.code, attempt, "created link");
                    return Ok(link);
                }
                Err(CoreError::DuplicateCode) => {
                    debug!(code = %link.code, attempt, "generated code collided");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(attempts, "gave up allocating a short code");
        Err(CoreError::GenerationExhausted { attempts })
    }

    /// Resolve a code to its target URL, counting the click.
    ///
    /// Inactive and expired links are reported as such and do not count. If
    /// the link disappears between the check and the increment the result is
    /// `NotFound`.
    pub fn resolve(&self, code: &ShortCode) -> Result<String, CoreError> {
        let link = self.repo.get(code)?.ok_or(CoreError::NotFound)?;
        if !link.is_active {
            return Err(CoreError::Inactive);
        }
        if link.is_expired(self.clock.now()) {
            return Err(CoreError::Expired);
        }
        match self.repo.increment_clicks(code) {
            Ok(()) => {
                debug!(code = %code, "resolved");
                Ok(link.target_url)
            }
            Err(CoreError::NotFound) => {
                debug!(code = %code, "link vanished before click was recorded");
                Err(CoreError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Partially update an active link's target URL and/or expiration.
    pub fn update(&self, code: &ShortCode, changes: LinkUpdate) -> Result<ShortLink, CoreError> {
        let target_url = changes
            .target_url
            .as_deref()
            .map(validate_target_url)
            .transpose()?;

        let mut link = self
            .repo
            .get(code)?
            .filter(|l| l.is_active)
            .ok_or(CoreError::NotFound)?;
        if let Some(url) = target_url {
            link.target_url = url;
        }
        if let Some(expires_at) = changes.expires_at {
            link.expires_at = expires_at.map(ceil_secs);
        }
        link.updated_at = Some(floor_secs(self.clock.now()));

        self.repo.update(&link)?;
        info!(code = %code, "updated link");
        Ok(link)
    }

    /// Soft delete a link. Its code stays reserved.
    pub fn delete(&self, code: &ShortCode) -> Result<(), CoreError> {
        self.repo.delete(code, floor_secs(self.clock.now()))?;
        info!(code = %code, "deleted link");
        Ok(())
    }

    /// Usage statistics, reported for inactive links too.
    pub fn get_stats(&self, code: &ShortCode) -> Result<LinkStats, CoreError> {
        self.repo
            .get(code)?
            .map(|l| l.stats())
            .ok_or(CoreError::NotFound)
    }

    /// Fetch an active link without counting a click.
    pub fn get(&self, code: &ShortCode) -> Result<ShortLink, CoreError> {
        self.repo
            .get(code)?
            .filter(|l| l.is_active)
            .ok_or(CoreError::NotFound)
    }

    /// List active links, newest first, up to the given limit.
    pub fn list(&self, limit: usize) -> Result<Vec<ShortLink>, CoreError> {
        self.repo.list(limit)
    }
}

impl<R: LinkRepository, C: Clock> LinkService<R, RandomCodeGenerator, C> {
    /// Service drawing random codes whose length comes from `policy`.
    pub fn with_random_codes(repo: R, clock: C, policy: CodePolicy) -> Self {
        Self::new(repo, RandomCodeGenerator::from_policy(&policy), clock).with_policy(policy)
    }
}

// Stores keep whole seconds. Creation and update times round down, expiry
// rounds up so a link never stops resolving before the requested instant.
fn floor_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

fn ceil_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) if d.subsec_nanos() > 0 => UNIX_EPOCH + Duration::from_secs(d.as_secs() + 1),
        _ => floor_secs(t),
    }
}

fn new_link(
    code: ShortCode,
    target_url: String,
    now: SystemTime,
    expires_at: Option<SystemTime>,
) -> ShortLink {
    let mut link = ShortLink::new(code, target_url, now);
    link.expires_at = expires_at;
    link
}

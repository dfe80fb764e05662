use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::{CoreError, LinkRepository, ShortCode, ShortLink};

/// Simple in-memory repository for tests and local demos. A single mutex
/// guards the map, which makes insert and increment trivially atomic.
pub struct InMemoryRepo {
    inner: Mutex<BTreeMap<String, ShortLink>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, ShortLink>>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Storage("mutex poisoned".into()))
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkRepository for InMemoryRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        let key = link.code.as_str().to_string();
        if map.contains_key(&key) {
            return Err(CoreError::DuplicateCode);
        }
        map.insert(key, link);
        Ok(())
    }

    fn get(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        Ok(self.lock()?.get(code.as_str()).cloned())
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        match map.get_mut(link.code.as_str()) {
            Some(stored) if stored.is_active => {
                stored.target_url = link.target_url.clone();
                stored.expires_at = link.expires_at;
                stored.updated_at = link.updated_at;
                Ok(())
            }
            _ => Err(CoreError::NotFound),
        }
    }

    fn delete(&self, code: &ShortCode, deleted_at: SystemTime) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        match map.get_mut(code.as_str()) {
            Some(stored) if stored.is_active => {
                stored.is_active = false;
                stored.updated_at = Some(deleted_at);
                Ok(())
            }
            _ => Err(CoreError::NotFound),
        }
    }

    fn increment_clicks(&self, code: &ShortCode) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        match map.get_mut(code.as_str()) {
            Some(stored) if stored.is_active => {
                stored.click_count += 1;
                Ok(())
            }
            _ => Err(CoreError::NotFound),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<ShortLink>, CoreError> {
        let map = self.lock()?;
        let mut items: Vec<_> = map.values().filter(|l| l.is_active).cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    fn mk_link(code: &str) -> ShortLink {
        ShortLink::new(
            ShortCode::new(code).unwrap(),
            format!("https://example.com/{code}"),
            UNIX_EPOCH,
        )
    }

    #[test]
    fn insert_get_roundtrip() {
        let repo = InMemoryRepo::new();
        let link = mk_link("abc");
        repo.insert(link.clone()).unwrap();
        assert_eq!(repo.get(&link.code).unwrap(), Some(link));
    }

    #[test]
    fn insert_rejects_duplicate() {
        let repo = InMemoryRepo::new();
        repo.insert(mk_link("dup")).unwrap();
        let err = repo.insert(mk_link("dup")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCode));
    }

    #[test]
    fn deleted_code_stays_reserved() {
        let repo = InMemoryRepo::new();
        let link = mk_link("gone");
        repo.insert(link.clone()).unwrap();
        repo.delete(&link.code, UNIX_EPOCH).unwrap();
        assert!(matches!(repo.insert(mk_link("gone")), Err(CoreError::DuplicateCode)));
        assert!(matches!(repo.delete(&link.code, UNIX_EPOCH), Err(CoreError::NotFound)));
    }

    #[test]
    fn update_keeps_clicks() {
        let repo = InMemoryRepo::new();
        let mut link = mk_link("upd");
        repo.insert(link.clone()).unwrap();
        repo.increment_clicks(&link.code).unwrap();

        // A stale copy carries click_count 0; it must not overwrite the counter.
        link.target_url = "https://new.example".into();
        repo.update(&link).unwrap();

        let got = repo.get(&link.code).unwrap().unwrap();
        assert_eq!(got.target_url, "https://new.example");
        assert_eq!(got.click_count, 1);
    }

    #[test]
    fn increment_missing_or_inactive_is_not_found() {
        let repo = InMemoryRepo::new();
        let link = mk_link("inc");
        assert!(matches!(repo.increment_clicks(&link.code), Err(CoreError::NotFound)));
        repo.insert(link.clone()).unwrap();
        repo.delete(&link.code, UNIX_EPOCH).unwrap();
        assert!(matches!(repo.increment_clicks(&link.code), Err(CoreError::NotFound)));
    }

    #[test]
    fn list_newest_first_and_limited() {
        let repo = InMemoryRepo::new();
        for i in 0..5u64 {
            let mut l = mk_link(&format!("k{i}"));
            l.created_at = UNIX_EPOCH + Duration::from_secs(i);
            repo.insert(l).unwrap();
        }
        repo.delete(&ShortCode::new("k4").unwrap(), UNIX_EPOCH).unwrap();
        let items = repo.list(3).unwrap();
        let codes: Vec<_> = items.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, ["k3", "k2", "k1"]);
    }

    #[test]
    fn concurrent_increments_are_counted() {
        let repo = Arc::new(InMemoryRepo::new());
        let link = mk_link("hot");
        repo.insert(link.clone()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let code = link.code.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        repo.increment_clicks(&code).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(repo.get(&link.code).unwrap().unwrap().click_count, 400);
    }
}

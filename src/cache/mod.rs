//! Regeneration cache for materialized pages
//!
//! Holds the last successful build of each route. An entry is fresh for the
//! regeneration interval declared by the page. After that it is stale: it is
//! still served, and exactly one caller is handed the claim to rebuild it
//! until the rebuild is stored or released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cached page for one route
struct Slot<T> {
    value: Arc<T>,
    built_at: Instant,
    /// `None` means the page never goes stale
    revalidate: Option<Duration>,
    /// A rebuild claim is outstanding
    refreshing: bool,
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum Lookup<T> {
    /// Nothing cached; the caller builds the page inline
    Missing,
    /// Within the regeneration interval
    Fresh(Arc<T>),
    /// Past the interval; serve it, and rebuild when `rebuild` is set
    Stale { value: Arc<T>, rebuild: bool },
}

/// Per-route store of materialized pages
pub struct RegenerationCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    /// Evict the oldest build once this many routes are held
    capacity: Option<usize>,
}

impl<T> Default for RegenerationCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RegenerationCache<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Cache holding at most `capacity` routes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        // A panic while holding the lock cannot leave a slot half-written
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up `route` as of now
    pub fn lookup(&self, route: &str) -> Lookup<T> {
        self.lookup_at(route, Instant::now())
    }

    /// Look up `route` as of `now`
    pub fn lookup_at(&self, route: &str, now: Instant) -> Lookup<T> {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(route) else {
            return Lookup::Missing;
        };

        let stale = match slot.revalidate {
            Some(interval) => now.saturating_duration_since(slot.built_at) >= interval,
            None => false,
        };

        if !stale {
            return Lookup::Fresh(slot.value.clone());
        }

        let rebuild = !slot.refreshing;
        slot.refreshing = true;
        Lookup::Stale {
            value: slot.value.clone(),
            rebuild,
        }
    }

    /// Store a fresh build, clearing any rebuild claim
    pub fn store(&self, route: &str, value: T, revalidate: Option<Duration>) -> Arc<T> {
        self.store_at(route, value, revalidate, Instant::now())
    }

    pub fn store_at(
        &self,
        route: &str,
        value: T,
        revalidate: Option<Duration>,
        now: Instant,
    ) -> Arc<T> {
        let value = Arc::new(value);
        let mut slots = self.slots();
        if let Some(capacity) = self.capacity {
            if !slots.contains_key(route) && slots.len() >= capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.built_at)
                    .map(|(key, _)| key.clone());
                if let Some(key) = oldest {
                    slots.remove(&key);
                    tracing::debug!("Evicted {}", key);
                }
            }
        }
        slots.insert(
            route.to_string(),
            Slot {
                value: value.clone(),
                built_at: now,
                revalidate,
                refreshing: false,
            },
        );
        tracing::debug!("Cached {} ({} routes held)", route, slots.len());
        value
    }

    /// Give up a rebuild claim; the stale copy stays and the next stale
    /// lookup claims again
    pub fn release(&self, route: &str) {
        if let Some(slot) = self.slots().get_mut(route) {
            slot.refreshing = false;
        }
    }

    /// Drop a route, e.g. after its content disappeared
    pub fn invalidate(&self, route: &str) {
        if self.slots().remove(route).is_some() {
            tracing::debug!("Invalidated {}", route);
        }
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// Rebuild claim held by a background task
///
/// Dropping an unfinished claim releases it, so a rebuild that panics or is
/// cancelled does not pin the route to its stale copy.
pub struct RebuildClaim<T> {
    cache: Arc<RegenerationCache<T>>,
    route: String,
    done: bool,
}

impl<T> RebuildClaim<T> {
    pub fn new(cache: Arc<RegenerationCache<T>>, route: impl Into<String>) -> Self {
        Self {
            cache,
            route: route.into(),
            done: false,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Store the rebuilt page
    pub fn store(mut self, value: T, revalidate: Option<Duration>) {
        self.done = true;
        self.cache.store(&self.route, value, revalidate);
    }

    /// Drop the route, its content is gone
    pub fn invalidate(mut self) {
        self.done = true;
        self.cache.invalidate(&self.route);
    }
}

impl<T> Drop for RebuildClaim<T> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.release(&self.route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_missing_then_fresh() {
        let cache = RegenerationCache::new();
        assert!(matches!(cache.lookup("/post/a"), Lookup::Missing));

        let t0 = Instant::now();
        cache.store_at("/post/a", "page a".to_string(), Some(DAY), t0);
        match cache.lookup_at("/post/a", t0 + Duration::from_secs(60)) {
            Lookup::Fresh(v) => assert_eq!(v.as_str(), "page a"),
            other => panic!("expected fresh, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_hands_out_one_rebuild_claim() {
        let cache = RegenerationCache::new();
        let t0 = Instant::now();
        cache.store_at("/post/a", 1, Some(DAY), t0);
        let later = t0 + DAY + Duration::from_secs(1);

        let claims: Vec<bool> = (0..5)
            .map(|_| match cache.lookup_at("/post/a", later) {
                Lookup::Stale { value, rebuild } => {
                    assert_eq!(*value, 1);
                    rebuild
                }
                other => panic!("expected stale, got {:?}", other),
            })
            .collect();
        assert_eq!(claims, [true, false, false, false, false]);

        cache.store_at("/post/a", 2, Some(DAY), later);
        assert!(matches!(cache.lookup_at("/post/a", later), Lookup::Fresh(v) if *v == 2));
    }

    #[test]
    fn test_release_allows_a_new_claim() {
        let cache = RegenerationCache::new();
        let t0 = Instant::now();
        cache.store_at("/", "listing", Some(Duration::from_secs(10)), t0);
        let later = t0 + Duration::from_secs(11);

        assert!(matches!(cache.lookup_at("/", later), Lookup::Stale { rebuild: true, .. }));
        cache.release("/");
        assert!(matches!(cache.lookup_at("/", later), Lookup::Stale { rebuild: true, .. }));
        assert!(matches!(cache.lookup_at("/", later), Lookup::Stale { rebuild: false, .. }));
    }

    #[test]
    fn test_pages_without_interval_never_go_stale() {
        let cache = RegenerationCache::new();
        let t0 = Instant::now();
        cache.store_at("/", 0u8, None, t0);
        assert!(matches!(
            cache.lookup_at("/", t0 + DAY * 365),
            Lookup::Fresh(_)
        ));
    }

    #[test]
    fn test_invalidate() {
        let cache = RegenerationCache::new();
        cache.store("/post/a", (), Some(DAY));
        assert_eq!(cache.len(), 1);
        cache.invalidate("/post/a");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_routes_are_independent() {
        let cache = RegenerationCache::new();
        let t0 = Instant::now();
        cache.store_at("/post/a", 'a', Some(DAY), t0);
        cache.store_at("/post/b", 'b', Some(DAY * 2), t0);
        let later = t0 + DAY + Duration::from_secs(1);

        assert!(matches!(cache.lookup_at("/post/a", later), Lookup::Stale { rebuild: true, .. }));
        assert!(matches!(cache.lookup_at("/post/b", later), Lookup::Fresh(_)));
    }

    #[test]
    fn test_capacity_evicts_oldest_build() {
        let cache = RegenerationCache::with_capacity(2);
        let t0 = Instant::now();
        cache.store_at("/", 0, None, t0);
        cache.store_at("/page?after=A", 1, None, t0 + Duration::from_secs(1));
        // Replacing a held route does not evict
        cache.store_at("/", 2, None, t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);

        cache.store_at("/page?after=B", 3, None, t0 + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);
        assert!(matches!(cache.lookup("/page?after=A"), Lookup::Missing));
        assert!(matches!(cache.lookup("/"), Lookup::Fresh(v) if *v == 2));
    }

    #[test]
    fn test_dropped_claim_is_released() {
        let cache = Arc::new(RegenerationCache::new());
        cache.store("/post/a", 1, Some(Duration::ZERO));
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));

        drop(RebuildClaim::new(cache.clone(), "/post/a"));
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));
    }

    #[test]
    fn test_completed_claim_keeps_new_claims() {
        let cache = Arc::new(RegenerationCache::new());
        cache.store("/post/a", 1, Some(Duration::ZERO));
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));

        RebuildClaim::new(cache.clone(), "/post/a").store(2, Some(Duration::ZERO));
        // The next stale lookup claims again, and nothing releases it behind its back
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: false, .. }));
    }

    #[tokio::test]
    async fn test_panicking_rebuild_releases_claim() {
        let cache = Arc::new(RegenerationCache::new());
        cache.store("/post/a", 1, Some(Duration::ZERO));
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));

        let claim = RebuildClaim::new(cache.clone(), "/post/a");
        let task = tokio::spawn(async move {
            let _claim = claim;
            panic!("rebuild blew up");
        });
        assert!(task.await.is_err());
        assert!(matches!(cache.lookup("/post/a"), Lookup::Stale { rebuild: true, .. }));
    }
}

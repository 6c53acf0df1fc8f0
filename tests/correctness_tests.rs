//! End-to-end correctness tests for the cache facade.
//!
//! Each test drives the public API through a small, deterministic scenario
//! and asserts exactly which keys survive, which are evicted, and what the
//! statistics report afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use windcache::{
    Cache, EventListener, EvictionReason, EvictionStrategy, Profile, ProfileRegistry,
};

/// A long maintenance interval so tests control maintenance explicitly.
const QUIET: Duration = Duration::from_secs(3_600);

fn lru_cache(max: u64) -> Cache<String, i32> {
    Cache::builder()
        .maximum_size(max)
        .eviction_strategy(EvictionStrategy::Lru)
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config")
}

fn key(s: &str) -> String {
    s.to_owned()
}

// ============================================================================
// EVICTION SCENARIOS
// ============================================================================

#[test]
fn lru_eviction_by_size() {
    let cache = lru_cache(2);
    cache.put(key("a"), 1);
    cache.put(key("b"), 2);
    cache.get(&key("a")); // "a" becomes most recently used
    cache.put(key("c"), 3); // "b" evicted

    assert_eq!(cache.get(&key("b")), None);
    assert_eq!(cache.get(&key("a")), Some(1));
    assert_eq!(cache.get(&key("c")), Some(3));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 1);
    cache.shutdown();
}

#[test]
fn size_bound_holds_at_quiescence() {
    let cache = lru_cache(10);
    for i in 0..100 {
        cache.put(format!("key-{i}"), i);
    }
    assert!(cache.len() <= 10);
    assert!(cache.stats().evictions >= 90);
    cache.shutdown();
}

#[test]
fn weight_bound_holds_at_quiescence() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_weight(100)
        .weigher(|_k, v: &String| v.len() as u64)
        .eviction_strategy(EvictionStrategy::Lru)
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    for i in 0..50 {
        cache.put(format!("key-{i}"), "x".repeat(10));
    }
    assert!(cache.total_weight() <= 100);
    // weights are never recomputed, so the aggregate is exact
    assert_eq!(cache.total_weight(), cache.len() * 10);
    cache.shutdown();
}

#[test]
fn tinylfu_admission_beats_recency() {
    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(3)
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    // warm a hot set, with "a" clearly the hottest key
    cache.put(key("a"), 1);
    cache.put(key("b"), 2);
    cache.put(key("c"), 3);
    for i in 0..30 {
        cache.get(&key("a"));
        if i < 10 {
            cache.get(&key("b"));
            cache.get(&key("c"));
        }
    }

    // a burst of one-shot keys must not displace the hot set
    for (i, one_shot) in ["d", "e", "f", "g"].iter().enumerate() {
        cache.put(key(one_shot), i as i32 + 10);
    }

    assert!(cache.len() <= 3);
    // the hottest key is resident; the earlier one-shots were rejected
    assert_eq!(cache.get_if_present(&key("a")), Some(1));
    assert_eq!(cache.get_if_present(&key("d")), None);
    assert_eq!(cache.get_if_present(&key("e")), None);
    assert_eq!(cache.get_if_present(&key("f")), None);
    cache.shutdown();
}

#[test]
fn fifo_ignores_recency() {
    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(2)
        .eviction_strategy(EvictionStrategy::Fifo)
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("a"), 1);
    cache.put(key("b"), 2);
    cache.get(&key("a")); // does not rescue "a" under FIFO
    cache.put(key("c"), 3);

    assert_eq!(cache.get_if_present(&key("a")), None);
    assert_eq!(cache.get_if_present(&key("b")), Some(2));
    assert_eq!(cache.get_if_present(&key("c")), Some(3));
    cache.shutdown();
}

#[test]
fn lfu_keeps_frequent_keys() {
    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(2)
        .eviction_strategy(EvictionStrategy::Lfu)
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("popular"), 1);
    cache.put(key("rare"), 2);
    for _ in 0..10 {
        cache.get(&key("popular"));
    }
    cache.put(key("new"), 3); // "rare" has the lowest frequency

    assert_eq!(cache.get_if_present(&key("rare")), None);
    assert_eq!(cache.get_if_present(&key("popular")), Some(1));
    cache.shutdown();
}

// ============================================================================
// EXPIRATION
// ============================================================================

#[test]
fn expire_after_write_via_lazy_check() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .expire_after_write(Duration::from_millis(50))
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("k"), key("v"));
    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(cache.get(&key("k")), None);
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.len(), 0);
    cache.shutdown();
}

#[test]
fn expiration_sweep_fires_listeners() {
    #[derive(Default)]
    struct Expirations(AtomicUsize);
    impl EventListener<String, String> for Expirations {
        fn on_expire(&self, _k: &String, _v: &String) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let listener = Arc::new(Expirations::default());
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .expire_after_write(Duration::from_millis(30))
        .listener(listener.clone())
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    for i in 0..4 {
        cache.put(format!("k{i}"), key("v"));
    }
    std::thread::sleep(Duration::from_millis(50));
    cache.run_pending_maintenance();

    assert_eq!(cache.len(), 0);
    assert_eq!(listener.0.load(Ordering::SeqCst), 4);
    cache.shutdown();
}

#[test]
fn background_worker_sweeps_without_help() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .expire_after_write(Duration::from_millis(20))
        .maintenance_interval(Duration::from_millis(25))
        .build()
        .expect("valid config");

    cache.put(key("k"), key("v"));
    std::thread::sleep(Duration::from_millis(120));

    // swept by the background thread, not by a get
    assert_eq!(cache.len(), 0);
    cache.shutdown();
}

// ============================================================================
// LOAD-THROUGH
// ============================================================================

#[test]
fn load_through_populates_and_hits() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .loader(|k: &String| Some(format!("loaded-{k}")))
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    assert_eq!(cache.get(&key("x")), Some(key("loaded-x")));
    assert!(cache.contains_key(&key("x")));

    let stats = cache.stats();
    assert_eq!(stats.load_successes, 1);
    assert_eq!(stats.load_failures, 0);

    assert_eq!(cache.get(&key("x")), Some(key("loaded-x")));
    assert_eq!(cache.stats().hits, 1);
    cache.shutdown();
}

#[test]
fn loader_panic_surfaces_as_none() {
    #[derive(Default)]
    struct LoadErrors(AtomicUsize);
    impl EventListener<String, String> for LoadErrors {
        fn on_load_error(&self, _k: &String, _e: &windcache::LoadError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let listener = Arc::new(LoadErrors::default());
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .loader(|_k: &String| panic!("backend down"))
        .listener(listener.clone())
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    assert_eq!(cache.get(&key("x")), None);
    assert_eq!(cache.stats().load_failures, 1);
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    // the cache stays fully usable after a loader failure
    cache.put(key("y"), key("v"));
    assert_eq!(cache.get(&key("y")), Some(key("v")));
    cache.shutdown();
}

#[test]
fn refresh_after_write_reloads_in_background() {
    let generation = Arc::new(AtomicUsize::new(0));
    let loader_gen = Arc::clone(&generation);
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .refresh_after_write(Duration::from_millis(30))
        .loader(move |k: &String| Some(format!("{}-gen{}", k, loader_gen.load(Ordering::SeqCst))))
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("k"), key("k-gen0"));
    generation.store(1, Ordering::SeqCst);

    std::thread::sleep(Duration::from_millis(50));
    cache.run_pending_maintenance();

    // refreshed value replaced the stale one; the entry never vanished
    assert_eq!(cache.get_if_present(&key("k")), Some(key("k-gen1")));
    cache.shutdown();
}

// ============================================================================
// EVENTS
// ============================================================================

#[test]
fn replacement_emits_remove_then_put() {
    #[derive(Default)]
    struct Log(parking_lot::Mutex<Vec<&'static str>>);
    impl EventListener<String, i32> for Log {
        fn on_put(&self, _k: &String, _v: &i32) {
            self.0.lock().push("put");
        }
        fn on_remove(&self, _k: &String, _v: &i32) {
            self.0.lock().push("remove");
        }
    }

    let log = Arc::new(Log::default());
    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(10)
        .listener(log.clone())
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("k"), 1);
    cache.put(key("k"), 2);
    cache.remove(&key("k"));

    assert_eq!(*log.0.lock(), vec!["put", "remove", "put", "remove"]);
    cache.shutdown();
}

#[test]
fn eviction_reason_matches_the_bound() {
    #[derive(Default)]
    struct Reasons(parking_lot::Mutex<Vec<EvictionReason>>);
    impl EventListener<String, String> for Reasons {
        fn on_evict(&self, _k: &String, _v: &String, reason: EvictionReason) {
            self.0.lock().push(reason);
        }
    }

    let reasons = Arc::new(Reasons::default());
    let cache: Cache<String, String> = Cache::builder()
        .maximum_weight(10)
        .weigher(|_k, v: &String| v.len() as u64)
        .eviction_strategy(EvictionStrategy::Lru)
        .listener(reasons.clone())
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("a"), "xxxxxx".into());
    cache.put(key("b"), "xxxxxx".into()); // 12 > 10: evicts "a"

    assert_eq!(*reasons.0.lock(), vec![EvictionReason::Weight]);
    cache.shutdown();
}

#[test]
fn panicking_listener_never_corrupts_the_cache() {
    struct Panicker;
    impl EventListener<String, i32> for Panicker {
        fn on_put(&self, _k: &String, _v: &i32) {
            panic!("listener bug");
        }
    }

    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(10)
        .listener(Arc::new(Panicker))
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    for i in 0..20 {
        cache.put(format!("k{i}"), i);
    }
    assert!(cache.len() <= 10);
    assert_eq!(cache.get_if_present(&key("k19")), Some(19));
    cache.shutdown();
}

// ============================================================================
// STATISTICS
// ============================================================================

#[test]
fn hit_rate_is_exact() {
    let cache = lru_cache(10);
    cache.put(key("a"), 1);
    for _ in 0..3 {
        cache.get(&key("a"));
    }
    cache.get(&key("missing"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    cache.shutdown();
}

#[test]
fn stats_stay_zero_when_disabled() {
    let cache: Cache<String, i32> = Cache::builder()
        .maximum_size(10)
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    cache.put(key("a"), 1);
    cache.get(&key("a"));
    cache.get(&key("missing"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hit_rate(), 0.0);
    cache.shutdown();
}

// ============================================================================
// COLLECTION VIEWS
// ============================================================================

#[test]
fn views_reflect_live_entries() {
    let cache = lru_cache(10);
    cache.put(key("a"), 1);
    cache.put(key("b"), 2);

    let mut keys = cache.keys();
    keys.sort();
    assert_eq!(keys, vec![key("a"), key("b")]);

    let mut values = cache.values();
    values.sort();
    assert_eq!(values, vec![1, 2]);

    let mut entries = cache.entries();
    entries.sort();
    assert_eq!(entries, vec![(key("a"), 1), (key("b"), 2)]);
    cache.shutdown();
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[test]
fn shutdown_is_idempotent_and_terminal() {
    let cache = lru_cache(10);
    cache.put(key("a"), 1);

    cache.shutdown();
    cache.shutdown(); // second call must be a no-op

    assert_eq!(cache.get(&key("a")), None);
    assert_eq!(cache.len(), 0);
    assert!(!cache.contains_key(&key("a")));
    assert!(cache.keys().is_empty());

    // mutations after shutdown are rejected silently
    cache.put(key("b"), 2);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.remove(&key("b")), None);
}

// ============================================================================
// ASYNC SURFACE
// ============================================================================

#[test]
fn async_operations_complete_with_the_sync_contract() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(100)
        .async_loader(|k: &String| {
            let k = k.clone();
            Box::pin(async move { Some(format!("async-{k}")) })
        })
        .record_stats()
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    futures::executor::block_on(async {
        cache.put_async(key("a"), key("1")).await;
        assert_eq!(cache.get_async(&key("a")).await, Some(key("1")));

        // miss goes through the async loader
        assert_eq!(cache.get_async(&key("b")).await, Some(key("async-b")));
        assert_eq!(cache.get_async(&key("b")).await, Some(key("async-b")));

        assert_eq!(cache.remove_async(&key("a")).await, Some(key("1")));
        cache.clear_async().await;
    });

    assert!(cache.is_empty());
    assert_eq!(cache.stats().load_successes, 1);
    cache.shutdown();
}

// ============================================================================
// PROFILES
// ============================================================================

#[test]
fn profile_presets_configure_the_cache() {
    let cache: Cache<String, String> = Cache::builder()
        .profile(Profile::SessionCache)
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    let config = cache.config();
    assert_eq!(config.strategy, EvictionStrategy::Lru);
    assert_eq!(config.expire_after_access, Some(Duration::from_secs(1_800)));
    cache.shutdown();
}

#[test]
fn registry_presets_apply_through_the_builder() {
    let registry = ProfileRegistry::new();
    let mut settings = Profile::ApiCache.settings();
    settings.max_entries = Some(5);
    registry.register("tiny-api", settings);

    let preset = registry.get("tiny-api").expect("registered");
    let cache: Cache<String, i32> = Cache::builder()
        .preset(preset)
        .maintenance_interval(QUIET)
        .build()
        .expect("valid config");

    for i in 0..20 {
        cache.put(format!("k{i}"), i);
    }
    assert!(cache.len() <= 5);
    cache.shutdown();
}

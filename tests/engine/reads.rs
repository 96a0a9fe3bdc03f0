//! Coalesced, cached reads through the engine.

use std::sync::Arc;
use std::time::Duration;

use forecast_sync::{InMemoryBackend, SyncConfig, SyncEngine, SyncError};
use tokio::time::sleep;

use crate::support::{add, dec, key, line, GatedBackend, RESOURCE};

const TTL: Duration = Duration::from_secs(5);

fn seeded() -> Arc<GatedBackend> {
    let inner = InMemoryBackend::new();
    inner.seed(RESOURCE, [line("P1", "F001", 4, 10), line("P2", "F001", 2, 5)]);
    GatedBackend::new(inner)
}

fn engine_over(backend: &Arc<GatedBackend>) -> SyncEngine {
    let config = SyncConfig::new().with_cache_ttl(TTL);
    SyncEngine::with_config(backend.clone(), "F001", config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn load_populates_the_store() {
    let backend = seeded();
    let engine = engine_over(&backend);

    assert!(engine.load().await.unwrap());
    let store = engine.store().unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.total_revenue(), dec(50));
}

#[tokio::test(start_paused = true)]
async fn concurrent_loads_share_one_fetch() {
    let backend = seeded();
    backend.set_list_delay(Duration::from_millis(100));
    let engine = engine_over(&backend);

    let (first, second) = tokio::join!(engine.load(), engine.load());
    assert!(first.unwrap());
    assert!(second.unwrap());

    assert_eq!(backend.inner().stats().lists, 1);
    let stats = engine.coalescer_stats().unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_cache_entry_is_served_without_a_fetch() {
    let backend = seeded();
    let engine = engine_over(&backend);

    engine.load().await.unwrap();
    sleep(TTL / 2).await;
    engine.load().await.unwrap();
    assert_eq!(backend.inner().stats().lists, 1);
    assert_eq!(engine.coalescer_stats().unwrap().hits, 1);

    sleep(TTL).await;
    engine.load().await.unwrap();
    assert_eq!(backend.inner().stats().lists, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_not_cached_and_keeps_the_store() {
    let backend = seeded();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();
    let before = engine.store().unwrap();

    // Expire the entry, then fail the refetch.
    sleep(TTL * 2).await;
    backend.inner().fail_next_reads(1);
    let err = engine.load().await.unwrap_err();
    assert!(matches!(err, SyncError::FetchFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(*engine.store().unwrap(), *before);

    assert!(engine.load().await.unwrap());
    assert_eq!(backend.inner().stats().lists, 3);
    assert_eq!(engine.coalescer_stats().unwrap().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn load_does_not_clobber_unsaved_edits() {
    let backend = seeded();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();

    engine.propose_edit(vec![add("P1", 6)]).unwrap();
    sleep(TTL * 2).await;
    // The edit has been persisted by now; a fresh edit stays unsaved.
    engine.propose_edit(vec![add("P2", 1)]).unwrap();

    assert!(!engine.load().await.unwrap());
    assert_eq!(engine.get(&key("P1", "F001")).unwrap().unwrap().quantity(), dec(10));
    assert_eq!(engine.get(&key("P2", "F001")).unwrap().unwrap().quantity(), dec(3));
}

#[tokio::test(start_paused = true)]
async fn slow_load_does_not_erase_a_write_confirmed_meanwhile() {
    let backend = seeded();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();

    // Expire the cached read so the next load goes to the backend.
    sleep(TTL * 2).await;
    backend.set_list_delay(Duration::from_secs(2));

    let (loaded, ()) = tokio::join!(engine.load(), async {
        engine
            .propose_edit(vec![add("P3", 10).with_unit_price(dec(5))])
            .unwrap();
        engine.force_flush_now().await.unwrap();
    });

    // The fetched lines predate the edit.
    assert!(!loaded.unwrap());
    let saved = engine.get(&key("P3", "F001")).unwrap().unwrap();
    assert_eq!(saved.derived_revenue(), dec(50));
    assert_eq!(engine.visible_lines().unwrap().len(), 3);

    // A fresh load sees the persisted edit.
    assert!(engine.load().await.unwrap());
    assert_eq!(engine.get(&key("P3", "F001")).unwrap().unwrap().quantity(), dec(10));
}

#[tokio::test(start_paused = true)]
async fn confirmed_write_invalidates_the_cached_read() {
    let backend = seeded();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();

    engine.propose_edit(vec![add("P1", 1)]).unwrap();
    engine.force_flush_now().await.unwrap();

    assert!(engine.load().await.unwrap());
    assert_eq!(backend.inner().stats().lists, 2);
    assert_eq!(engine.get(&key("P1", "F001")).unwrap().unwrap().quantity(), dec(5));
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_still_coalesces() {
    let backend = seeded();
    backend.set_list_delay(Duration::from_millis(100));
    let config = SyncConfig::new().with_cache_ttl(Duration::ZERO);
    let engine = SyncEngine::with_config(backend.clone(), "F001", config).unwrap();

    let (first, second) = tokio::join!(engine.load(), engine.load());
    first.unwrap();
    second.unwrap();
    assert_eq!(backend.inner().stats().lists, 1);

    engine.load().await.unwrap();
    assert_eq!(backend.inner().stats().lists, 2);
}

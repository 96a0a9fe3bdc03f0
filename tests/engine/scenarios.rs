//! Scenario switches as a hard boundary.

use std::sync::Arc;
use std::time::Duration;

use forecast_sync::{
    InMemoryBackend, MutationRequest, ScenarioId, SchedulerPhase, SyncConfig, SyncEngine,
    SyncError,
};
use tokio::time::{sleep, timeout};

use crate::support::{add, dec, key, line, GatedBackend, RESOURCE};

const WINDOW: Duration = Duration::from_millis(400);

fn two_scenarios() -> Arc<GatedBackend> {
    let inner = InMemoryBackend::new();
    inner.seed(RESOURCE, [line("P1", "F001", 1, 1), line("P9", "F002", 7, 2)]);
    GatedBackend::new(inner)
}

fn engine_over(backend: &Arc<GatedBackend>) -> SyncEngine {
    let config = SyncConfig::new().with_quiescence(WINDOW);
    SyncEngine::with_config(backend.clone(), "F001", config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn switch_replaces_the_store() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();

    assert!(engine.switch_scenario("F002").await.unwrap());

    assert_eq!(engine.active_scenario().unwrap(), ScenarioId::new("F002"));
    assert_eq!(engine.visible_lines().unwrap(), vec![line("P9", "F002", 7, 2)]);
}

#[tokio::test(start_paused = true)]
async fn pending_edits_never_cross_a_switch() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();

    engine.propose_edit(vec![add("P1", 5)]).unwrap();
    let (flushed, switched) =
        tokio::join!(engine.force_flush_now(), engine.switch_scenario("F002"));

    assert_eq!(
        flushed,
        Err(SyncError::Discarded {
            scenario: ScenarioId::new("F001")
        })
    );
    assert!(switched.unwrap());
    assert!(engine.get(&key("P1", "F001")).unwrap().is_none());
    assert!(!engine.has_unsaved_edits().unwrap());

    sleep(WINDOW * 3).await;
    assert_eq!(backend.writes_started(), 0);
    assert_eq!(
        backend.inner().lines(RESOURCE, &ScenarioId::new("F001")),
        vec![line("P1", "F001", 1, 1)]
    );
    assert_eq!(engine.phase().unwrap(), SchedulerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn stale_write_outcome_is_ignored() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();
    backend.hold_writes();
    backend.inner().fail_next_writes(1);

    engine.propose_edit(vec![add("P1", 5)]).unwrap();
    sleep(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(backend.writes_started(), 1);

    engine.switch_scenario("F002").await.unwrap();
    let edit = MutationRequest::add(key("P9", "F002"), dec(3));
    engine.propose_edit(vec![edit]).unwrap();

    // The F001 batch fails after the switch. Its rollback must not touch F002.
    backend.release(2);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.get(&key("P9", "F002")).unwrap().unwrap().quantity(), dec(10));

    engine.force_flush_now().await.unwrap();
    assert_eq!(
        backend.inner().lines(RESOURCE, &ScenarioId::new("F002")),
        vec![line("P9", "F002", 10, 2)]
    );
    assert_eq!(backend.max_concurrent_writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn force_flush_after_switch_waits_out_the_stale_write() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();
    backend.hold_writes();

    engine.propose_edit(vec![add("P1", 5)]).unwrap();
    sleep(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(backend.writes_started(), 1);

    engine.switch_scenario("F002").await.unwrap();

    let (flushed, ()) = tokio::join!(
        timeout(Duration::from_secs(30), engine.force_flush_now()),
        async {
            sleep(Duration::from_millis(10)).await;
            backend.release(1);
        }
    );

    let flushed = flushed.expect("force flush should resolve once the F001 write settles");
    flushed.unwrap();
    assert_eq!(engine.phase().unwrap(), SchedulerPhase::Idle);
    assert_eq!(engine.visible_lines().unwrap(), vec![line("P9", "F002", 7, 2)]);
}

#[tokio::test(start_paused = true)]
async fn switch_invalidates_cached_reads() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();
    engine.switch_scenario("F002").await.unwrap();

    // Within the TTL, but the switch dropped every entry.
    engine.switch_scenario("F001").await.unwrap();
    assert_eq!(backend.inner().stats().lists, 3);
    assert_eq!(engine.coalescer_stats().unwrap().hits, 0);
    assert_eq!(engine.visible_lines().unwrap(), vec![line("P1", "F001", 1, 1)]);
}

#[tokio::test(start_paused = true)]
async fn edits_must_target_the_new_scenario() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.switch_scenario("F002").await.unwrap();

    let stale = engine.propose_edit(vec![add("P1", 1)]);
    assert!(matches!(stale, Err(SyncError::InvalidMutation(_))));
}

#[tokio::test(start_paused = true)]
async fn failed_switch_load_leaves_an_empty_store() {
    let backend = two_scenarios();
    let engine = engine_over(&backend);
    engine.load().await.unwrap();
    backend.inner().fail_next_reads(1);

    let err = engine.switch_scenario("F002").await.unwrap_err();
    assert!(matches!(err, SyncError::FetchFailed { .. }));
    assert_eq!(engine.active_scenario().unwrap(), ScenarioId::new("F002"));
    assert!(engine.visible_lines().unwrap().is_empty());

    assert!(engine.load().await.unwrap());
    assert_eq!(engine.visible_lines().unwrap().len(), 1);
}

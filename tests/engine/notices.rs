//! UI notices. Listeners run on emitter threads, so these tests use real time.

use std::sync::Arc;
use std::time::Duration;

use forecast_sync::{InMemoryBackend, ScenarioId, SyncConfig, SyncEngine, SyncNotice};

use crate::support::{add, dec, line, NoticeSink, RESOURCE};

const ALL: &[&str] = &[
    SyncNotice::PERSIST_FAILED,
    SyncNotice::PERSIST_CONFIRMED,
    SyncNotice::SCENARIO_LOADED,
    SyncNotice::LOAD_FAILED,
];

fn engine_over(backend: &InMemoryBackend) -> SyncEngine {
    let config = SyncConfig::new().with_quiescence(Duration::from_millis(20));
    SyncEngine::with_config(Arc::new(backend.clone()), "F001", config).unwrap()
}

#[tokio::test]
async fn failed_persist_is_announced() {
    let backend = InMemoryBackend::new();
    backend.fail_next_writes(1);
    let engine = engine_over(&backend);
    let sink = NoticeSink::attach(&engine, ALL);

    engine
        .propose_edit(vec![add("P1", 10).with_unit_price(dec(5))])
        .unwrap();
    assert!(engine.force_flush_now().await.is_err());

    let notices = sink.wait_for(1).await;
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        SyncNotice::PersistFailed {
            scenario,
            batch,
            rolled_back,
            message,
        } => {
            assert_eq!(scenario, &ScenarioId::new("F001"));
            assert_eq!(*batch, 1);
            assert!(rolled_back);
            assert!(message.contains("injected write failure"));
        }
        other => panic!("unexpected notice {other:?}"),
    }
}

#[tokio::test]
async fn confirmed_persist_is_announced() {
    let backend = InMemoryBackend::new();
    let engine = engine_over(&backend);
    let sink = NoticeSink::attach(&engine, &[SyncNotice::PERSIST_CONFIRMED]);

    engine.propose_edit(vec![add("P1", 1), add("P2", 1)]).unwrap();
    engine.force_flush_now().await.unwrap();

    let notices = sink.wait_for(1).await;
    assert_eq!(
        notices,
        vec![SyncNotice::PersistConfirmed {
            scenario: ScenarioId::new("F001"),
            batch: 1,
            lines: 2,
        }]
    );
}

#[tokio::test]
async fn loads_are_announced() {
    let backend = InMemoryBackend::new();
    backend.seed(RESOURCE, [line("P1", "F002", 1, 1)]);
    let engine = engine_over(&backend);
    let sink = NoticeSink::attach(&engine, ALL);

    backend.fail_next_reads(1);
    assert!(engine.load().await.is_err());
    engine.switch_scenario("F002").await.unwrap();

    let mut notices = sink.wait_for(2).await;
    // Listener threads may deliver out of order.
    notices.sort_by_key(|n| n.event_name());
    assert_eq!(
        notices,
        vec![
            SyncNotice::LoadFailed {
                scenario: ScenarioId::new("F001"),
                message: "fetch failed for forecasts@F001: transport error: injected read failure"
                    .into(),
            },
            SyncNotice::ScenarioLoaded {
                scenario: ScenarioId::new("F002"),
                lines: 1,
            },
        ]
    );
}

#[tokio::test]
async fn removed_listener_gets_nothing() {
    let backend = InMemoryBackend::new();
    let engine = engine_over(&backend);
    let sink = NoticeSink::attach(&engine, &[SyncNotice::SCENARIO_LOADED]);
    let id = engine
        .on_notice(SyncNotice::SCENARIO_LOADED, |_payload: String| {})
        .unwrap();
    assert!(engine.notifier().remove_listener(&id).unwrap());

    engine.load().await.unwrap();
    assert_eq!(sink.wait_for(1).await.len(), 1);
}

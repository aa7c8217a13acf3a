use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::DispatcherConfig;
use crate::config::HandlerConfig;
use crate::config::MemoryConfig;
use crate::entry::EntryPool;
use crate::entry::LogLevel;
use crate::handlers::collector;
use crate::handlers::remove_collector;
use crate::handlers::MemoryCollector;
use crate::handlers::MemoryHandler;
use crate::test_utils::*;

fn build(
    config: DispatcherConfig,
    pool: &EntryPool,
) -> Dispatcher {
    enable_logger();
    DispatcherBuilder::new(config).pool(pool.clone()).build().unwrap()
}

fn send_line(
    dispatcher: &Dispatcher,
    records: &mut RecordBuilder,
    text: &str,
) -> bool {
    let entry = dispatcher.pool().acquire_from(&records.line(LogLevel::Info, text));
    dispatcher.send(entry)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_entries_delivered_in_order() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(memory_dispatcher_config(&["engine_order"]), &pool);
    let mut records = RecordBuilder::new("src");
    for text in ["a", "b", "c"] {
        assert!(send_line(&dispatcher, &mut records, text));
    }
    dispatcher.shutdown(WAIT).await.unwrap();

    let memory = collector("engine_order");
    assert_eq!(memory.texts(), texts(&["a", "b", "c"]));
    assert_eq!(memory.deactivations(), 1);
    memory.clear();
    assert_eq!(pool.alive(), 0);
    remove_collector("engine_order");
}

#[tokio::test]
async fn test_same_key_handler_is_reused_across_snapshots() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(memory_dispatcher_config(&["engine_reuse"]), &pool);

    let mut bounded = MemoryConfig::new("engine_reuse");
    bounded.max_entries = 5;
    let next = DispatcherConfig::default().with_handler(HandlerConfig::Memory(bounded));
    assert!(dispatcher.apply_configuration_and_wait(next, WAIT).await);

    let reused = collector("engine_reuse");
    assert_eq!(reused.activations(), 1);
    assert_eq!(reused.deactivations(), 0);

    let other = memory_dispatcher_config(&["engine_reuse_other"]);
    assert!(dispatcher.apply_configuration_and_wait(other, WAIT).await);
    assert_eq!(reused.deactivations(), 1);
    assert_eq!(collector("engine_reuse_other").activations(), 1);

    dispatcher.shutdown(WAIT).await.unwrap();
    remove_collector("engine_reuse");
    remove_collector("engine_reuse_other");
}

#[tokio::test]
async fn test_faulty_handler_removed_and_later_handlers_still_served() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(DispatcherConfig::default(), &pool);

    let (faulty, probe) = ScriptedHandler::new("faulty");
    assert!(dispatcher.register_handler("faulty", faulty.failing_on("boom").boxed()).await);
    let memory = Arc::new(MemoryCollector::new("engine_fault"));
    assert!(
        dispatcher
            .register_handler("memory", Box::new(MemoryHandler::detached(memory.clone())))
            .await
    );

    let mut records = RecordBuilder::new("src");
    for text in ["ok1", "boom", "ok2"] {
        assert!(send_line(&dispatcher, &mut records, text));
    }
    dispatcher.shutdown(WAIT).await.unwrap();

    assert_eq!(probe.handled(), texts(&["ok1"]));
    assert_eq!(probe.deactivations(), 1);

    let received = memory.entries();
    let received_texts: Vec<&str> = received.iter().map(|e| e.text_or_empty()).collect();
    assert_eq!(
        received_texts,
        vec![
            "ok1",
            "boom",
            "Handler 'faulty' failed and has been removed.",
            "ok2"
        ]
    );
    let report = &received[2];
    assert_eq!(report.level, LogLevel::Error);
    assert_eq!(report.source_id, crate::constants::PIPELINE_SOURCE_ID);
    assert!(report.exception.is_some());
    drop(received);
    memory.clear();
    assert_eq!(pool.alive(), 0);
}

#[tokio::test]
async fn test_rejected_activation_is_not_added() {
    let pool = EntryPool::new(4, 8);
    let dispatcher = build(DispatcherConfig::default(), &pool);

    let (handler, probe) = ScriptedHandler::new("rejecting");
    assert!(!dispatcher.register_handler("rejecting", handler.rejecting_activation().boxed()).await);
    assert_eq!(probe.activations(), 1);

    let mut records = RecordBuilder::new("src");
    send_line(&dispatcher, &mut records, "ignored");
    dispatcher.shutdown(WAIT).await.unwrap();
    assert!(probe.handled().is_empty());
    assert_eq!(probe.deactivations(), 0);
}

#[tokio::test]
async fn test_register_and_unregister_by_key() {
    let pool = EntryPool::new(4, 8);
    let dispatcher = build(DispatcherConfig::default(), &pool);

    let (first, probe) = ScriptedHandler::new("probe");
    let (second, _) = ScriptedHandler::new("probe");
    assert!(dispatcher.register_handler("probe", first.boxed()).await);
    assert!(!dispatcher.register_handler("probe", second.boxed()).await);
    assert!(!dispatcher.unregister_handler("unknown").await);

    // dynamic handlers survive reconfiguration
    assert!(
        dispatcher
            .apply_configuration_and_wait(memory_dispatcher_config(&["engine_dyn"]), WAIT)
            .await
    );
    assert_eq!(probe.deactivations(), 0);

    assert!(dispatcher.unregister_handler("probe").await);
    assert_eq!(probe.deactivations(), 1);

    dispatcher.shutdown(WAIT).await.unwrap();
    assert!(!dispatcher.register_handler("late", ScriptedHandler::new("late").0.boxed()).await);
    remove_collector("engine_dyn");
}

#[tokio::test]
async fn test_send_after_shutdown_is_refused_and_released() {
    let pool = EntryPool::new(4, 8);
    let dispatcher = build(DispatcherConfig::default(), &pool);
    let token = dispatcher.stopping_token();
    assert!(!token.is_cancelled());

    dispatcher.shutdown(WAIT).await.unwrap();
    assert!(token.is_cancelled());
    assert!(dispatcher.is_closed());

    let mut records = RecordBuilder::new("src");
    assert!(!send_line(&dispatcher, &mut records, "late"));
    assert_eq!(dispatcher.rejected(), 1);
    assert_eq!(pool.alive(), 0);

    // second call is a no-op
    dispatcher.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_apply_configuration_versions() {
    let pool = EntryPool::new(4, 8);
    let dispatcher = build(DispatcherConfig::default(), &pool);
    assert!(dispatcher.wait_for_configuration(1, WAIT).await);

    let v2 = dispatcher.apply_configuration(DispatcherConfig::default());
    let v3 = dispatcher.apply_configuration(DispatcherConfig::default());
    assert_eq!((v2, v3), (2, 3));
    assert!(dispatcher.wait_for_configuration(v3, WAIT).await);
    assert_eq!(dispatcher.applied_version(), 3);

    dispatcher.shutdown(WAIT).await.unwrap();
    let late = dispatcher.apply_configuration(DispatcherConfig::default());
    assert!(!dispatcher.wait_for_configuration(late, Duration::from_millis(50)).await);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected_by_builder() {
    let mut config = DispatcherConfig::default();
    config.timer_duration_ms = 1;
    assert!(DispatcherBuilder::new(config).build().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_timer_and_external_callback() {
    let pool = EntryPool::new(4, 8);
    let mut config = DispatcherConfig::default();
    config.timer_duration_ms = 10;
    config.external_timer_duration_ms = 50;
    let external = Arc::new(AtomicU64::new(0));
    let calls = external.clone();
    let dispatcher = DispatcherBuilder::new(config)
        .pool(pool.clone())
        .on_external_timer(move || {
            calls.fetch_add(1, Ordering::AcqRel);
        })
        .build()
        .unwrap();

    let (handler, probe) = ScriptedHandler::new("timer");
    assert!(dispatcher.register_handler("timer", handler.boxed()).await);
    tokio::time::sleep(Duration::from_millis(205)).await;
    dispatcher.shutdown(WAIT).await.unwrap();

    assert!(probe.timer_calls() >= 15, "timer calls: {}", probe.timer_calls());
    let external = external.load(Ordering::Acquire);
    assert!((3..=5).contains(&external), "external calls: {external}");
}

#[tokio::test(start_paused = true)]
async fn test_forced_shutdown_releases_queued_entries() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(DispatcherConfig::default(), &pool);
    let (slow, probe) = ScriptedHandler::new("slow");
    assert!(
        dispatcher
            .register_handler("slow", slow.with_delay(Duration::from_millis(150)).boxed())
            .await
    );

    let mut records = RecordBuilder::new("src");
    for i in 0..5 {
        assert!(send_line(&dispatcher, &mut records, &format!("e{i}")));
    }
    dispatcher.shutdown(Duration::from_millis(100)).await.unwrap();

    assert_eq!(probe.handled(), texts(&["e0"]));
    assert_eq!(probe.deactivations(), 1);
    assert_eq!(pool.alive(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_loop_stuck_in_handler() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(DispatcherConfig::default(), &pool);
    let (stuck, probe) = ScriptedHandler::new("stuck");
    assert!(
        dispatcher
            .register_handler("stuck", stuck.with_delay(Duration::from_secs(3600)).boxed())
            .await
    );

    let mut records = RecordBuilder::new("src");
    for i in 0..3 {
        assert!(send_line(&dispatcher, &mut records, &format!("e{i}")));
    }
    let started = tokio::time::Instant::now();
    dispatcher.shutdown(Duration::from_millis(100)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(probe.handled().is_empty());
    assert_eq!(pool.alive(), 0);
}

#[tokio::test]
async fn test_invalid_entry_is_refused_and_handlers_keep_working() {
    let pool = EntryPool::new(16, 64);
    let dispatcher = build(memory_dispatcher_config(&["engine_invalid"]), &pool);

    let mut bare = pool.acquire();
    bare.level = LogLevel::Warn;
    assert!(!dispatcher.send(bare.freeze()));
    assert_eq!(dispatcher.invalid(), 1);
    assert_eq!(pool.alive(), 0);

    let mut records = RecordBuilder::new("src");
    for text in ["a", "b", "c"] {
        assert!(send_line(&dispatcher, &mut records, text));
    }
    dispatcher.shutdown(WAIT).await.unwrap();

    let memory = collector("engine_invalid");
    assert_eq!(memory.texts(), texts(&["a", "b", "c"]));
    memory.clear();
    remove_collector("engine_invalid");
}

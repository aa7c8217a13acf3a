//! Dispatcher -> file handlers -> StreamReader, through the public API only.

use ckmon::config::DispatcherConfig;
use ckmon::config::FileConfig;
use ckmon::config::HandlerConfig;
use ckmon::config::MemoryConfig;
use ckmon::entry::Conclusion;
use ckmon::entry::EntryKind;
use ckmon::handlers::collector;
use ckmon::handlers::remove_collector;
use ckmon::DispatcherBuilder;
use ckmon::EntryPool;
use ckmon::LogLevel;
use tempfile::tempdir;

use crate::commons::*;
use crate::enable_logger;

#[tokio::test]
async fn test_monitor_entries_are_written_and_read_back() {
    enable_logger();
    let root = tempdir().unwrap();
    let pool = EntryPool::new(32, 128);

    let mut binary = FileConfig::new("bin");
    binary.max_count_per_file = 4;
    let config = DispatcherConfig::default()
        .with_handler(HandlerConfig::BinaryFile(binary))
        .with_handler(HandlerConfig::TextFile(FileConfig::new("txt")));
    let dispatcher = DispatcherBuilder::new(config)
        .log_root(root.path())
        .pool(pool.clone())
        .build()
        .unwrap();

    let mut monitor = dispatcher.create_monitor("svc");
    assert!(monitor.open_group(LogLevel::Info, "Import"));
    for i in 0..6 {
        assert!(monitor.log(LogLevel::Info, &format!("row {i}")));
    }
    assert!(monitor.close_group(vec![Conclusion::new("Rows", "6")]));
    dispatcher.shutdown(WAIT).await.unwrap();
    assert_eq!(pool.alive(), 0);

    let bin_dir = root.path().join("bin");
    assert!(files_with_suffix(&bin_dir, ".tmp").is_empty());
    let files = files_with_suffix(&bin_dir, ".ckmon");
    assert_eq!(files.len(), 2);

    let records = read_source(&files, "svc");
    assert_eq!(records.len(), 8);
    assert_eq!(records[0].kind, EntryKind::OpenGroup);
    assert_eq!(records[0].text_or_empty(), "Import");
    assert_eq!(records[7].kind, EntryKind::CloseGroup);
    assert_eq!(records[7].conclusions, vec![Conclusion::new("Rows", "6")]);
    let depths: Vec<u32> = records.iter().map(|r| r.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 1, 1, 1, 1, 0]);
    for record in &records {
        let multicast = record.multicast.as_ref().unwrap();
        assert_eq!(multicast.pipeline_id, dispatcher.pipeline_id());
    }
    assert!(records[1].multicast.as_ref().unwrap().previous.is_some());

    let text_files = files_with_suffix(&root.path().join("txt"), ".log");
    assert_eq!(text_files.len(), 1);
    let text = std::fs::read_to_string(&text_files[0]).unwrap();
    assert_eq!(text.lines().count(), 8);
    assert!(text.lines().next().unwrap().ends_with("[svc] > Import"));
    assert!(text.contains("[svc] | row 5"));
}

#[tokio::test]
async fn test_source_filter_keeps_one_source_of_a_compressed_stream() {
    enable_logger();
    let root = tempdir().unwrap();
    let pool = EntryPool::new(16, 64);

    let mut binary = FileConfig::new("gz");
    binary.use_gzip_compression = true;
    let config = DispatcherConfig::default().with_handler(HandlerConfig::BinaryFile(binary));
    let dispatcher = DispatcherBuilder::new(config)
        .log_root(root.path())
        .pool(pool.clone())
        .build()
        .unwrap();

    let mut alpha = dispatcher.create_monitor("alpha");
    let mut beta = dispatcher.create_monitor("beta");
    for i in 0..3 {
        alpha.log(LogLevel::Warn, &format!("alpha {i}"));
        beta.log(LogLevel::Warn, &format!("beta {i}"));
    }
    dispatcher.shutdown(WAIT).await.unwrap();

    let files = files_with_suffix(&root.path().join("gz"), ".ckmon.gz");
    assert_eq!(files.len(), 1);
    let texts: Vec<String> = read_source(&files, "beta")
        .iter()
        .map(|r| r.text_or_empty().to_string())
        .collect();
    assert_eq!(texts, vec!["beta 0", "beta 1", "beta 2"]);
    assert_eq!(pool.alive(), 0);
}

#[tokio::test]
async fn test_reconfiguration_closes_removed_file_handler() {
    enable_logger();
    let root = tempdir().unwrap();
    let pool = EntryPool::new(16, 64);

    let config = DispatcherConfig::default().with_handler(HandlerConfig::BinaryFile(FileConfig::new("switch")));
    let dispatcher = DispatcherBuilder::new(config)
        .log_root(root.path())
        .pool(pool.clone())
        .build()
        .unwrap();

    let mut monitor = dispatcher.create_monitor("svc");
    monitor.log(LogLevel::Info, "to file");
    let memory_only =
        DispatcherConfig::default().with_handler(HandlerConfig::Memory(MemoryConfig::new("it_switch")));
    assert!(dispatcher.apply_configuration_and_wait(memory_only, WAIT).await);

    let directory = root.path().join("switch");
    assert!(files_with_suffix(&directory, ".tmp").is_empty());
    let files = files_with_suffix(&directory, ".ckmon");
    assert_eq!(read_source(&files, "svc").len(), 1);

    monitor.log(LogLevel::Info, "to memory");
    dispatcher.shutdown(WAIT).await.unwrap();

    let memory = collector("it_switch");
    assert_eq!(memory.texts(), vec!["to memory".to_string()]);
    assert_eq!(memory.deactivations(), 1);
    memory.clear();
    remove_collector("it_switch");
    assert_eq!(pool.alive(), 0);
}

use std::io::Cursor;
use std::sync::Arc;

use ckmon::config::DispatcherConfig;
use ckmon::config::HandlerConfig;
use ckmon::config::TcpSenderConfig;
use ckmon::DispatcherBuilder;
use ckmon::EntryPool;
use ckmon::LogLevel;
use ckmon::StreamReader;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use crate::commons::WAIT;
use crate::enable_logger;

#[tokio::test]
async fn test_tcp_sender_streams_entries_to_collector() {
    enable_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let collector = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        received
    });

    let pool = EntryPool::new(16, 64);
    let config = DispatcherConfig::default().with_handler(HandlerConfig::TcpSender(TcpSenderConfig::new(address)));
    let dispatcher = DispatcherBuilder::new(config)
        .pool(pool.clone())
        .readiness(Arc::new(|| true))
        .build()
        .unwrap();

    let mut monitor = dispatcher.create_monitor("remote");
    for i in 0..5 {
        assert!(monitor.log_tagged(LogLevel::Info, "Net", &format!("packet {i}")));
    }
    dispatcher.shutdown(WAIT).await.unwrap();
    assert_eq!(pool.alive(), 0);

    let received = tokio::time::timeout(WAIT, collector).await.unwrap().unwrap();
    let mut reader = StreamReader::from_reader(Cursor::new(received)).unwrap();
    let mut texts = Vec::new();
    while reader.advance() {
        let record = reader.current().unwrap();
        assert_eq!(record.source_id, "remote");
        assert!(record.tags.contains("Net"));
        texts.push(record.text_or_empty().to_string());
    }
    assert!(!reader.bad_end_of_file());
    assert!(reader.read_error().is_none());
    assert_eq!(texts, vec!["packet 0", "packet 1", "packet 2", "packet 3", "packet 4"]);
}

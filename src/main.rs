use std::io::Write;

use ckmon::config::Settings;
use ckmon::entry::LogLevel;
use ckmon::handlers::TextFormatter;
use ckmon::identity;
use ckmon::identity::AppIdentity;
use ckmon::metrics;
use ckmon::reader::SourceFilter;
use ckmon::DispatcherBuilder;
use ckmon::Error;
use ckmon::Result;
use ckmon::StreamReader;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const USAGE: &str = "usage:
  ckmon dump <file> [--source <id>]   print a .ckmon stream as text
  ckmon run                           send stdin lines through the configured handlers
                                      (`> text` opens a group, `<` closes it)";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("dump") => dump(&args[1..]),
        Some("run") => run().await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };
    if let Err(e) = &result {
        error!("ckmon failed: {}", e);
    }
    result
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}

fn dump(args: &[String]) -> Result<()> {
    let path = args.first().ok_or_else(|| Error::InvalidConfig(USAGE.to_string()))?;
    let source = match args.get(1).map(String::as_str) {
        Some("--source") => Some(
            args.get(2)
                .ok_or_else(|| Error::InvalidConfig("--source needs a source id".to_string()))?,
        ),
        Some(other) => return Err(Error::InvalidConfig(format!("unexpected argument '{other}'"))),
        None => None,
    };

    let mut reader = StreamReader::open(path)?;
    if let Some(source) = source {
        reader = reader.with_filter(SourceFilter::new(source.as_str()));
    }
    let formatter = TextFormatter::default();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0u64;
    while reader.advance() {
        if let Some(record) = reader.current() {
            out.write_all(formatter.format(record).as_bytes())?;
            count += 1;
        }
    }
    out.flush()?;

    if let Some(e) = reader.read_error() {
        error!(count, "stream is corrupted: {}", e);
    } else if reader.bad_end_of_file() {
        warn!(count, "stream ended without its end marker");
    }
    info!(count, version = reader.stream_version(), "dump done");
    Ok(())
}

async fn run() -> Result<()> {
    let settings = Settings::new()?.validate()?;
    identity::initialize(AppIdentity {
        domain_name: "ckmon".to_string(),
        environment_name: "cli".to_string(),
        party_name: "stdin".to_string(),
    });

    metrics::register_default();
    let dispatcher = DispatcherBuilder::from_settings(&settings).build()?;
    let mut monitor = dispatcher.create_monitor("stdin");
    info!(pipeline = %dispatcher.pipeline_id(), "reading stdin, Ctrl+C or EOF to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(text) = line.strip_prefix('>') {
                        monitor.open_group(LogLevel::Info, text.trim());
                    } else if line.trim() == "<" {
                        monitor.close_group(Vec::new());
                    } else {
                        monitor.log(LogLevel::Info, &line);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
                break;
            }
        }
    }

    dispatcher.shutdown(settings.shutdown.grace_period()).await?;
    debug!("final metrics:\n{}", metrics::gather_text());
    info!("Shutdown completed");
    Ok(())
}

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::SenderSink;
use super::SinkFactory;
use crate::codec::encode_record;
use crate::codec::flags::END_OF_STREAM;
use crate::codec::write_header;
use crate::config::BackoffPolicy;
use crate::constants::CURRENT_STREAM_VERSION;
use crate::entry::LogRecord;
use crate::utils::backoff::ReconnectBackoff;
use crate::SenderError;

/// Builds [`TcpSink`]s for one collector address.
#[derive(Debug, Clone)]
pub struct TcpSinkFactory {
    address: String,
    policy: BackoffPolicy,
}

impl TcpSinkFactory {
    pub fn new(
        address: impl Into<String>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            address: address.into(),
            policy,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl SinkFactory for TcpSinkFactory {
    type Sink = TcpSink;

    fn name(&self) -> String {
        format!("tcp://{}", self.address)
    }

    async fn create_sink(&self) -> Result<TcpSink, SenderError> {
        // host names are resolved at connection time; only the shape is checked
        let valid = self.address.parse::<SocketAddr>().is_ok()
            || self
                .address
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(SenderError::Persistent(format!(
                "'{}' is not a host:port address",
                self.address
            )));
        }
        Ok(TcpSink::new(self.address.clone(), self.policy))
    }
}

/// Streams records to a collector as one `.ckmon` stream per connection.
pub struct TcpSink {
    address: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
    backoff: ReconnectBackoff,
    buf: Vec<u8>,
}

impl TcpSink {
    pub fn new(
        address: String,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            address,
            connect_timeout: Duration::from_millis(policy.connect_timeout_ms),
            write_timeout: Duration::from_millis(policy.write_timeout_ms),
            stream: None,
            backoff: ReconnectBackoff::new(policy),
            buf: Vec::with_capacity(256),
        }
    }

    async fn connect(&mut self) -> Result<TcpStream, SenderError> {
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                return Err(SenderError::Connect {
                    address: self.address.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(SenderError::ConnectTimeout {
                    address: self.address.clone(),
                    duration: self.connect_timeout,
                })
            }
        };
        let _ = stream.set_nodelay(true);

        self.buf.clear();
        write_header(&mut self.buf, CURRENT_STREAM_VERSION).map_err(|e| SenderError::Persistent(e.to_string()))?;
        match timeout(self.write_timeout, stream.write_all(&self.buf)).await {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(e)) => Err(SenderError::Connect {
                address: self.address.clone(),
                source: e,
            }),
            Err(_) => Err(SenderError::ConnectTimeout {
                address: self.address.clone(),
                duration: self.write_timeout,
            }),
        }
    }
}

#[async_trait]
impl SenderSink for TcpSink {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn try_send(
        &mut self,
        record: &LogRecord,
    ) -> bool {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return false,
        };

        self.buf.clear();
        if let Err(e) = encode_record(&mut self.buf, record) {
            // never encodable: retrying would block the buffer forever
            warn!(address = %self.address, "dropping unencodable record: {}", e);
            return true;
        }
        match timeout(self.write_timeout, stream.write_all(&self.buf)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(address = %self.address, "connection lost: {}", e);
                self.stream = None;
                self.backoff.record_failure(Instant::now());
                false
            }
            Err(_) => {
                // the stream may hold a partial record: it cannot be reused
                warn!(
                    address = %self.address,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "collector stopped reading, dropping the connection"
                );
                self.stream = None;
                self.backoff.record_failure(Instant::now());
                false
            }
        }
    }

    async fn reconnect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        let now = Instant::now();
        if !self.backoff.is_due(now) {
            return false;
        }
        match self.connect().await {
            Ok(stream) => {
                debug!(address = %self.address, "connected");
                self.backoff.record_success();
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                let delay = self.backoff.record_failure(Instant::now());
                debug!(
                    address = %self.address,
                    retry_in_ms = delay.as_millis() as u64,
                    "connection attempt failed: {}",
                    e
                );
                false
            }
        }
    }

    async fn dispose(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = timeout(self.write_timeout, async {
                stream.write_all(&[END_OF_STREAM]).await?;
                stream.shutdown().await
            })
            .await;
        }
    }
}

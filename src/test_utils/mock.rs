use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::HandlerConfig;
use crate::entry::PooledEntry;
use crate::handlers::LogHandler;
use crate::HandlerError;
use crate::Result;

/// What a [`ScriptedHandler`] observed.
#[derive(Debug, Default)]
pub struct HandlerProbe {
    handled: Mutex<Vec<String>>,
    activations: AtomicU64,
    deactivations: AtomicU64,
    timer_calls: AtomicU64,
}

impl HandlerProbe {
    pub fn handled(&self) -> Vec<String> {
        self.handled.lock().clone()
    }

    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Acquire)
    }

    pub fn deactivations(&self) -> u64 {
        self.deactivations.load(Ordering::Acquire)
    }

    pub fn timer_calls(&self) -> u64 {
        self.timer_calls.load(Ordering::Acquire)
    }
}

/// Dynamic handler with scripted failures and delays.
pub struct ScriptedHandler {
    name: String,
    probe: Arc<HandlerProbe>,
    accept_activation: bool,
    fail_on: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    pub fn new(name: &str) -> (Self, Arc<HandlerProbe>) {
        let probe = Arc::new(HandlerProbe::default());
        let handler = Self {
            name: name.to_string(),
            probe: probe.clone(),
            accept_activation: true,
            fail_on: None,
            delay: None,
        };
        (handler, probe)
    }

    /// Fails when handling an entry with this exact text.
    pub fn failing_on(
        mut self,
        text: &str,
    ) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn rejecting_activation(mut self) -> Self {
        self.accept_activation = false;
        self
    }

    pub fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn LogHandler> {
        Box::new(self)
    }
}

#[async_trait]
impl LogHandler for ScriptedHandler {
    async fn activate(&mut self) -> bool {
        self.probe.activations.fetch_add(1, Ordering::AcqRel);
        self.accept_activation
    }

    async fn apply_configuration(
        &mut self,
        _config: &HandlerConfig,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn handle(
        &mut self,
        entry: &PooledEntry,
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.as_deref() == Some(entry.text_or_empty()) {
            return Err(HandlerError::Failed {
                name: self.name.clone(),
                reason: format!("scripted failure on '{}'", entry.text_or_empty()),
            }
            .into());
        }
        self.probe.handled.lock().push(entry.text_or_empty().to_string());
        Ok(())
    }

    async fn on_timer(
        &mut self,
        _elapsed: Duration,
    ) -> Result<()> {
        self.probe.timer_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn deactivate(&mut self) {
        self.probe.deactivations.fetch_add(1, Ordering::AcqRel);
    }
}

//! In-process publication of session status events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use tapbot_types::{
    events::{EventPayload, StatusLevel, SystemEvent},
    Result, TapbotError,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: SystemEvent) -> Result<()>;
}

/// Broadcast bus; publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

#[async_trait]
impl EventSink for LocalBus {
    async fn publish(&self, event: SystemEvent) -> Result<()> {
        if self.tx.send(event).is_err() {
            debug!("status event dropped: no subscribers");
        }
        Ok(())
    }
}

/// Writes one event to the log, status messages at their own level.
pub fn log_event(event: &SystemEvent) {
    match &event.payload {
        EventPayload::Status(status) => match status.level {
            StatusLevel::Info => info!("{}", status.message),
            StatusLevel::Warning => warn!("{}", status.message),
            StatusLevel::Error => error!("{}", status.message),
        },
        EventPayload::Round(round) => info!(
            "game {} {} after {} ticks ({} ms)",
            round.telemetry.game,
            round.telemetry.outcome,
            round.telemetry.ticks,
            round.telemetry.elapsed_ms
        ),
        EventPayload::Lifecycle(lifecycle) => info!(
            "{:?} {}",
            lifecycle.phase,
            lifecycle.details.as_deref().unwrap_or_default()
        ),
    }
}

/// Logs events until every publisher is gone; returns how many were seen.
pub async fn log_events(mut events: BoxStream<'static, SystemEvent>) -> usize {
    let mut seen = 0;
    while let Some(event) = events.next().await {
        log_event(&event);
        seen += 1;
    }
    seen
}

/// Keeps every event in memory.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SystemEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SystemEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: SystemEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| TapbotError::Ops("failed to lock recorded events".into()))?
            .push(event);
        Ok(())
    }
}

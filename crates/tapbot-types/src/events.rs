use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{geometry::ScaleFactor, outcome::RoundOutcome, telemetry::RoundTelemetry};

/// High-level message kinds moving through the status bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Round,
    Status,
}

/// Immutable event envelope for logging, status display and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Round(RoundEvent),
    Status(StatusEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    SessionStart,
    GameStart,
    GameEnd,
    SessionEnd,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEvent {
    pub telemetry: RoundTelemetry,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(phase: LifecyclePhase, details: Option<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent { phase, details }),
        )
    }

    pub fn round(telemetry: RoundTelemetry) -> Self {
        Self::new(EventKind::Round, EventPayload::Round(RoundEvent { telemetry }))
    }

    pub fn status(level: StatusLevel, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Status,
            EventPayload::Status(StatusEvent {
                level,
                message: message.into(),
            }),
        )
    }

    pub fn scale_selected(scale: ScaleFactor) -> Self {
        Self::status(StatusLevel::Info, format!("Using scale factor {scale}"))
    }

    /// Outcome of the round carried by this event, if any.
    pub fn outcome(&self) -> Option<RoundOutcome> {
        match &self.payload {
            EventPayload::Round(round) => Some(round.telemetry.outcome),
            _ => None,
        }
    }
}

//! Shared domain types for the tapbot project.

pub mod config;
pub mod events;
pub mod geometry;
pub mod outcome;
pub mod setup;
pub mod telemetry;
pub mod timing;
pub mod vision;

mod errors;

pub use errors::{Result, TapbotError};

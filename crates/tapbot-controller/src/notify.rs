use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::DeviceController;

/// Fire-and-forget user notification. Delivery is never awaited by callers
/// in a way that can fail the session.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!("notice: {}", message);
    }
}

/// Posts notifications on the device itself.
pub struct DeviceNotifier<C> {
    controller: Arc<C>,
}

impl<C: DeviceController> DeviceNotifier<C> {
    pub fn new(controller: Arc<C>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl<C: DeviceController> Notifier for DeviceNotifier<C> {
    async fn notify(&self, message: &str) {
        info!("notice: {}", message);
        if let Err(err) = self.controller.post_notification(message).await {
            warn!("failed to post device notification: {}", err);
        }
    }
}

//! Alert Port
//!
//! Outbound notifications for trade-affecting events. Delivery is best
//! effort: callers go through `notify`, which logs and swallows failures.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("Alert channel not configured: {0}")]
    NotConfigured(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertPort: Send + Sync {
    async fn send_alert(&self, text: &str) -> Result<(), AlertError>;
}

/// Send an alert and log delivery failures instead of returning them
pub async fn notify(alerts: &dyn AlertPort, text: &str) {
    tracing::info!("ALERT: {}", text);
    if let Err(e) = alerts.send_alert(text).await {
        tracing::warn!("Failed to deliver alert: {}", e);
    }
}

//! Call event notifiers
//!
//! Delivery is fire-and-forget: `dispatch` spawns the send and only logs
//! failures, so a slow or broken push pipeline never affects billing.

use coincall_core::{
    config::NotificationConfig, models::CallEvent, traits::Notifier, AppError, AppResult,
};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Send `event` in the background
pub fn dispatch(notifier: Arc<dyn Notifier>, event: CallEvent) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            warn!(
                call_id = %event.call_id,
                kind = ?event.kind,
                error = %e,
                "Call notification failed"
            );
        }
    });
}

/// Build the notifier selected by configuration
pub fn from_config(config: &NotificationConfig) -> AppResult<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url, config.timeout_ms)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Writes events to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &CallEvent) -> AppResult<()> {
        info!(
            call_id = %event.call_id,
            kind = ?event.kind,
            recipients = ?event.recipients,
            "Call event"
        );
        Ok(())
    }
}

/// POSTs events as JSON to the push gateway
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout_ms: u64) -> AppResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build webhook client: {}", e)))?;

        info!("Call events will be posted to {}", url);

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &CallEvent) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notification(format!(
                "Webhook returned HTTP {}",
                status.as_u16()
            )));
        }

        debug!(call_id = %event.call_id, kind = ?event.kind, "Call event delivered");
        Ok(())
    }
}

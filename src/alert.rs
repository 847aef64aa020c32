/// Alert dispatch module
///
/// Routes threat-status transitions to a notifier (throttled) and an
/// append-only log sink (unconditional). Delivery failures are logged and
/// swallowed so alerting can never take down the capture pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier rejected alert: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound alert delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Append-only record store for security events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, timestamp: DateTime<Utc>, detail: &str) -> Result<(), LogError>;
}

/// Notifier that POSTs alert text as JSON to a configured webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().to_string()));
        }

        debug!("Webhook alert delivered");
        Ok(())
    }
}

/// Notifier used when no delivery endpoint is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        debug!("No notifier configured, dropping alert: {}", text);
        Ok(())
    }
}

/// Append-only CSV log of (timestamp, detail) rows
pub struct CsvLogSink {
    path: PathBuf,
}

impl CsvLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogSink for CsvLogSink {
    async fn append(&self, timestamp: DateTime<Utc>, detail: &str) -> Result<(), LogError> {
        let row = format!("{},{}\n", timestamp.to_rfc3339(), csv_quote(detail));

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(row.as_bytes()).await?;

        Ok(())
    }
}

/// Quote a free-text CSV field, doubling embedded quotes
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Routes CRITICAL transitions to the notifier and log sink
///
/// Notifications are spaced by at least the throttle window; the last-sent
/// instant only advances on a successful send. Log appends are never
/// throttled.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    log: Arc<dyn LogSink>,
    throttle: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, log: Arc<dyn LogSink>, throttle: Duration) -> Self {
        Self {
            notifier,
            log,
            throttle,
            last_sent: Mutex::new(None),
        }
    }

    /// Handle one CRITICAL transition: maybe notify, always log
    pub async fn dispatch(&self, detail: &str, timestamp: DateTime<Utc>) {
        if self.notification_due() {
            let text = format!("SECURITY ALERT: {} (at {})", detail, timestamp.to_rfc3339());
            match self.notifier.send(&text).await {
                Ok(()) => {
                    *self.last_sent.lock() = Some(Instant::now());
                    info!("Alert notification sent: {}", detail);
                }
                Err(e) => warn!("Alert notification failed: {}", e),
            }
        } else {
            debug!("Notification throttled: {}", detail);
        }

        if let Err(e) = self.log.append(timestamp, detail).await {
            warn!("Security log append failed: {}", e);
        }
    }

    fn notification_due(&self) -> bool {
        match *self.last_sent.lock() {
            None => true,
            Some(sent_at) => sent_at.elapsed() > self.throttle,
        }
    }
}

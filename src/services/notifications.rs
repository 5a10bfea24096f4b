//! Scan notifications
//!
//! Notifications are fire-and-forget: they are logged and broadcast to
//! whoever subscribed (a chat bot, a web UI). Nobody listening is not an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// A release was handed to the download client
    Download,
    /// A subscription finished
    SubscriptionFinished,
    /// Once-per-scan summary
    ScanSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, category: NotificationCategory, title: &str, body: &str);
}

/// Notification service configuration
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Broadcast channel capacity
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

pub struct BroadcastNotifier {
    event_tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.channel_capacity);
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.event_tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, category: NotificationCategory, title: &str, body: &str) {
        let notification = Notification {
            id: Uuid::new_v4(),
            category,
            title: title.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        info!(category = ?category, title = %title, body = %body, "Notification");
        if self.event_tx.send(notification).is_err() {
            debug!("No notification subscribers");
        }
    }
}

pub fn create_notifier() -> Arc<BroadcastNotifier> {
    Arc::new(BroadcastNotifier::new(NotifierConfig::default()))
}

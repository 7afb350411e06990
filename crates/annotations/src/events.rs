//! Event channels between the annotations service and its host.
//!
//! Dashboards signal lifecycle changes in through [`DashboardEvent`]; the
//! service reports user-facing problems out through [`AppEvent`] on a
//! [`Notifier`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle signal emitted by a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DashboardEvent {
    Refresh,
}

/// Notification raised for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AppEvent {
    AlertError { title: String, message: String },
}

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out sender for [`AppEvent`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<AppEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to whoever is listening; dropped silently if nobody is.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

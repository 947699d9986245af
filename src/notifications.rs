//! Transient dashboard notifications and the push channel that feeds them.

pub mod socket;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct History {
    items: VecDeque<Notification>,
    unread: bool,
}

/// Bounded notification log; oldest entries fall off first
#[derive(Debug)]
pub struct NotificationCenter {
    capacity: usize,
    history: Mutex<History>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(History::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self, title: &str, message: &str, level: NotificationLevel) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => info!("🔔 {}: {}", title, message),
            NotificationLevel::Warning => warn!("🔔 {}: {}", title, message),
            NotificationLevel::Error => error!("🔔 {}: {}", title, message),
        }

        let mut history = self.lock();
        if history.items.len() >= self.capacity {
            history.items.pop_front();
        }
        history.items.push_back(Notification {
            title: title.to_string(),
            message: message.to_string(),
            level,
            timestamp: Utc::now(),
        });
        history.unread = true;
    }

    /// Newest first
    pub fn list(&self) -> Vec<Notification> {
        self.lock().items.iter().rev().cloned().collect()
    }

    #[allow(dead_code)]
    pub fn clear_all(&self) {
        let mut history = self.lock();
        history.items.clear();
        history.unread = false;
    }

    #[allow(dead_code)]
    pub fn mark_read(&self) {
        self.lock().unread = false;
    }

    pub fn has_unread(&self) -> bool {
        self.lock().unread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_records_newest_first() {
        let center = NotificationCenter::new(10);
        center.notify("Camera reconnect", "Camera 1 reconnecting (1/3)", NotificationLevel::Warning);
        center.notify("Camera offline", "Camera 1 is offline", NotificationLevel::Error);

        let items = center.list();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Camera offline");
        assert_eq!(items[1].level, NotificationLevel::Warning);
        assert!(center.has_unread());
    }

    #[test]
    fn test_history_is_bounded() {
        let center = NotificationCenter::new(2);
        for i in 0..5 {
            center.notify("n", &i.to_string(), NotificationLevel::Info);
        }
        let messages: Vec<_> = center.list().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["4", "3"]);
    }

    #[test]
    fn test_mark_read_and_clear() {
        let center = NotificationCenter::new(5);
        center.notify("a", "b", NotificationLevel::Success);
        center.mark_read();
        assert!(!center.has_unread());
        assert_eq!(center.list().len(), 1);

        center.notify("c", "d", NotificationLevel::Info);
        center.clear_all();
        assert!(center.list().is_empty());
        assert!(!center.has_unread());
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&NotificationLevel::Warning).unwrap(), "\"warning\"");
    }
}

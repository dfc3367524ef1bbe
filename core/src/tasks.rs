//! External collaborators consumed by the session façade.
//!
//! The timer does not own task items or UI. It reads the set of item ids (to
//! notice that the item behind the active session was deleted), writes
//! status and duration patches, and asks a toast sink to show messages.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{ItemPatch, ItemStatus};

/// Errors reported by a task store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskStoreError {
    #[error("item {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

/// The task-item store the timer reads from and writes to.
pub trait TaskStore: Send + Sync {
    /// Applies `patch` to the item `id` in `collection`.
    ///
    /// # Errors
    ///
    /// Returns a `TaskStoreError` if the item does not exist or the store
    /// cannot be written.
    fn edit_item(&self, collection: &str, id: &str, patch: &ItemPatch)
        -> Result<(), TaskStoreError>;

    /// Ids of all items that currently exist.
    ///
    /// # Errors
    ///
    /// Returns a `TaskStoreError` if the store cannot be read. An unreadable
    /// store must not look like an empty one.
    fn item_ids(&self) -> Result<HashSet<String>, TaskStoreError>;
}

/// A task item held by [`MemoryTaskStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub status: ItemStatus,
    pub actual_duration_minutes: Option<u64>,
}

impl TaskItem {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: ItemStatus::Todo,
            actual_duration_minutes: None,
        }
    }
}

/// In-memory task store with a single collection.
#[derive(Debug)]
pub struct MemoryTaskStore {
    collection: String,
    items: Mutex<HashMap<String, TaskItem>>,
}

impl MemoryTaskStore {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, item: TaskItem) {
        if let Ok(mut items) = self.items.lock() {
            items.insert(item.id.clone(), item);
        }
    }

    pub fn remove(&self, id: &str) -> Option<TaskItem> {
        self.items.lock().ok()?.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<TaskItem> {
        self.items.lock().ok()?.get(id).cloned()
    }
}

impl TaskStore for MemoryTaskStore {
    fn edit_item(
        &self,
        collection: &str,
        id: &str,
        patch: &ItemPatch,
    ) -> Result<(), TaskStoreError> {
        let not_found = || TaskStoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        if collection != self.collection {
            return Err(not_found());
        }
        let mut items = self
            .items
            .lock()
            .map_err(|_| TaskStoreError::Unavailable("lock poisoned".to_string()))?;
        let item = items.get_mut(id).ok_or_else(not_found)?;
        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(minutes) = patch.actual_duration_minutes {
            item.actual_duration_minutes = Some(minutes);
        }
        debug!(collection, id, ?patch, "Task item edited");
        Ok(())
    }

    fn item_ids(&self) -> Result<HashSet<String>, TaskStoreError> {
        self.items
            .lock()
            .map(|items| items.keys().cloned().collect())
            .map_err(|_| TaskStoreError::Unavailable("lock poisoned".to_string()))
    }
}

/// Visual variant of a toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    #[default]
    Default,
    Destructive,
}

/// An in-app message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Default,
        }
    }
}

/// Receives toast requests from the core.
pub trait ToastSink: Send + Sync {
    fn show(&self, toast: Toast);
}

/// Toast sink that writes toasts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogToastSink;

impl ToastSink for LogToastSink {
    fn show(&self, toast: Toast) {
        match toast.variant {
            ToastVariant::Default => {
                info!(title = %toast.title, description = %toast.description, "Toast");
            }
            ToastVariant::Destructive => {
                warn!(title = %toast.title, description = %toast.description, "Toast");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_item_applies_patch() {
        let store = MemoryTaskStore::new("tasks");
        store.insert(TaskItem::new("t1", "Write report"));

        store
            .edit_item("tasks", "t1", &ItemPatch::status(ItemStatus::Ongoing))
            .unwrap();
        assert_eq!(store.get("t1").unwrap().status, ItemStatus::Ongoing);

        store
            .edit_item(
                "tasks",
                "t1",
                &ItemPatch {
                    status: None,
                    actual_duration_minutes: Some(12),
                },
            )
            .unwrap();
        let item = store.get("t1").unwrap();
        assert_eq!(item.status, ItemStatus::Ongoing);
        assert_eq!(item.actual_duration_minutes, Some(12));
    }

    #[test]
    fn edit_missing_item_fails() {
        let store = MemoryTaskStore::new("tasks");
        let err = store
            .edit_item("tasks", "nope", &ItemPatch::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "item tasks/nope not found");

        store.insert(TaskItem::new("t1", "x"));
        assert!(store
            .edit_item("calendar", "t1", &ItemPatch::default())
            .is_err());
    }

    #[test]
    fn item_ids_tracks_removals() {
        let store = MemoryTaskStore::new("tasks");
        store.insert(TaskItem::new("a", "A"));
        store.insert(TaskItem::new("b", "B"));
        assert_eq!(store.item_ids().unwrap().len(), 2);

        store.remove("a");
        let ids = store.item_ids().unwrap();
        assert!(!ids.contains("a"));
        assert!(ids.contains("b"));
    }

    #[test]
    fn poisoned_store_is_unavailable_not_empty() {
        let store = std::sync::Arc::new(MemoryTaskStore::new("tasks"));
        store.insert(TaskItem::new("t1", "Write report"));

        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _items = holder.items.lock().unwrap();
            panic!("writer crashed");
        })
        .join();

        assert_eq!(
            store.item_ids(),
            Err(TaskStoreError::Unavailable("lock poisoned".to_string()))
        );
    }
}

//! System notifications with an in-app fallback.
//!
//! [`Notifier`] shows a native notification when the backend reports that
//! permission is granted. In every other case (no backend, permission
//! denied or undecided, or the backend failing) it shows a toast instead.
//! It never returns an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tabs::TabId;
use crate::tasks::{Toast, ToastSink};

/// Errors from a notification backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification backend failed: {0}")]
    Backend(String),
}

/// Permission state reported by a notification backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Granted,
    Denied,
    /// The user has not decided yet.
    Default,
}

/// A notification to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    /// Replaces an earlier notification with the same tag.
    pub tag: Option<String>,
    /// Tab to bring to the front when the notification is clicked.
    pub focus_tab: Option<TabId>,
}

/// A native notification facility.
pub trait NotificationBackend: Send + Sync {
    fn permission(&self) -> Permission;

    /// Shows `request`; clicking it should focus `request.focus_tab`.
    ///
    /// # Errors
    ///
    /// Returns a `NotifyError` if the notification could not be shown.
    fn show(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Routes notification requests to the backend or to toasts.
pub struct Notifier {
    backend: Option<Arc<dyn NotificationBackend>>,
    toasts: Arc<dyn ToastSink>,
}

impl Notifier {
    /// Creates a notifier. `backend` is `None` when the runtime has no
    /// notification support at all.
    #[must_use]
    pub fn new(backend: Option<Arc<dyn NotificationBackend>>, toasts: Arc<dyn ToastSink>) -> Self {
        Self { backend, toasts }
    }

    pub fn notify(&self, request: &NotificationRequest) {
        if let Some(backend) = &self.backend {
            match backend.permission() {
                Permission::Granted => match backend.show(request) {
                    Ok(()) => return,
                    Err(e) => warn!(error = %e, "System notification failed, using toast"),
                },
                permission => debug!(?permission, "Notification not permitted, using toast"),
            }
        }
        self.toasts
            .show(Toast::new(request.title.clone(), request.body.clone()));
    }

    /// Direct access to the toast sink for messages that are never native.
    pub fn toast(&self, toast: Toast) {
        self.toasts.show(toast);
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("has_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingToasts(Mutex<Vec<Toast>>);

    impl ToastSink for RecordingToasts {
        fn show(&self, toast: Toast) {
            self.0.lock().unwrap().push(toast);
        }
    }

    struct FakeBackend {
        permission: Permission,
        fail: bool,
        shown: Mutex<Vec<NotificationRequest>>,
    }

    impl FakeBackend {
        fn new(permission: Permission, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                permission,
                fail,
                shown: Mutex::new(Vec::new()),
            })
        }
    }

    impl NotificationBackend for FakeBackend {
        fn permission(&self) -> Permission {
            self.permission
        }

        fn show(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Backend("boom".to_string()));
            }
            self.shown.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn request() -> NotificationRequest {
        NotificationRequest {
            title: "Time's up".to_string(),
            body: "Write report".to_string(),
            tag: Some("focus-end".to_string()),
            focus_tab: None,
        }
    }

    #[test]
    fn granted_permission_uses_backend() {
        let toasts = Arc::new(RecordingToasts::default());
        let backend = FakeBackend::new(Permission::Granted, false);
        let notifier = Notifier::new(Some(backend.clone()), toasts.clone());

        notifier.notify(&request());
        assert_eq!(backend.shown.lock().unwrap().len(), 1);
        assert!(toasts.0.lock().unwrap().is_empty());
    }

    #[test]
    fn denied_or_default_permission_falls_back_to_toast() {
        for permission in [Permission::Denied, Permission::Default] {
            let toasts = Arc::new(RecordingToasts::default());
            let backend = FakeBackend::new(permission, false);
            let notifier = Notifier::new(Some(backend.clone()), toasts.clone());

            notifier.notify(&request());
            assert!(backend.shown.lock().unwrap().is_empty());
            let shown = toasts.0.lock().unwrap();
            assert_eq!(shown.len(), 1);
            assert_eq!(shown[0].title, "Time's up");
        }
    }

    #[test]
    fn backend_failure_falls_back_to_toast() {
        let toasts = Arc::new(RecordingToasts::default());
        let notifier = Notifier::new(
            Some(FakeBackend::new(Permission::Granted, true)),
            toasts.clone(),
        );
        notifier.notify(&request());
        assert_eq!(toasts.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_backend_falls_back_to_toast() {
        let toasts = Arc::new(RecordingToasts::default());
        let notifier = Notifier::new(None, toasts.clone());
        notifier.notify(&request());
        assert_eq!(toasts.0.lock().unwrap()[0].description, "Write report");
    }
}

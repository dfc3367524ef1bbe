//! Native desktop notifications.

use focus_core::dispatch::{NotificationBackend, NotificationRequest, NotifyError, Permission};
use notify_rust::Notification;
use tracing::debug;

const APP_NAME: &str = "focus";
const ICON: &str = "alarm-clock";

/// Shows notifications through the desktop notification service.
///
/// Desktops do not ask for permission, so this always reports
/// [`Permission::Granted`]. A missing notification daemon shows up as a
/// failed `show`, which the notifier turns into a toast.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifications;

impl NotificationBackend for DesktopNotifications {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        build(request)
            .show()
            .map(|_| ())
            .map_err(|e| NotifyError::Backend(e.to_string()))?;
        debug!(title = %request.title, tag = ?request.tag, "Desktop notification shown");
        Ok(())
    }
}

fn build(request: &NotificationRequest) -> Notification {
    let mut notification = Notification::new();
    notification
        .appname(APP_NAME)
        .icon(ICON)
        .summary(&request.title)
        .body(&request.body);
    notification
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_maps_onto_notification() {
        let notification = build(&NotificationRequest {
            title: "Focus session complete".to_string(),
            body: "Write report".to_string(),
            tag: Some("focus-end".to_string()),
            focus_tab: None,
        });
        assert_eq!(notification.summary, "Focus session complete");
        assert_eq!(notification.body, "Write report");
        assert_eq!(notification.appname, APP_NAME);
        assert_eq!(notification.icon, ICON);
    }

    #[test]
    fn desktop_never_asks_for_permission() {
        assert_eq!(DesktopNotifications.permission(), Permission::Granted);
    }
}

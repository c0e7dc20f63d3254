use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::models::notification::{
    NotificationAction, NotificationInput, NotificationKind, Priority, SmartNotification,
};
use crate::observability::metrics::Metrics;

/// Oldest entries beyond this are silently dropped. No persistence, no
/// server sync.
const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// Seam to the platform notification surface. The store always emits a
/// toast; native mirroring is permission-gated.
pub trait NotificationSink: Send + Sync {
    /// Whether the platform has a native notification surface at all.
    fn supported(&self) -> bool;

    /// Permission as last observed by the platform.
    fn current_permission(&self) -> Permission;

    /// Prompts the user. Only called when `supported` is true.
    fn request_permission(&self) -> Permission;

    /// Transient in-app toast. Always invoked on publish.
    fn toast(&self, notification: &SmartNotification);

    /// Native notification. `require_interaction` keeps it on screen until
    /// explicitly dismissed.
    fn native(&self, notification: &SmartNotification, require_interaction: bool);
}

/// Default sink for the headless daemon: toasts and native notifications
/// become structured log lines, and permission is granted on request.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn supported(&self) -> bool {
        true
    }

    fn current_permission(&self) -> Permission {
        Permission::Default
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn toast(&self, notification: &SmartNotification) {
        info!(title = %notification.title, message = %notification.message, "toast");
    }

    fn native(&self, notification: &SmartNotification, require_interaction: bool) {
        info!(
            title = %notification.title,
            require_interaction,
            "native notification"
        );
    }
}

/// Bounded, in-memory, most-recent-first notification list.
pub struct NotificationStore {
    entries: Vec<SmartNotification>,
    permission: Permission,
    sink: Box<dyn NotificationSink>,
    metrics: Arc<Metrics>,
}

impl NotificationStore {
    pub fn new(sink: Box<dyn NotificationSink>, metrics: Arc<Metrics>) -> Self {
        // Permission is read once here; external revocation is not observed
        // until restart.
        let permission = if sink.supported() {
            sink.current_permission()
        } else {
            Permission::Denied
        };

        Self {
            entries: Vec::new(),
            permission,
            sink,
            metrics,
        }
    }

    pub fn entries(&self) -> &[SmartNotification] {
        &self.entries
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Publishes a notification: assigns id and timestamp, prepends, trims
    /// to the cap, always toasts, and mirrors natively when permitted.
    pub fn publish(&mut self, input: NotificationInput) -> Uuid {
        let notification = SmartNotification {
            id: Uuid::new_v4(),
            kind: input.kind,
            title: input.title,
            message: input.message,
            timestamp: Utc::now(),
            priority: input.priority,
            actions: input.actions,
            data: input.data,
        };

        self.metrics
            .notifications_published_total
            .with_label_values(&[priority_label(notification.priority)])
            .inc();

        self.sink.toast(&notification);
        if self.permission == Permission::Granted {
            let require_interaction = notification.priority == Priority::Urgent;
            self.sink.native(&notification, require_interaction);
        }

        let id = notification.id;
        self.entries.insert(0, notification);
        self.entries.truncate(MAX_ENTRIES);
        id
    }

    /// No-op for unknown ids.
    pub fn remove(&mut self, id: Uuid) {
        self.entries.retain(|entry| entry.id != id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns whether native notifications are now permitted. When the
    /// platform has no notification support at all, surfaces a toast and
    /// stays denied.
    pub fn request_permission(&mut self) -> bool {
        if !self.sink.supported() {
            self.publish(NotificationInput::new(
                NotificationKind::General,
                "Notifications unavailable",
                "This platform does not support notifications",
                Priority::Low,
            ));
            return false;
        }

        self.permission = self.sink.request_permission();
        self.permission == Permission::Granted
    }

    pub fn price_drop(&mut self, service_name: &str, old_price: f64, new_price: f64) -> Uuid {
        self.publish(NotificationInput::new(
            NotificationKind::PriceDrop,
            "Price drop",
            format!("{service_name} dropped from {old_price:.2} to {new_price:.2}"),
            Priority::High,
        ))
    }

    pub fn driver_arrival(&mut self, driver_name: &str, eta_min: u32) -> Uuid {
        self.publish(NotificationInput::new(
            NotificationKind::DriverArrival,
            "Driver on the way",
            format!("{driver_name} arrives in about {eta_min} min"),
            Priority::High,
        ))
    }

    /// Safety check-in carries an explicit acknowledgment action.
    pub fn safety_checkin(&mut self) -> Uuid {
        let mut input = NotificationInput::new(
            NotificationKind::SafetyCheckin,
            "Safety check-in",
            "Are you okay? Let us know you're safe",
            Priority::Urgent,
        );
        input.actions.push(NotificationAction {
            action: "im_safe".to_string(),
            title: "I'm safe".to_string(),
        });
        self.publish(input)
    }

    pub fn booking_confirmed(&mut self, service_name: &str, booking_id: &str) -> Uuid {
        self.publish(NotificationInput::new(
            NotificationKind::BookingConfirmed,
            "Booking confirmed",
            format!("{service_name} confirmed booking {booking_id}"),
            Priority::Normal,
        ))
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

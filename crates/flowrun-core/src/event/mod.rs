//! Push notifications to connected clients.
//!
//! `NotificationChannel` is the fire-and-forget port the engine notifies
//! through; `NotificationBus` is the in-process broadcast implementation.

pub mod bus;

pub use bus::NotificationBus;

use flowrun_types::event::PushMessage;

/// Fire-and-forget delivery of push messages.
pub trait NotificationChannel: Send + Sync {
    fn send(&self, message: PushMessage);
}

//! In-process delivery of push messages.
//!
//! Every `flowrun serve` subscriber gets its own `tokio::sync::broadcast`
//! receiver. A message sent while nobody listens is dropped, which is what a
//! fire-and-forget channel promises anyway.

use flowrun_types::event::PushMessage;
use tokio::sync::broadcast;

use super::NotificationChannel;

pub struct NotificationBus {
    sender: broadcast::Sender<PushMessage>,
}

impl NotificationBus {
    /// `capacity` messages are buffered per subscriber before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every message sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }
}

impl NotificationChannel for NotificationBus {
    fn send(&self, message: PushMessage) {
        let execution_id = message.target_id.clone();
        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::debug!(%execution_id, receivers, "push message delivered");
            }
            Err(_) => {
                tracing::debug!(%execution_id, "push message dropped, no subscribers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrun_types::event::EXECUTION_FINISHED;
    use serde_json::json;
    use tokio::sync::broadcast::error::RecvError;

    fn finished(id: &str) -> PushMessage {
        PushMessage {
            kind: EXECUTION_FINISHED.to_string(),
            payload: json!({ "executionId": id, "data": { "status": "crashed" } }),
            target_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_crash_notification() {
        let bus = NotificationBus::new(8);
        let mut cli = bus.subscribe();
        let mut ui = bus.subscribe();

        bus.send(finished("exec-1"));

        for rx in [&mut cli, &mut ui] {
            let message = rx.recv().await.unwrap();
            assert_eq!(message.kind, EXECUTION_FINISHED);
            assert_eq!(message.payload["data"]["status"], json!("crashed"));
        }
    }

    #[test]
    fn sending_without_subscribers_is_silent() {
        let bus = NotificationBus::new(2);
        bus.send(finished("exec-1"));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = NotificationBus::new(2);
        let mut rx = bus.subscribe();
        for id in ["a", "b", "c"] {
            bus.send(finished(id));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().target_id, "b");
    }
}

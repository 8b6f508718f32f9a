use super::messages::Outbound;
use async_trait::async_trait;

/// Delivery seam between the monitoring core and the transport layer.
///
/// `send` is infallible from the core's point of view: a send to a dead or
/// slow connection is the transport's problem to log and swallow, never a
/// reason to fail a polling session.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver a message to exactly the one client connection with this id.
    async fn send(&self, connection_id: &str, message: Outbound);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingBroadcaster {
        sent: Mutex<Vec<(String, Outbound)>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn send(&self, connection_id: &str, message: Outbound) {
            self.sent.lock().push((connection_id.to_string(), message));
        }
    }

    #[tokio::test]
    async fn broadcaster_receives_addressed_message() {
        let broadcaster = RecordingBroadcaster {
            sent: Mutex::new(Vec::new()),
        };

        broadcaster
            .send(
                "conn-1",
                Outbound::Error {
                    message: "boom".into(),
                },
            )
            .await;

        let sent = broadcaster.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-1");
    }
}

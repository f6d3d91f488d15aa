//! Command dispatch with the shared acknowledgment policy.

use std::sync::Arc;

use buslink_core::{Packet, PacketSender};

/// Wraps the transport send primitives with the policy every entity
/// applies to the acknowledgment verdict.
///
/// On ack the caller optimistically applies the requested target state
/// immediately; a later feedback event may still override it. On nack
/// the caller sets the affected state fields to unknown — never the
/// stale value, never the requested one — and does not retry; a retry
/// is a fresh caller-initiated command.
#[derive(Clone)]
pub struct CommandDispatcher {
    sender: Arc<dyn PacketSender>,
}

impl CommandDispatcher {
    pub fn new(sender: Arc<dyn PacketSender>) -> Self {
        Self { sender }
    }

    /// Fire-and-forget send, used only for telemetry-refresh requests.
    pub async fn request_refresh(&self, packet: &Packet) {
        self.sender.send(packet).await;
    }

    /// Send a command and await the transport's verdict.
    pub async fn command(&self, packet: &Packet) -> bool {
        let acked = self.sender.send_with_ack(packet).await;
        if !acked {
            tracing::warn!(%packet, "command not acknowledged");
        }
        acked
    }

    /// Send one command per channel of a composite command.
    ///
    /// Acks are independent: a partially successful command is
    /// reported as-is so each channel's state can reflect its own
    /// verdict.
    pub async fn command_each(&self, packets: &[Packet]) -> Vec<bool> {
        let mut acks = Vec::with_capacity(packets.len());
        for packet in packets {
            acks.push(self.command(packet).await);
        }
        acks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Sender that acks according to a scripted sequence.
    struct ScriptedSender {
        acks: Mutex<Vec<bool>>,
        sent: AtomicUsize,
    }

    impl ScriptedSender {
        fn new(acks: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                acks: Mutex::new(acks),
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PacketSender for ScriptedSender {
        async fn send(&self, _packet: &Packet) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }

        async fn send_with_ack(&self, _packet: &Packet) -> bool {
            let mut acks = self.acks.lock().await;
            if acks.is_empty() {
                true
            } else {
                acks.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn command_each_reports_per_packet_verdicts() {
        let sender = ScriptedSender::new(vec![true, false, true]);
        let dispatcher = CommandDispatcher::new(sender);

        let packets = vec![
            Packet::from_bytes(vec![1]),
            Packet::from_bytes(vec![2]),
            Packet::from_bytes(vec![3]),
        ];
        let acks = dispatcher.command_each(&packets).await;
        assert_eq!(acks, vec![true, false, true]);
    }

    #[tokio::test]
    async fn refresh_uses_fire_and_forget_send() {
        let sender = ScriptedSender::new(vec![]);
        let dispatcher = CommandDispatcher::new(sender.clone());
        dispatcher.request_refresh(&Packet::from_bytes(vec![9])).await;
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }
}

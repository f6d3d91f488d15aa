//! Deduplicated periodic polling of device telemetry.
//!
//! Several logical entities are often decoded from one physical
//! unit's periodic telemetry (a meter's phase readings, the monthly
//! counter and its bill). Polling is deduplicated at the
//! `(device, telemetry-kind[, channel])` granularity: the first
//! registrant constructs the coordinator — building its update packet
//! once — and starts the periodic reissue loop; later registrants
//! share the instance. Delivery to dependents happens through the
//! normal event router, not through the coordinator.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::interval;

use buslink_core::{ChannelIndex, DeviceAddress, Packet, PacketSender, TelemetryKind};

/// Identity of one polled telemetry source.
///
/// The channel participates only for per-channel sources (the energy
/// family); device-wide sources omit it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinatorKey {
    pub device: DeviceAddress,
    pub kind: TelemetryKind,
    pub channel: Option<ChannelIndex>,
}

impl CoordinatorKey {
    /// Key for a source polled once per device.
    pub fn device_wide(device: DeviceAddress, kind: TelemetryKind) -> Self {
        Self {
            device,
            kind,
            channel: None,
        }
    }

    /// Key for a source polled per channel.
    pub fn per_channel(device: DeviceAddress, kind: TelemetryKind, channel: ChannelIndex) -> Self {
        Self {
            device,
            kind,
            channel: Some(channel),
        }
    }
}

/// One shared periodic polling task.
#[derive(Debug)]
pub struct Coordinator {
    key: CoordinatorKey,
    poll_interval: Duration,
    update_packet: Packet,
}

impl Coordinator {
    pub fn key(&self) -> &CoordinatorKey {
        &self.key
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The update-request packet this coordinator reissues. Built once
    /// at registration.
    pub fn update_packet(&self) -> &Packet {
        &self.update_packet
    }
}

struct Slot {
    coordinator: Arc<Coordinator>,
    refs: usize,
    task: JoinHandle<()>,
}

/// Registry owning all coordinators for one integration instance.
///
/// `register` is idempotent by key and refcounted; `release` drops a
/// reference and aborts the polling task once the last dependent is
/// gone, so an entity reload does not leak polling tasks.
pub struct CoordinatorRegistry {
    sender: Arc<dyn PacketSender>,
    slots: DashMap<CoordinatorKey, Slot>,
}

impl CoordinatorRegistry {
    pub fn new(sender: Arc<dyn PacketSender>) -> Self {
        Self {
            sender,
            slots: DashMap::new(),
        }
    }

    /// Get or create the coordinator for `key`.
    ///
    /// The packet factory runs only for the first registrant. The
    /// polling loop skips its initial tick: entities request their own
    /// first snapshot when they subscribe.
    pub fn register(
        &self,
        key: CoordinatorKey,
        poll_interval: Duration,
        update_packet: impl FnOnce() -> Packet,
    ) -> Arc<Coordinator> {
        let mut slot = self.slots.entry(key.clone()).or_insert_with(|| {
            let packet = update_packet();
            let coordinator = Arc::new(Coordinator {
                key: key.clone(),
                poll_interval,
                update_packet: packet.clone(),
            });
            let task = Self::spawn_poll_loop(self.sender.clone(), key.clone(), poll_interval, packet);
            Slot {
                coordinator,
                refs: 0,
                task,
            }
        });
        slot.refs += 1;
        Arc::clone(&slot.coordinator)
    }

    /// Drop one dependent of `key`. When the last dependent releases,
    /// the polling task is aborted and the entry removed.
    pub fn release(&self, key: &CoordinatorKey) {
        let mut remove = false;
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.refs = slot.refs.saturating_sub(1);
            remove = slot.refs == 0;
        }
        if remove {
            if let Some((_, slot)) = self.slots.remove(key) {
                slot.task.abort();
                tracing::debug!(device = %key.device, kind = %key.kind, "coordinator released");
            }
        }
    }

    /// Number of dependents currently registered for `key`.
    pub fn dependents(&self, key: &CoordinatorKey) -> usize {
        self.slots.get(key).map(|slot| slot.refs).unwrap_or(0)
    }

    /// Number of live coordinators.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Abort every polling task (integration shutdown).
    pub fn shutdown(&self) {
        self.slots.retain(|_, slot| {
            slot.task.abort();
            false
        });
    }

    fn spawn_poll_loop(
        sender: Arc<dyn PacketSender>,
        key: CoordinatorKey,
        poll_interval: Duration,
        packet: Packet,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(poll_interval);
            timer.tick().await; // Skip first tick
            loop {
                timer.tick().await;
                tracing::debug!(device = %key.device, kind = %key.kind, "reissuing telemetry request");
                sender.send(&packet).await;
            }
        })
    }
}

impl Drop for CoordinatorRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSender {
        sends: AtomicUsize,
    }

    impl CountingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PacketSender for CountingSender {
        async fn send(&self, _packet: &Packet) {
            self.sends.fetch_add(1, Ordering::SeqCst);
        }

        async fn send_with_ack(&self, _packet: &Packet) -> bool {
            true
        }
    }

    fn meter() -> DeviceAddress {
        DeviceAddress::new((0x01, 0xB8), (1, 10), "gw1")
    }

    #[tokio::test]
    async fn identical_keys_share_one_coordinator() {
        let sender = CountingSender::new();
        let registry = CoordinatorRegistry::new(sender);
        let key = CoordinatorKey::per_channel(meter(), TelemetryKind::Energy, ChannelIndex::new(1));

        let built = AtomicUsize::new(0);
        let first = registry.register(key.clone(), Duration::from_secs(30), || {
            built.fetch_add(1, Ordering::SeqCst);
            Packet::from_bytes(vec![1])
        });
        let second = registry.register(key.clone(), Duration::from_secs(30), || {
            built.fetch_add(1, Ordering::SeqCst);
            Packet::from_bytes(vec![2])
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1, "packet built once");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.dependents(&key), 2);
    }

    #[tokio::test]
    async fn distinct_channels_get_distinct_coordinators() {
        let registry = CoordinatorRegistry::new(CountingSender::new());
        let a = CoordinatorKey::per_channel(meter(), TelemetryKind::Energy, ChannelIndex::new(1));
        let b = CoordinatorKey::per_channel(meter(), TelemetryKind::Energy, ChannelIndex::new(2));

        registry.register(a, Duration::from_secs(30), || Packet::from_bytes(vec![1]));
        registry.register(b, Duration::from_secs(30), || Packet::from_bytes(vec![2]));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn release_removes_only_at_zero_refs() {
        let registry = CoordinatorRegistry::new(CountingSender::new());
        let key = CoordinatorKey::device_wide(meter(), TelemetryKind::Temperature);

        registry.register(key.clone(), Duration::from_secs(30), || {
            Packet::from_bytes(vec![1])
        });
        registry.register(key.clone(), Duration::from_secs(30), || {
            Packet::from_bytes(vec![1])
        });

        registry.release(&key);
        assert_eq!(registry.len(), 1);
        registry.release(&key);
        assert_eq!(registry.len(), 0);

        // Releasing an already-removed key is a no-op.
        registry.release(&key);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_reissues_on_the_interval() {
        let sender = CountingSender::new();
        let registry = CoordinatorRegistry::new(sender.clone());
        let key = CoordinatorKey::device_wide(meter(), TelemetryKind::Health);

        registry.register(key.clone(), Duration::from_secs(30), || {
            Packet::from_bytes(vec![7])
        });
        // Let the polling task start and arm its timer.
        tokio::task::yield_now().await;

        // The first tick is skipped; three intervals mean three sends.
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(31)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(sender.sends.load(Ordering::SeqCst), 3);

        registry.release(&key);
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(31)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(sender.sends.load(Ordering::SeqCst), 3, "stream stops at zero refs");
    }
}

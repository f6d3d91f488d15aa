//! Event router delivering feedback to subscribed entity handlers.
//!
//! The router is a typed registry mapping a [`DeviceAddress`] to the
//! handlers subscribed under it. [`EventRouter::publish`] fans an event
//! out to every handler for the event's address; it performs no
//! transformation and no buffering, so a handler subscribed after a
//! publish misses that event. Entities therefore request a fresh
//! snapshot from the device immediately after subscribing instead of
//! relying on replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::addr::DeviceAddress;
use crate::event::FeedbackEvent;

/// Receiver of feedback events for one entity.
///
/// Implementations hold a shared reference to their entity state and
/// mutate it from `on_event`; decode failures are handled inside the
/// handler and must never propagate to the router.
#[async_trait]
pub trait FeedbackHandler: Send + Sync {
    /// Handle one feedback event published for a subscribed address.
    async fn on_event(&self, event: &FeedbackEvent);
}

/// Identifier of one subscription, returned by [`EventRouter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Typed feedback registry.
pub struct EventRouter {
    subscriptions: DashMap<DeviceAddress, Vec<(SubscriptionId, Arc<dyn FeedbackHandler>)>>,
    next_id: AtomicU64,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler under a device address.
    pub fn subscribe(
        &self,
        device: DeviceAddress,
        handler: Arc<dyn FeedbackHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .entry(device)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, device: &DeviceAddress, id: SubscriptionId) -> bool {
        let Some(mut entry) = self.subscriptions.get_mut(device) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(sub_id, _)| *sub_id != id);
        before != entry.len()
    }

    /// Remove every subscription for a device (entity reload). Returns
    /// the number of handlers removed.
    pub fn unsubscribe_device(&self, device: &DeviceAddress) -> usize {
        self.subscriptions
            .remove(device)
            .map(|(_, handlers)| handlers.len())
            .unwrap_or(0)
    }

    /// Number of handlers subscribed under a device address.
    pub fn subscriber_count(&self, device: &DeviceAddress) -> usize {
        self.subscriptions
            .get(device)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Deliver an event to every handler subscribed under its address.
    ///
    /// Delivery to a single handler is at-most-once per published
    /// event; events published sequentially reach each subscriber in
    /// publication order. No ordering is guaranteed across different
    /// subscribers. Returns the number of handlers the event reached.
    pub async fn publish(&self, event: &FeedbackEvent) -> usize {
        // Snapshot the handler list so no map guard is held across await.
        let handlers: Vec<Arc<dyn FeedbackHandler>> = match self.subscriptions.get(&event.device) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                tracing::debug!(
                    device = %event.device,
                    kind = event.feedback.kind(),
                    "feedback event with no subscribers"
                );
                return 0;
            }
        };

        for handler in &handlers {
            handler.on_event(event).await;
        }
        handlers.len()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

//! Security panel arming-mode select.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use buslink_core::{
    ChannelIndex, DeviceAddress, EventRouter, Feedback, FeedbackEvent, FeedbackHandler, Packet,
    PacketBuilder, PacketTarget, SubscriptionId,
};

use crate::command::CommandDispatcher;
use crate::error::DeviceError;
use crate::state::SecurityMode;

/// Mode select for one security-panel zone.
///
/// The panel is a protected entity: while the admin lock is engaged it
/// is read-only, and a select attempt reverts the displayed option,
/// reissues an update request, and reports a rejected operation.
pub struct SecurityPanel {
    name: String,
    target: PacketTarget,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    update_packet: Packet,
    protection: watch::Receiver<bool>,
    mode: RwLock<Option<SecurityMode>>,
}

impl SecurityPanel {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
        protection: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let target = PacketTarget::new(device, channel);
        Arc::new(Self {
            name: name.into(),
            update_packet: builder.security_update(&target),
            target,
            builder,
            dispatcher,
            protection,
            // Panels report their real mode on the first update
            // response; start from disarm like the panel does.
            mode: RwLock::new(Some(SecurityMode::Disarm)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options selectable on this panel.
    pub fn options(&self) -> &'static [SecurityMode] {
        &SecurityMode::ALL
    }

    pub async fn current_mode(&self) -> Option<SecurityMode> {
        *self.mode.read().await
    }

    /// Whether the panel currently rejects writes.
    pub fn is_read_only(&self) -> bool {
        *self.protection.borrow()
    }

    /// Subscribe to feedback and request the current mode.
    pub async fn attach(self: &Arc<Self>, router: &EventRouter) -> SubscriptionId {
        let id = router.subscribe(self.target.device.clone(), self.clone() as Arc<dyn FeedbackHandler>);
        self.dispatcher.request_refresh(&self.update_packet).await;
        id
    }

    /// Select an arming mode.
    ///
    /// While protected, the displayed option is reverted to
    /// unavailable, a fresh update is requested so the panel's real
    /// mode is re-learned, and the operation is rejected.
    pub async fn select(&self, mode: SecurityMode) -> Result<(), DeviceError> {
        if self.is_read_only() {
            tracing::error!(name = %self.name, "select rejected: panel is read only");
            *self.mode.write().await = None;
            self.dispatcher.request_refresh(&self.update_packet).await;
            return Err(DeviceError::ReadOnly);
        }

        let packet = self.builder.security_control(&self.target, mode.code());
        let acked = self.dispatcher.command(&packet).await;
        *self.mode.write().await = if acked { Some(mode) } else { None };
        if !acked {
            tracing::warn!(name = %self.name, mode = %mode, "failed to set security mode");
        }
        Ok(())
    }
}

#[async_trait]
impl FeedbackHandler for SecurityPanel {
    async fn on_event(&self, event: &FeedbackEvent) {
        let (channel, code) = match &event.feedback {
            Feedback::SecurityFeedback { channel, mode }
            | Feedback::SecurityUpdate { channel, mode } => (*channel, *mode),
            _ => return,
        };
        if channel != self.target.channel {
            return;
        }
        match SecurityMode::from_code(code) {
            Some(mode) => *self.mode.write().await = Some(mode),
            None => tracing::debug!(name = %self.name, code, "unknown security mode code"),
        }
    }
}

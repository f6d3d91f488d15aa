//! Single-channel relay switch.

use std::sync::Arc;

use async_trait::async_trait;

use buslink_core::{
    ChannelIndex, DeviceAddress, EventRouter, Feedback, FeedbackEvent, FeedbackHandler, Packet,
    PacketBuilder, PacketTarget, SubscriptionId,
};
use tokio::sync::RwLock;

use crate::command::CommandDispatcher;
use crate::decode;
use crate::state::SwitchState;

/// A relay channel with on/off state.
pub struct Switch {
    name: String,
    target: PacketTarget,
    router: Arc<EventRouter>,
    dispatcher: CommandDispatcher,
    on_packet: Packet,
    off_packet: Packet,
    update_packet: Packet,
    state: RwLock<SwitchState>,
}

impl Switch {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: &dyn PacketBuilder,
        dispatcher: CommandDispatcher,
        router: Arc<EventRouter>,
    ) -> Arc<Self> {
        let target = PacketTarget::new(device, channel);
        Arc::new(Self {
            name: name.into(),
            on_packet: builder.channel_control(&target, 100),
            off_packet: builder.channel_control(&target, 0),
            update_packet: builder.control_update(&target),
            target,
            router,
            dispatcher,
            state: RwLock::new(SwitchState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &DeviceAddress {
        &self.target.device
    }

    pub async fn state(&self) -> SwitchState {
        *self.state.read().await
    }

    pub async fn is_on(&self) -> Option<bool> {
        self.state.read().await.on
    }

    /// Subscribe to feedback and request a fresh snapshot.
    pub async fn attach(self: &Arc<Self>) -> SubscriptionId {
        let id = self
            .router
            .subscribe(self.target.device.clone(), self.clone() as Arc<dyn FeedbackHandler>);
        self.dispatcher.request_refresh(&self.update_packet).await;
        id
    }

    pub async fn turn_on(&self) {
        self.command(true).await;
    }

    pub async fn turn_off(&self) {
        self.command(false).await;
    }

    async fn command(&self, on: bool) {
        let packet = if on { &self.on_packet } else { &self.off_packet };
        let acked = self.dispatcher.command(packet).await;
        {
            let mut state = self.state.write().await;
            state.on = if acked { Some(on) } else { None };
        }
        if !acked {
            // Let sibling entities on the same unit observe the outage.
            self.router
                .publish(&FeedbackEvent::new(
                    self.target.device.clone(),
                    Feedback::OfflineDevice,
                ))
                .await;
        }
    }
}

#[async_trait]
impl FeedbackHandler for Switch {
    async fn on_event(&self, event: &FeedbackEvent) {
        match &event.feedback {
            Feedback::ControlResponse { channel, bytes } if *channel == self.target.channel => {
                match decode::control_channel_value(bytes) {
                    Some(value) => self.state.write().await.on = Some(value != 0),
                    None => tracing::error!(
                        name = %self.name,
                        "short control_response payload: {bytes:?}"
                    ),
                }
            }
            Feedback::BinaryFeedback { bytes } if !self.target.channel.is_broadcast() => {
                match decode::binary_asserts_off(bytes, self.target.channel) {
                    Some(true) => self.state.write().await.on = Some(false),
                    Some(false) => {}
                    None => tracing::error!(
                        name = %self.name,
                        "malformed binary_feedback payload: {bytes:?}"
                    ),
                }
            }
            Feedback::UpdateResponse { bytes } if !self.target.channel.is_broadcast() => {
                match decode::update_channel_value(bytes, self.target.channel) {
                    Some(value) => self.state.write().await.on = Some(value > 0),
                    None => tracing::error!(
                        name = %self.name,
                        "update_response missing channel {}: {bytes:?}",
                        self.target.channel
                    ),
                }
            }
            Feedback::OfflineDevice => self.state.write().await.on = None,
            _ => {}
        }
    }
}

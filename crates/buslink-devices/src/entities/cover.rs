//! Covers: position-feedback motors and up/down shutter pairs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio::sync::RwLock;

use buslink_core::{
    ChannelIndex, CoverMotion, DeviceAddress, EventRouter, Feedback, FeedbackEvent,
    FeedbackHandler, Packet, PacketBuilder, PacketTarget, SubscriptionId,
};

use crate::command::CommandDispatcher;
use crate::decode;
use crate::error::DeviceError;
use crate::state::{CoverState, Motion, ShutterState};

/// Per-cover installer settings blob.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoverSettings {
    /// The physical device reports position on an inverted scale.
    #[serde(default, deserialize_with = "flag_from_wire")]
    pub exchange_command: bool,
}

impl CoverSettings {
    /// Parse the settings blob attached to the cover's configuration.
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The wire encodes the flag as "0"/"1" strings; accept booleans too.
fn flag_from_wire<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s == "1",
    })
}

/// A cover whose motor reports its position over a single channel.
///
/// All positions on the entity surface are entity-facing: the
/// `exchange_command` inversion is applied on every device boundary
/// crossing, in both directions, and closed is position 0.
pub struct PositionCover {
    name: String,
    target: PacketTarget,
    exchange_command: bool,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    update_packet: Packet,
    state: RwLock<CoverState>,
}

impl PositionCover {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        settings: CoverSettings,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        let target = PacketTarget::new(device, channel);
        Arc::new(Self {
            name: name.into(),
            update_packet: builder.control_update(&target),
            target,
            exchange_command: settings.exchange_command,
            builder,
            dispatcher,
            state: RwLock::new(CoverState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CoverState {
        *self.state.read().await
    }

    pub async fn position(&self) -> Option<u8> {
        self.state.read().await.position
    }

    pub async fn is_closed(&self) -> Option<bool> {
        self.state.read().await.closed
    }

    /// Subscribe to feedback and request a fresh snapshot.
    pub async fn attach(self: &Arc<Self>, router: &EventRouter) -> SubscriptionId {
        let id = router.subscribe(self.target.device.clone(), self.clone() as Arc<dyn FeedbackHandler>);
        self.dispatcher.request_refresh(&self.update_packet).await;
        id
    }

    pub async fn open(&self) {
        self.set_position(100).await;
    }

    pub async fn close(&self) {
        self.set_position(0).await;
    }

    /// Move to an entity-facing position in [0, 100].
    pub async fn set_position(&self, position: u8) {
        let position = position.min(100);
        let send_value = decode::device_position(position, self.exchange_command);
        let packet = self.builder.channel_control(&self.target, send_value);
        let acked = self.dispatcher.command(&packet).await;
        let mut state = self.state.write().await;
        *state = if acked {
            CoverState {
                position: Some(position),
                closed: Some(position == 0),
            }
        } else {
            CoverState::default()
        };
    }

    async fn apply_position(&self, raw: u8) {
        let position = decode::entity_position(raw, self.exchange_command);
        let mut state = self.state.write().await;
        state.position = Some(position);
        state.closed = Some(position == 0);
    }
}

#[async_trait]
impl FeedbackHandler for PositionCover {
    async fn on_event(&self, event: &FeedbackEvent) {
        match &event.feedback {
            Feedback::ControlResponse { channel, bytes } if *channel == self.target.channel => {
                match decode::control_channel_value(bytes) {
                    Some(raw) => self.apply_position(raw).await,
                    None => tracing::error!(
                        name = %self.name,
                        "short control_response payload: {bytes:?}"
                    ),
                }
            }
            Feedback::UpdateResponse { bytes } => {
                match decode::update_channel_value(bytes, self.target.channel) {
                    Some(raw) => self.apply_position(raw).await,
                    None => tracing::error!(
                        name = %self.name,
                        "update_response missing channel {}: {bytes:?}",
                        self.target.channel
                    ),
                }
            }
            Feedback::OfflineDevice => {
                *self.state.write().await = CoverState::default();
            }
            _ => {}
        }
    }
}

/// A cover driven by an up/down relay pair, without position feedback.
///
/// Only motion direction is observable; a stop restores the last known
/// direction's end state.
pub struct Shutter {
    name: String,
    device: DeviceAddress,
    up: ChannelIndex,
    down: ChannelIndex,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    state: RwLock<ShutterState>,
}

impl Shutter {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        up: ChannelIndex,
        down: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            device,
            up,
            down,
            builder,
            dispatcher,
            state: RwLock::new(ShutterState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ShutterState {
        *self.state.read().await
    }

    pub async fn is_closed(&self) -> Option<bool> {
        self.state.read().await.closed
    }

    /// Subscribe to feedback. The relay pair has no snapshot to
    /// request; state fills in from the first command echo.
    pub async fn attach(self: &Arc<Self>, router: &EventRouter) -> SubscriptionId {
        router.subscribe(self.device.clone(), self.clone() as Arc<dyn FeedbackHandler>)
    }

    fn motion_packets(&self, motion: CoverMotion) -> (Packet, Packet) {
        let up = PacketTarget::new(self.device.clone(), self.up);
        let down = PacketTarget::new(self.device.clone(), self.down);
        self.builder.cover_motion(&up, &down, motion)
    }

    /// Open by energizing the up channel only.
    pub async fn open(&self) {
        let (up_packet, _) = self.motion_packets(CoverMotion::Open);
        let acked = self.dispatcher.command(&up_packet).await;
        let mut state = self.state.write().await;
        if acked {
            state.closed = Some(false);
            state.last_motion = Motion::Opening;
        } else {
            state.closed = None;
        }
    }

    /// Close by energizing the down channel only.
    pub async fn close(&self) {
        let (_, down_packet) = self.motion_packets(CoverMotion::Close);
        let acked = self.dispatcher.command(&down_packet).await;
        let mut state = self.state.write().await;
        if acked {
            state.closed = Some(true);
            state.last_motion = Motion::Closing;
        } else {
            state.closed = None;
        }
    }

    /// Stop, sending the packet for the direction currently engaged.
    pub async fn stop(&self) {
        let (up_packet, down_packet) = self.motion_packets(CoverMotion::Stop);
        let packet = if self.state.read().await.closed == Some(true) {
            down_packet
        } else {
            up_packet
        };
        let acked = self.dispatcher.command(&packet).await;
        let mut state = self.state.write().await;
        if acked {
            state.closed = Some(state.last_motion == Motion::Closing);
        } else {
            state.closed = None;
        }
    }
}

#[async_trait]
impl FeedbackHandler for Shutter {
    async fn on_event(&self, event: &FeedbackEvent) {
        match &event.feedback {
            Feedback::ControlResponse { channel, bytes } => {
                let Some(value) = decode::control_channel_value(bytes) else {
                    tracing::error!(name = %self.name, "short control_response payload: {bytes:?}");
                    return;
                };
                let mut state = self.state.write().await;
                if *channel == self.up {
                    if value != 0 {
                        state.closed = Some(false);
                        state.last_motion = Motion::Opening;
                    }
                } else if *channel == self.down {
                    if value != 0 {
                        state.closed = Some(true);
                        state.last_motion = Motion::Closing;
                    }
                } else {
                    // Any other channel on the unit stops the motor.
                    state.closed = Some(state.last_motion == Motion::Closing);
                }
            }
            Feedback::OfflineDevice => {
                self.state.write().await.closed = None;
            }
            _ => {}
        }
    }
}

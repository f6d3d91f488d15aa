//! Dimmable and composite (RGB/RGBW) lights.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use buslink_core::{
    ChannelIndex, DeviceAddress, EventRouter, Feedback, FeedbackEvent, FeedbackHandler, Packet,
    PacketBuilder, PacketTarget, SubscriptionId,
};

use crate::aggregate::ChannelSet;
use crate::command::CommandDispatcher;
use crate::decode;
use crate::error::DeviceError;
use crate::state::{ColorState, DimmerState};

/// A single-channel dimmable light. Brightness is carried in the
/// 0-255 domain and scaled to the wire's 0-100 domain on send.
pub struct Dimmer {
    name: String,
    target: PacketTarget,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    update_packet: Packet,
    state: RwLock<DimmerState>,
}

impl Dimmer {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        let target = PacketTarget::new(device, channel);
        Arc::new(Self {
            name: name.into(),
            update_packet: builder.control_update(&target),
            target,
            builder,
            dispatcher,
            state: RwLock::new(DimmerState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> DimmerState {
        *self.state.read().await
    }

    pub async fn is_on(&self) -> Option<bool> {
        self.state.read().await.on
    }

    pub async fn brightness(&self) -> Option<u8> {
        self.state.read().await.brightness
    }

    /// Subscribe to feedback and request a fresh snapshot.
    pub async fn attach(self: &Arc<Self>, router: &EventRouter) -> SubscriptionId {
        let id = router.subscribe(self.target.device.clone(), self.clone() as Arc<dyn FeedbackHandler>);
        self.dispatcher.request_refresh(&self.update_packet).await;
        id
    }

    /// Turn on, optionally at a specific brightness (defaults to full).
    pub async fn turn_on(&self, brightness: Option<u8>) {
        let level = brightness.unwrap_or(255);
        let packet = self
            .builder
            .channel_control(&self.target, decode::byte_to_percent(level));
        let acked = self.dispatcher.command(&packet).await;
        let mut state = self.state.write().await;
        *state = if acked {
            DimmerState {
                on: Some(true),
                brightness: Some(level),
            }
        } else {
            DimmerState::default()
        };
    }

    pub async fn turn_off(&self) {
        let packet = self.builder.channel_control(&self.target, 0);
        let acked = self.dispatcher.command(&packet).await;
        let mut state = self.state.write().await;
        *state = if acked {
            DimmerState {
                on: Some(false),
                brightness: Some(0),
            }
        } else {
            DimmerState::default()
        };
    }
}

#[async_trait]
impl FeedbackHandler for Dimmer {
    async fn on_event(&self, event: &FeedbackEvent) {
        match &event.feedback {
            Feedback::ControlResponse { channel, bytes } if *channel == self.target.channel => {
                match decode::control_channel_value(bytes) {
                    Some(value) => {
                        let mut state = self.state.write().await;
                        state.on = Some(value != 0);
                        state.brightness = Some(decode::percent_to_byte(value));
                    }
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
                    Some(value) => {
                        let mut state = self.state.write().await;
                        state.brightness = Some(decode::percent_to_byte(value));
                        state.on = Some(value > 0);
                    }
                    None => tracing::error!(
                        name = %self.name,
                        "update_response missing channel {}: {bytes:?}",
                        self.target.channel
                    ),
                }
            }
            Feedback::OfflineDevice => {
                *self.state.write().await = DimmerState::default();
            }
            _ => {}
        }
    }
}

/// How many snapshot requests a composite light issues on attach
/// before resolving to unknown.
const SNAPSHOT_ATTEMPTS: usize = 5;

/// Pause between snapshot attempts.
const SNAPSHOT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

struct ColorLightInner {
    on: Option<bool>,
    color: ColorState,
    /// Last commanded color, reused by brightness-only commands.
    default_color: Vec<u8>,
    /// Component values collected from per-channel command echoes,
    /// published only once the cycle completes.
    staged: Vec<Option<u8>>,
    pending: ChannelSet,
}

/// A composite light whose color channels live on independent bus
/// channels: three for RGB, four for RGBW.
///
/// Command echoes arrive one channel at a time, so observable state is
/// only published when a complete set has been collected; snapshot
/// responses carry every channel at once and publish immediately.
pub struct ColorLight {
    name: String,
    device: DeviceAddress,
    channels: Vec<ChannelIndex>,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    update_packet: Packet,
    snapshot_retry_interval: Duration,
    state: RwLock<ColorLightInner>,
}

impl ColorLight {
    /// An RGB light over three channels.
    pub fn rgb(
        name: impl Into<String>,
        device: DeviceAddress,
        channels: [ChannelIndex; 3],
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Self::with_channels(name, device, channels.to_vec(), builder, dispatcher)
    }

    /// An RGBW light over four channels.
    pub fn rgbw(
        name: impl Into<String>,
        device: DeviceAddress,
        channels: [ChannelIndex; 4],
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Self::with_channels(name, device, channels.to_vec(), builder, dispatcher)
    }

    fn with_channels(
        name: impl Into<String>,
        device: DeviceAddress,
        channels: Vec<ChannelIndex>,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        let n = channels.len();
        let update_packet =
            builder.control_update(&PacketTarget::new(device.clone(), channels[0]));
        Arc::new(Self {
            name: name.into(),
            device,
            channels,
            builder,
            dispatcher,
            update_packet,
            snapshot_retry_interval: SNAPSHOT_RETRY_INTERVAL,
            state: RwLock::new(ColorLightInner {
                on: None,
                color: ColorState::unknown(n),
                default_color: vec![0; n],
                staged: vec![None; n],
                pending: ChannelSet::new(n),
            }),
        })
    }

    /// Override the pause between snapshot attempts, before the light
    /// is shared (tests).
    pub fn set_snapshot_retry_interval(this: &mut Arc<Self>, interval: Duration) {
        if let Some(light) = Arc::get_mut(this) {
            light.snapshot_retry_interval = interval;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_on(&self) -> Option<bool> {
        self.state.read().await.on
    }

    /// The full color once every component is known.
    pub async fn color(&self) -> Option<Vec<u8>> {
        self.state.read().await.color.known()
    }

    async fn color_known(&self) -> bool {
        self.state.read().await.color.known().is_some()
    }

    /// Subscribe to feedback, then request a snapshot up to five times
    /// at a fixed interval, stopping early once any value arrives. If
    /// nothing arrives, state resolves to unknown and the color
    /// defaults to all zero.
    pub async fn attach(self: &Arc<Self>, router: &EventRouter) -> SubscriptionId {
        let id = router.subscribe(self.device.clone(), self.clone() as Arc<dyn FeedbackHandler>);
        for _ in 0..SNAPSHOT_ATTEMPTS {
            if self.color_known().await {
                break;
            }
            self.dispatcher.request_refresh(&self.update_packet).await;
            tokio::time::sleep(self.snapshot_retry_interval).await;
        }
        if !self.color_known().await {
            let mut inner = self.state.write().await;
            inner.on = None;
            inner.color = ColorState::zero(self.channels.len());
        }
        id
    }

    /// Turn on with an explicit color, a brightness applied to the
    /// remembered color, or neither (re-sends the remembered color).
    pub async fn turn_on(
        &self,
        color: Option<Vec<u8>>,
        brightness: Option<u8>,
    ) -> Result<(), DeviceError> {
        match (color, brightness) {
            (Some(color), _) => {
                if color.len() != self.channels.len() {
                    return Err(DeviceError::InvalidOption(format!(
                        "expected {} color components, got {}",
                        self.channels.len(),
                        color.len()
                    )));
                }
                self.send_color(&color, true).await;
                Ok(())
            }
            (None, Some(brightness)) => {
                let level = brightness.max(1) as f64 / 255.0;
                let scaled: Vec<u8> = {
                    let inner = self.state.read().await;
                    inner
                        .default_color
                        .iter()
                        .map(|c| (level * *c as f64).round() as u8)
                        .collect()
                };
                self.send_color(&scaled, false).await;
                Ok(())
            }
            (None, None) => {
                let remembered = self.state.read().await.default_color.clone();
                self.send_color(&remembered, false).await;
                Ok(())
            }
        }
    }

    /// Turn off by driving every channel to zero.
    pub async fn turn_off(&self) {
        let zeros = vec![0u8; self.channels.len()];
        self.send_color(&zeros, false).await;
    }

    /// Issue one control packet per channel and apply each channel's
    /// own ack: acked components take the commanded value, nacked
    /// components become unknown.
    async fn send_color(&self, color: &[u8], remember: bool) {
        let packets: Vec<Packet> = self
            .channels
            .iter()
            .zip(color)
            .map(|(channel, component)| {
                let target = PacketTarget::new(self.device.clone(), *channel);
                self.builder
                    .channel_control(&target, decode::byte_to_percent(*component))
            })
            .collect();
        let acks = self.dispatcher.command_each(&packets).await;

        let mut inner = self.state.write().await;
        for (idx, acked) in acks.iter().enumerate() {
            if *acked {
                inner.color.set(idx, color[idx]);
            } else {
                tracing::error!(
                    name = %self.name,
                    channel = %self.channels[idx],
                    "color channel command not acknowledged"
                );
                inner.color.clear(idx);
            }
        }
        inner.on = inner.color.known().map(|c| c.iter().any(|v| *v > 0));
        if remember {
            inner.default_color = color.to_vec();
        }
    }

    async fn apply_control_response(&self, channel: ChannelIndex, bytes: &[u8]) {
        let Some(idx) = self.channels.iter().position(|c| *c == channel) else {
            return;
        };
        let Some(value) = decode::control_channel_value(bytes) else {
            tracing::error!(name = %self.name, "short control_response payload: {bytes:?}");
            return;
        };

        let mut inner = self.state.write().await;
        inner.staged[idx] = Some(decode::percent_to_byte(value));
        inner.pending.mark(idx);
        if inner.pending.is_complete() {
            let values: Vec<u8> = inner.staged.iter().map(|v| v.unwrap_or(0)).collect();
            inner.color.set_all(&values);
            inner.on = Some(values.iter().any(|v| *v > 0));
            inner.pending.reset();
            inner.staged.fill(None);
        }
    }

    async fn apply_update_response(&self, bytes: &[u8]) {
        // A snapshot carries every channel; a payload missing any of
        // them is malformed and must not tear the color.
        let mut values = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            match decode::update_channel_value(bytes, *channel) {
                Some(value) => values.push(decode::percent_to_byte(value)),
                None => {
                    tracing::error!(
                        name = %self.name,
                        "update_response missing channel {channel}: {bytes:?}"
                    );
                    return;
                }
            }
        }
        let mut inner = self.state.write().await;
        inner.color.set_all(&values);
        inner.on = Some(values.iter().any(|v| *v > 0));
    }
}

#[async_trait]
impl FeedbackHandler for ColorLight {
    async fn on_event(&self, event: &FeedbackEvent) {
        match &event.feedback {
            Feedback::ControlResponse { channel, bytes } => {
                self.apply_control_response(*channel, bytes).await;
            }
            Feedback::UpdateResponse { bytes } => {
                self.apply_update_response(bytes).await;
            }
            Feedback::OfflineDevice => {
                let mut inner = self.state.write().await;
                inner.on = None;
                inner.color = ColorState::unknown(self.channels.len());
                inner.staged.fill(None);
                inner.pending.reset();
            }
            _ => {}
        }
    }
}

//! Coordinator-backed telemetry sensors.
//!
//! Sensors do not command anything; they register a polling
//! coordinator for their telemetry source and decode the readings the
//! coordinator's requests provoke. Registration is refcounted per
//! `(device, kind[, channel])`, so every sensor must release its
//! coordinator on detach.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use tokio::sync::RwLock;

use buslink_core::{
    ChannelIndex, DeviceAddress, EventRouter, Feedback, FeedbackEvent, FeedbackHandler,
    PacketBuilder, PacketTarget, SubscriptionId, TelemetryKind, DEFAULT_POLL_INTERVAL,
};

use crate::billing::BillConfig;
use crate::command::CommandDispatcher;
use crate::coordinator::{CoordinatorKey, CoordinatorRegistry};
use crate::decode::AnalogRange;
use crate::error::DeviceError;

/// Baseline adjustment added to the raw monthly counter before the
/// bill is computed.
pub const BASELINE_ADJUSTMENT_KW: f64 = 100.0;

/// Catalog of multi-phase energy meter readings: wire key and display
/// name. One phase sensor is created per key for each metered channel.
pub const ENERGY_PHASE_KEYS: [(&str, &str); 30] = [
    ("v1", "Voltage Phase 1"),
    ("v2", "Voltage Phase 2"),
    ("v3", "Voltage Phase 3"),
    ("current_p1", "Current Phase 1"),
    ("current_p2", "Current Phase 2"),
    ("current_p3", "Current Phase 3"),
    ("active_p1", "Active Power Phase 1"),
    ("active_p2", "Active Power Phase 2"),
    ("active_p3", "Active Power Phase 3"),
    ("apparent1", "Apparent Power Phase 1"),
    ("apparent2", "Apparent Power Phase 2"),
    ("apparent3", "Apparent Power Phase 3"),
    ("reactive1", "Reactive Power Phase 1"),
    ("reactive2", "Reactive Power Phase 2"),
    ("reactive3", "Reactive Power Phase 3"),
    ("pf1", "Power Factor Phase 1"),
    ("pf2", "Power Factor Phase 2"),
    ("pf3", "Power Factor Phase 3"),
    ("pa1", "Phase Angle Phase 1"),
    ("pa2", "Phase Angle Phase 2"),
    ("pa3", "Phase Angle Phase 3"),
    ("avg_live_to_neutral", "Average Live to Neutral Voltage"),
    ("avg_current", "Average Current"),
    ("sum_current", "Sum Current"),
    ("total_power", "Total Power"),
    ("total_volt_amps", "Total Volt Amps"),
    ("total_var", "Total VAR"),
    ("total_pf", "Total Power Factor"),
    ("total_pa", "Total Phase Angle"),
    ("frq", "Frequency"),
];

/// Display name for a phase-reading key.
pub fn phase_display_name(key: &str) -> Option<&'static str> {
    ENERGY_PHASE_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

/// Temperature sensor, polled device-wide.
pub struct TemperatureSensor {
    name: String,
    target: PacketTarget,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<f64>>,
}

impl TemperatureSensor {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            builder,
            dispatcher,
            reading: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last reported temperature in degrees Celsius.
    pub async fn celsius(&self) -> Option<f64> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::device_wide(self.target.device.clone(), TelemetryKind::Temperature)
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::Temperature, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }
}

#[async_trait]
impl FeedbackHandler for TemperatureSensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::TempFeedback { celsius } = &event.feedback {
            *self.reading.write().await = Some(*celsius);
        }
    }
}

/// Ambient light sensor, polled device-wide.
pub struct LuxSensor {
    name: String,
    target: PacketTarget,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<i64>>,
}

impl LuxSensor {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            builder,
            dispatcher,
            reading: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last reported illuminance, truncated to whole lux.
    pub async fn lux(&self) -> Option<i64> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::device_wide(self.target.device.clone(), TelemetryKind::Health)
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::Health, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }
}

#[async_trait]
impl FeedbackHandler for LuxSensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::HealthFeedback { lux } = &event.feedback {
            *self.reading.write().await = Some(*lux as i64);
        }
    }
}

/// Analog input normalized to 0-100 over a configured range.
pub struct AnalogSensor {
    name: String,
    target: PacketTarget,
    range: AnalogRange,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<u8>>,
}

impl AnalogSensor {
    /// Fails fast on a degenerate `min`/`max` range.
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        min: f64,
        max: f64,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Result<Arc<Self>, DeviceError> {
        Ok(Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            range: AnalogRange::new(min, max)?,
            builder,
            dispatcher,
            reading: RwLock::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last normalized reading on the 0-100 scale.
    pub async fn percent(&self) -> Option<u8> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::device_wide(self.target.device.clone(), TelemetryKind::Analog)
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::Analog, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }
}

#[async_trait]
impl FeedbackHandler for AnalogSensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::AnalogFeedback { values } = &event.feedback {
            match values.get(self.target.channel.bit_position()) {
                Some(raw) => {
                    *self.reading.write().await = Some(self.range.normalize(*raw as f64));
                }
                None => tracing::error!(
                    name = %self.name,
                    channel = %self.target.channel,
                    "analog payload too short: {values:?}"
                ),
            }
        }
    }
}

/// One reading of a multi-phase energy meter, polled per channel.
pub struct EnergyPhaseSensor {
    name: String,
    target: PacketTarget,
    phase_key: String,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<f64>>,
}

impl EnergyPhaseSensor {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        phase_key: impl Into<String>,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            phase_key: phase_key.into(),
            builder,
            dispatcher,
            reading: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn value(&self) -> Option<f64> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::per_channel(
            self.target.device.clone(),
            TelemetryKind::Energy,
            self.target.channel,
        )
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::Energy, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }
}

#[async_trait]
impl FeedbackHandler for EnergyPhaseSensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::EnergyFeedback { channel, phases } = &event.feedback {
            if *channel != self.target.channel {
                return;
            }
            match phases.get(&self.phase_key) {
                Some(value) => *self.reading.write().await = Some(*value),
                None => tracing::error!(
                    name = %self.name,
                    key = %self.phase_key,
                    "energy payload missing phase reading"
                ),
            }
        }
    }
}

/// Monthly accumulated energy, polled per channel.
pub struct MonthlyEnergySensor {
    name: String,
    target: PacketTarget,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<f64>>,
}

impl MonthlyEnergySensor {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            builder,
            dispatcher,
            reading: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw monthly counter in kilowatt-hours.
    pub async fn kwh(&self) -> Option<f64> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::per_channel(
            self.target.device.clone(),
            TelemetryKind::MonthlyEnergy,
            self.target.channel,
        )
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::MonthlyEnergy, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }
}

#[async_trait]
impl FeedbackHandler for MonthlyEnergySensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::MonthlyEnergyFeedback { channel, kwh } = &event.feedback {
            if *channel == self.target.channel {
                *self.reading.write().await = Some(*kwh);
            }
        }
    }
}

/// Monthly bill derived from the monthly energy counter and the
/// seasonal rate tables.
///
/// Shares the monthly-energy coordinator: both sensors decode the same
/// physical telemetry, so they poll it once.
pub struct BillSensor {
    name: String,
    target: PacketTarget,
    config: Option<Arc<BillConfig>>,
    builder: Arc<dyn PacketBuilder>,
    dispatcher: CommandDispatcher,
    reading: RwLock<Option<f64>>,
}

impl BillSensor {
    pub fn new(
        name: impl Into<String>,
        device: DeviceAddress,
        channel: ChannelIndex,
        config: Option<Arc<BillConfig>>,
        builder: Arc<dyn PacketBuilder>,
        dispatcher: CommandDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: PacketTarget::new(device, channel),
            config,
            builder,
            dispatcher,
            reading: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last computed bill amount.
    pub async fn amount(&self) -> Option<f64> {
        *self.reading.read().await
    }

    pub fn coordinator_key(&self) -> CoordinatorKey {
        CoordinatorKey::per_channel(
            self.target.device.clone(),
            TelemetryKind::MonthlyEnergy,
            self.target.channel,
        )
    }

    pub async fn attach(
        self: &Arc<Self>,
        router: &EventRouter,
        registry: &CoordinatorRegistry,
    ) -> SubscriptionId {
        attach_polled(
            router,
            registry,
            &self.dispatcher,
            self.coordinator_key(),
            || {
                self.builder
                    .telemetry_request(TelemetryKind::MonthlyEnergy, &self.target)
            },
            self.clone() as Arc<dyn FeedbackHandler>,
        )
        .await
    }

    pub fn detach(&self, router: &EventRouter, registry: &CoordinatorRegistry, id: SubscriptionId) {
        registry.release(&self.coordinator_key());
        router.unsubscribe(&self.target.device, id);
    }

    /// Bill for a reading in a given month; `None` when no rate table
    /// is configured (no charge, not an error).
    fn bill_for(&self, month: u32, adjusted_kwh: f64) -> Option<f64> {
        self.config.as_ref()?.bill(month, adjusted_kwh)
    }
}

#[async_trait]
impl FeedbackHandler for BillSensor {
    async fn on_event(&self, event: &FeedbackEvent) {
        if let Feedback::MonthlyEnergyFeedback { channel, kwh } = &event.feedback {
            if *channel != self.target.channel {
                return;
            }
            let adjusted = kwh + BASELINE_ADJUSTMENT_KW;
            let month = chrono::Local::now().month();
            match self.bill_for(month, adjusted) {
                Some(amount) => *self.reading.write().await = Some(amount),
                None => tracing::debug!(
                    name = %self.name,
                    "no rate table configured, skipping bill computation"
                ),
            }
        }
    }
}

/// Shared attach sequence for polled sensors: register the coordinator
/// (idempotent by key), subscribe on the router, and request one
/// immediate refresh so state seeds before the first poll interval.
async fn attach_polled(
    router: &EventRouter,
    registry: &CoordinatorRegistry,
    dispatcher: &CommandDispatcher,
    key: CoordinatorKey,
    packet: impl FnOnce() -> buslink_core::Packet,
    handler: Arc<dyn FeedbackHandler>,
) -> SubscriptionId {
    let device = key.device.clone();
    let coordinator = registry.register(key, DEFAULT_POLL_INTERVAL, packet);
    let id = router.subscribe(device, handler);
    dispatcher.request_refresh(coordinator.update_packet()).await;
    id
}

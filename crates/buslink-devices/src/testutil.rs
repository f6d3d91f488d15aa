//! Shared mock transport and packet builder for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use buslink_core::{
    CoverMotion, DeviceAddress, Packet, PacketBuilder, PacketSender, PacketTarget, TelemetryKind,
};

/// A device address for tests.
pub fn addr(unit: u8) -> DeviceAddress {
    DeviceAddress::new((0x02, 0x58), (1, unit), "gw1")
}

/// Transport double recording sent packets and answering acks from a
/// script (exhausted script acks everything).
pub struct MockSender {
    sent: Mutex<Vec<Packet>>,
    acks: Mutex<VecDeque<bool>>,
}

impl MockSender {
    pub fn new() -> Arc<Self> {
        Self::with_acks(Vec::new())
    }

    pub fn with_acks(acks: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(acks.into()),
        })
    }

    /// Every packet sent so far, refresh requests included.
    pub async fn sent(&self) -> Vec<Packet> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PacketSender for MockSender {
    async fn send(&self, packet: &Packet) {
        self.sent.lock().await.push(packet.clone());
    }

    async fn send_with_ack(&self, packet: &Packet) -> bool {
        self.sent.lock().await.push(packet.clone());
        self.acks.lock().await.pop_front().unwrap_or(true)
    }
}

/// Packet builder producing tagged byte patterns so tests can tell
/// packet kinds apart without a real protocol layer.
pub struct MockBuilder;

const TAG_CONTROL: u8 = 0x01;
const TAG_UPDATE: u8 = 0x02;
const TAG_SECURITY_CONTROL: u8 = 0x03;
const TAG_SECURITY_UPDATE: u8 = 0x04;
const TAG_TELEMETRY: u8 = 0x05;
const TAG_COVER_UP: u8 = 0x06;
const TAG_COVER_DOWN: u8 = 0x07;

impl PacketBuilder for MockBuilder {
    fn channel_control(&self, target: &PacketTarget, value: u8) -> Packet {
        Packet::from_bytes(vec![TAG_CONTROL, target.channel.get(), value])
    }

    fn control_update(&self, target: &PacketTarget) -> Packet {
        Packet::from_bytes(vec![TAG_UPDATE, target.channel.get()])
    }

    fn security_control(&self, target: &PacketTarget, mode: u8) -> Packet {
        Packet::from_bytes(vec![TAG_SECURITY_CONTROL, target.channel.get(), mode])
    }

    fn security_update(&self, target: &PacketTarget) -> Packet {
        Packet::from_bytes(vec![TAG_SECURITY_UPDATE, target.channel.get()])
    }

    fn telemetry_request(&self, kind: TelemetryKind, target: &PacketTarget) -> Packet {
        let kind_byte = match kind {
            TelemetryKind::Temperature => 0,
            TelemetryKind::Health => 1,
            TelemetryKind::Analog => 2,
            TelemetryKind::Energy => 3,
            TelemetryKind::MonthlyEnergy => 4,
        };
        Packet::from_bytes(vec![TAG_TELEMETRY, kind_byte, target.channel.get()])
    }

    fn cover_motion(
        &self,
        up: &PacketTarget,
        down: &PacketTarget,
        motion: CoverMotion,
    ) -> (Packet, Packet) {
        let code = match motion {
            CoverMotion::Open => 0,
            CoverMotion::Close => 1,
            CoverMotion::Stop => 2,
        };
        (
            Packet::from_bytes(vec![TAG_COVER_UP, up.channel.get(), code]),
            Packet::from_bytes(vec![TAG_COVER_DOWN, down.channel.get(), code]),
        )
    }
}

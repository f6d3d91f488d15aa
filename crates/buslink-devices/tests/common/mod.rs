//! Mock transport and packet builder shared by the scenario tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use buslink_core::{
    CoverMotion, DeviceAddress, Packet, PacketBuilder, PacketSender, PacketTarget, TelemetryKind,
};

pub fn addr(unit: u8) -> DeviceAddress {
    DeviceAddress::new((0x1B, 0xBA), (1, unit), "gw1")
}

/// Route `RUST_LOG`-filtered tracing output to the test harness.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Transport double: records everything sent, answers acks from a
/// script, acks everything once the script is exhausted.
pub struct MockSender {
    sent: Mutex<Vec<Packet>>,
    acks: Mutex<VecDeque<bool>>,
}

impl MockSender {
    #[allow(dead_code)]
    pub fn new() -> Arc<Self> {
        Self::with_acks(Vec::new())
    }

    pub fn with_acks(acks: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(acks.into()),
        })
    }

    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<Packet> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
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

/// Builder producing tagged packets so tests can tell kinds apart.
pub struct MockBuilder;

impl PacketBuilder for MockBuilder {
    fn channel_control(&self, target: &PacketTarget, value: u8) -> Packet {
        Packet::from_bytes(vec![0x01, target.channel.get(), value])
    }

    fn control_update(&self, target: &PacketTarget) -> Packet {
        Packet::from_bytes(vec![0x02, target.channel.get()])
    }

    fn security_control(&self, target: &PacketTarget, mode: u8) -> Packet {
        Packet::from_bytes(vec![0x03, target.channel.get(), mode])
    }

    fn security_update(&self, target: &PacketTarget) -> Packet {
        Packet::from_bytes(vec![0x04, target.channel.get()])
    }

    fn telemetry_request(&self, kind: TelemetryKind, target: &PacketTarget) -> Packet {
        let kind_byte = match kind {
            TelemetryKind::Temperature => 0,
            TelemetryKind::Health => 1,
            TelemetryKind::Analog => 2,
            TelemetryKind::Energy => 3,
            TelemetryKind::MonthlyEnergy => 4,
        };
        Packet::from_bytes(vec![0x05, kind_byte, target.channel.get()])
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
            Packet::from_bytes(vec![0x06, up.channel.get(), code]),
            Packet::from_bytes(vec![0x07, down.channel.get(), code]),
        )
    }
}

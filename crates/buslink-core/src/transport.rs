//! Seams toward the wire: opaque packets, the transport sender, and
//! the external packet builder.
//!
//! Packet construction and byte-level framing are owned by an external
//! protocol-handler library. This crate only defines the traits that
//! library implements and the opaque [`Packet`] value that crosses the
//! boundary; nothing here interprets packet bytes.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::addr::{ChannelIndex, DeviceAddress};

/// An opaque wire packet produced by a [`PacketBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(Vec<u8>);

impl Packet {
    /// Wrap raw packet bytes produced by the protocol layer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes, handed back to the transport unchanged.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet[{} bytes]", self.0.len())
    }
}

/// Outbound transport owned by the external protocol layer.
#[async_trait]
pub trait PacketSender: Send + Sync {
    /// Fire-and-forget send, used for telemetry-refresh requests.
    async fn send(&self, packet: &Packet);

    /// Send a command and suspend until the transport confirms
    /// delivery or times out. The timeout policy is owned by the
    /// transport; callers only consume the boolean verdict.
    async fn send_with_ack(&self, packet: &Packet) -> bool;
}

/// Entity-like descriptor handed to packet builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketTarget {
    pub device: DeviceAddress,
    pub channel: ChannelIndex,
}

impl PacketTarget {
    pub fn new(device: DeviceAddress, channel: ChannelIndex) -> Self {
        Self { device, channel }
    }
}

/// A periodic telemetry source a device can be polled for.
///
/// Names the update-request packet a coordinator reissues and
/// participates in coordinator identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    Temperature,
    Health,
    Analog,
    Energy,
    MonthlyEnergy,
}

impl TelemetryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Health => "health",
            Self::Analog => "analog",
            Self::Energy => "energy",
            Self::MonthlyEnergy => "monthly_energy",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Motion command for a cover driven by an up/down channel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverMotion {
    Open,
    Close,
    Stop,
}

/// External packet constructors, one per outbound packet kind.
///
/// Implemented by the protocol-handler library; the returned packets
/// are opaque to this workspace.
pub trait PacketBuilder: Send + Sync {
    /// Control packet setting a channel to a raw 0-100 value.
    fn channel_control(&self, target: &PacketTarget, value: u8) -> Packet;

    /// Request for a fresh snapshot of all channel values
    /// (answered by an `update_response`).
    fn control_update(&self, target: &PacketTarget) -> Packet;

    /// Control packet selecting a security mode by code.
    fn security_control(&self, target: &PacketTarget, mode: u8) -> Packet;

    /// Request for the current security mode
    /// (answered by a `security_update`).
    fn security_update(&self, target: &PacketTarget) -> Packet;

    /// Periodic telemetry request for the given kind.
    fn telemetry_request(&self, kind: TelemetryKind, target: &PacketTarget) -> Packet;

    /// Packet pair driving a two-channel cover: `(up, down)`.
    fn cover_motion(
        &self,
        up: &PacketTarget,
        down: &PacketTarget,
        motion: CoverMotion,
    ) -> (Packet, Packet);
}

/// How often coordinators reissue telemetry requests by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_is_an_opaque_byte_buffer() {
        let packet = Packet::from_bytes(vec![1, 2, 3]);
        assert_eq!(packet.as_bytes(), &[1, 2, 3]);
        assert_eq!(packet.len(), 3);
        assert!(!packet.is_empty());
        assert_eq!(packet.to_string(), "packet[3 bytes]");
    }

    #[test]
    fn telemetry_kind_names() {
        assert_eq!(TelemetryKind::MonthlyEnergy.as_str(), "monthly_energy");
        assert_eq!(TelemetryKind::Health.to_string(), "health");
    }
}

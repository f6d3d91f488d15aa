//! Addressing of physical units and their channels on the field bus.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing identity of a physical unit on a gateway.
///
/// A unit is named by its two-byte device-type code, its instance bytes
/// (subnet and unit number) and the gateway it is reachable through.
/// The address is the routing key for inbound feedback and part of the
/// identity of a polling coordinator. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// Two-byte device-type code, e.g. `(0x02, 0x58)` for a 6-channel dimmer.
    pub device_type: (u8, u8),
    /// Instance bytes: subnet and unit number.
    pub instance: (u8, u8),
    /// Gateway the unit is reachable through.
    pub gateway: String,
}

impl DeviceAddress {
    /// Create a new device address.
    pub fn new(device_type: (u8, u8), instance: (u8, u8), gateway: impl Into<String>) -> Self {
        Self {
            device_type,
            instance,
            gateway: gateway.into(),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}{:02x}-{}.{}@{}",
            self.device_type.0, self.device_type.1, self.instance.0, self.instance.1, self.gateway
        )
    }
}

/// 1-based index of a controllable or readable point within a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Sentinel denoting "all channels" of a device.
    pub const BROADCAST: ChannelIndex = ChannelIndex(255);

    /// Create a channel index. Channels are 1-based.
    pub fn new(index: u8) -> Self {
        Self(index)
    }

    /// Raw channel number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether this is the broadcast sentinel.
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// Zero-based position of this channel in bit-packed status payloads.
    pub fn bit_position(self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ChannelIndex {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_is_stable() {
        let addr = DeviceAddress::new((0x02, 0x58), (1, 44), "gw1");
        assert_eq!(addr.to_string(), "0258-1.44@gw1");
    }

    #[test]
    fn addresses_hash_by_value() {
        let a = DeviceAddress::new((0x02, 0x58), (1, 44), "gw1");
        let b = DeviceAddress::new((0x02, 0x58), (1, 44), "gw1");
        let c = DeviceAddress::new((0x02, 0x58), (1, 45), "gw1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn broadcast_channel() {
        assert!(ChannelIndex::new(255).is_broadcast());
        assert!(!ChannelIndex::new(1).is_broadcast());
    }

    #[test]
    fn bit_position_is_zero_based() {
        assert_eq!(ChannelIndex::new(1).bit_position(), 0);
        assert_eq!(ChannelIndex::new(8).bit_position(), 7);
    }
}

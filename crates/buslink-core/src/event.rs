//! Feedback events emitted by the protocol layer.
//!
//! Each inbound telemetry message is parsed by the external protocol
//! handler into a [`FeedbackEvent`]: the address of the reporting unit
//! plus a [`Feedback`] payload, one variant per feedback kind. Events
//! are consumed read-only by entity handlers; the serde field names
//! match the protocol layer's wire schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::addr::{ChannelIndex, DeviceAddress};

/// Payload of one inbound telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feedback_type", rename_all = "snake_case")]
pub enum Feedback {
    /// Echo of a single-channel command: `bytes[2]` carries the raw
    /// channel value on the 0-100 scale.
    ControlResponse {
        #[serde(rename = "channel_number")]
        channel: ChannelIndex,
        #[serde(rename = "additional_bytes")]
        bytes: Vec<u8>,
    },
    /// Bit-packed per-channel status. `bytes[0]` is the channel count,
    /// followed by `ceil(count / 8)` status bytes, MSB first.
    BinaryFeedback {
        #[serde(rename = "additional_bytes")]
        bytes: Vec<u8>,
    },
    /// Snapshot of all channel values, addressed by absolute channel
    /// number (`bytes[channel]`).
    UpdateResponse {
        #[serde(rename = "additional_bytes")]
        bytes: Vec<u8>,
    },
    /// The unit stopped responding; all derived state is unknown.
    OfflineDevice,
    /// Temperature reading in degrees Celsius.
    TempFeedback {
        #[serde(rename = "temp")]
        celsius: f64,
    },
    /// Ambient light reading in lux.
    HealthFeedback { lux: f64 },
    /// Raw analog inputs, one byte per channel, indexed `channel - 1`.
    AnalogFeedback {
        #[serde(rename = "analog")]
        values: Vec<u8>,
    },
    /// Multi-phase energy meter readings, keyed by phase-reading name.
    EnergyFeedback {
        #[serde(rename = "channel_num")]
        channel: ChannelIndex,
        #[serde(rename = "energy")]
        phases: HashMap<String, f64>,
    },
    /// Accumulated energy for the current month, in kilowatt-hours.
    MonthlyEnergyFeedback {
        #[serde(rename = "channel_num")]
        channel: ChannelIndex,
        #[serde(rename = "energy")]
        kwh: f64,
    },
    /// Security panel mode change reported by the panel.
    SecurityFeedback {
        #[serde(rename = "channel_number")]
        channel: ChannelIndex,
        mode: u8,
    },
    /// Security panel mode in response to an update request.
    SecurityUpdate {
        #[serde(rename = "channel_number")]
        channel: ChannelIndex,
        mode: u8,
    },
}

impl Feedback {
    /// Wire name of the feedback kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ControlResponse { .. } => "control_response",
            Self::BinaryFeedback { .. } => "binary_feedback",
            Self::UpdateResponse { .. } => "update_response",
            Self::OfflineDevice => "offline_device",
            Self::TempFeedback { .. } => "temp_feedback",
            Self::HealthFeedback { .. } => "health_feedback",
            Self::AnalogFeedback { .. } => "analog_feedback",
            Self::EnergyFeedback { .. } => "energy_feedback",
            Self::MonthlyEnergyFeedback { .. } => "monthly_energy_feedback",
            Self::SecurityFeedback { .. } => "security_feedback",
            Self::SecurityUpdate { .. } => "security_update",
        }
    }
}

/// One inbound telemetry message, routed by device address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Address of the reporting unit, the routing key.
    #[serde(rename = "device_address")]
    pub device: DeviceAddress,
    /// Decoded payload.
    #[serde(flatten)]
    pub feedback: Feedback,
}

impl FeedbackEvent {
    /// Create a new feedback event.
    pub fn new(device: DeviceAddress, feedback: Feedback) -> Self {
        Self { device, feedback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> DeviceAddress {
        DeviceAddress::new((0x02, 0x58), (1, 44), "gw1")
    }

    #[test]
    fn kind_names_match_wire_schema() {
        let fb = Feedback::ControlResponse {
            channel: ChannelIndex::new(1),
            bytes: vec![0, 0, 100],
        };
        assert_eq!(fb.kind(), "control_response");
        assert_eq!(Feedback::OfflineDevice.kind(), "offline_device");
    }

    #[test]
    fn events_serialize_with_wire_field_names() {
        let event = FeedbackEvent::new(
            addr(),
            Feedback::TempFeedback { celsius: 24.5 },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["feedback_type"], "temp_feedback");
        assert_eq!(json["temp"], 24.5);
        assert!(json["device_address"].is_object());
    }

    #[test]
    fn events_round_trip_through_serde() {
        let event = FeedbackEvent::new(
            addr(),
            Feedback::ControlResponse {
                channel: ChannelIndex::new(3),
                bytes: vec![0, 0, 80],
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: FeedbackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

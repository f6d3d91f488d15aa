//! Device layer of the BusLink field-bus integration.
//!
//! This crate keeps in-memory entity state in step with the telemetry
//! a field bus emits, and gates outgoing control commands on transport
//! acknowledgment. State is rebuilt from the first feedback after a
//! restart; nothing is persisted.
//!
//! ## Architecture
//!
//! - **[`state`]**: tri-state entity value types.
//! - **[`decode`]**: pure per-feedback-kind payload decoders.
//! - **[`aggregate`]**: completeness tracking for composite (RGB/RGBW)
//!   entities whose channels report independently.
//! - **[`command`]**: the ack policy around the transport — ack means
//!   apply optimistically, nack means unknown, never retry.
//! - **[`coordinator`]**: refcounted registry deduplicating periodic
//!   telemetry polling per `(device, kind[, channel])`.
//! - **[`billing`]**: season-dependent flat-tier energy billing.
//! - **[`entities`]**: the concrete entity kinds built from the above.

pub mod aggregate;
pub mod billing;
pub mod command;
pub mod coordinator;
pub mod decode;
pub mod entities;
pub mod error;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use aggregate::ChannelSet;
pub use billing::{BillConfig, RateTier, Season};
pub use command::CommandDispatcher;
pub use coordinator::{Coordinator, CoordinatorKey, CoordinatorRegistry};
pub use decode::AnalogRange;
pub use entities::{
    AdminLock, AnalogSensor, BillSensor, ColorLight, CoverSettings, Dimmer, EnergyPhaseSensor,
    LockState, LuxSensor, MonthlyEnergySensor, PositionCover, SecurityPanel, Shutter, Switch,
    TemperatureSensor,
};
pub use error::DeviceError;
pub use state::{
    ColorState, CoverState, DimmerState, Motion, SecurityMode, ShutterState, SwitchState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

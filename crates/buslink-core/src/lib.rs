//! Core infrastructure for the BusLink field-bus integration.
//!
//! This crate is the leaf of the workspace: device addressing, the
//! feedback-event data model, the typed event router, and the seams
//! toward the external transport and packet-builder library.
//!
//! ## Architecture
//!
//! - **[`DeviceAddress`] / [`ChannelIndex`]**: routing identity of a
//!   physical unit and its addressable points.
//! - **[`FeedbackEvent`]**: one inbound telemetry message, one
//!   [`Feedback`] variant per feedback kind.
//! - **[`EventRouter`]**: fan-out of feedback events to subscribed
//!   [`FeedbackHandler`]s, keyed by device address.
//! - **[`PacketSender`] / [`PacketBuilder`]**: the transport boundary.
//!   Packets are opaque here; byte layout belongs to the external
//!   protocol handler.

pub mod addr;
pub mod event;
pub mod router;
pub mod transport;

pub use addr::{ChannelIndex, DeviceAddress};
pub use event::{Feedback, FeedbackEvent};
pub use router::{EventRouter, FeedbackHandler, SubscriptionId};
pub use transport::{
    CoverMotion, Packet, PacketBuilder, PacketSender, PacketTarget, TelemetryKind,
    DEFAULT_POLL_INTERVAL,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

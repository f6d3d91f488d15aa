//! Concrete entity kinds.
//!
//! Each entity composes an entity-state value with the shared pieces:
//! the decoders, the composite aggregator, the command dispatcher and
//! the coordinator registry. Entities are explicit handler structs
//! implementing [`buslink_core::FeedbackHandler`]; their command
//! surface is plain inherent async methods.

pub mod cover;
pub mod light;
pub mod lock;
pub mod security;
pub mod sensor;
pub mod switch;

pub use cover::{CoverSettings, PositionCover, Shutter};
pub use light::{ColorLight, Dimmer};
pub use lock::{AdminLock, LockState};
pub use security::SecurityPanel;
pub use sensor::{
    phase_display_name, AnalogSensor, BillSensor, EnergyPhaseSensor, LuxSensor,
    MonthlyEnergySensor, TemperatureSensor, BASELINE_ADJUSTMENT_KW, ENERGY_PHASE_KEYS,
};
pub use switch::Switch;

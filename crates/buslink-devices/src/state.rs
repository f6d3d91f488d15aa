//! Entity state value types.
//!
//! Every observable attribute is tri-state: `Some(value)` when known,
//! `None` when unknown (never reported, device offline, or a command
//! was nacked). State values are small plain data; they are owned by
//! their entity and overwritten wholesale, never merged field-by-field
//! from different sources.

use std::fmt;

/// On/off state of a single-channel switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchState {
    pub on: Option<bool>,
}

/// State of a dimmable single-channel light.
///
/// Brightness is carried in the 0-255 output domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimmerState {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
}

/// Color of a composite (RGB or RGBW) light.
///
/// Each component is independently knowable because composite commands
/// are acknowledged per channel: a partially failed command leaves the
/// failed components unknown while the acked ones keep their value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorState {
    components: Vec<Option<u8>>,
}

impl ColorState {
    /// All components unknown.
    pub fn unknown(channel_count: usize) -> Self {
        Self {
            components: vec![None; channel_count],
        }
    }

    /// All components zero (the default after snapshot attempts fail).
    pub fn zero(channel_count: usize) -> Self {
        Self {
            components: vec![Some(0); channel_count],
        }
    }

    /// Number of constituent channels (3 for RGB, 4 for RGBW).
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.components.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, value: u8) {
        if let Some(slot) = self.components.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.components.get_mut(index) {
            *slot = None;
        }
    }

    /// Overwrite all components at once.
    pub fn set_all(&mut self, values: &[u8]) {
        for (slot, value) in self.components.iter_mut().zip(values) {
            *slot = Some(*value);
        }
    }

    /// The full color, if every component is known.
    pub fn known(&self) -> Option<Vec<u8>> {
        self.components.iter().copied().collect()
    }

    /// Whether any known component is non-zero.
    pub fn any_lit(&self) -> bool {
        self.components.iter().any(|c| matches!(c, Some(v) if *v > 0))
    }
}

impl fmt::Display for ColorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|c| match c {
                Some(v) => v.to_string(),
                None => "?".to_string(),
            })
            .collect();
        write!(f, "({})", parts.join(","))
    }
}

/// State of a cover with position feedback.
///
/// Position is entity-facing (inversion already applied); closed is
/// defined as position 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverState {
    pub position: Option<u8>,
    pub closed: Option<bool>,
}

/// Direction a positionless cover last moved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Opening,
    Closing,
}

/// State of a cover driven by an up/down channel pair, without
/// position feedback. `last_motion` is what a stop command restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterState {
    pub closed: Option<bool>,
    pub last_motion: Motion,
}

impl Default for ShutterState {
    fn default() -> Self {
        Self {
            closed: None,
            last_motion: Motion::Opening,
        }
    }
}

/// Arming mode of a security panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    Vacation,
    Away,
    Night,
    Disarm,
}

impl SecurityMode {
    /// All selectable modes, in display order.
    pub const ALL: [SecurityMode; 4] = [
        SecurityMode::Vacation,
        SecurityMode::Away,
        SecurityMode::Night,
        SecurityMode::Disarm,
    ];

    /// Wire code of the mode.
    pub fn code(self) -> u8 {
        match self {
            Self::Vacation => 1,
            Self::Away => 2,
            Self::Night => 3,
            Self::Disarm => 6,
        }
    }

    /// Mode for a wire code, if the code is known.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Vacation),
            2 => Some(Self::Away),
            3 => Some(Self::Night),
            6 => Some(Self::Disarm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::Away => "away",
            Self::Night => "night",
            Self::Disarm => "disarm",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

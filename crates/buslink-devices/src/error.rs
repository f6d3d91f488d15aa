//! Error taxonomy for the device layer.

/// Errors surfaced by entity operations and configuration loading.
///
/// Command failures (a nacked `send_with_ack`) are deliberately not
/// errors: they surface as "unknown" entity state instead.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Wrong credential supplied to a lock or security operation.
    /// The operation is rejected and state is left unchanged.
    #[error("invalid credential")]
    InvalidCredential,

    /// The entity is protected and currently read-only.
    #[error("entity is protected and read only")]
    ReadOnly,

    /// An option outside the entity's option set was requested.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Invalid configuration supplied for an entity.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed external configuration document.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

//! Error types for the LimaCCDs device server.
//!
//! `LimaError` is the single error type surfaced by the façade, the property
//! resolver and plugin registration. It follows the taxonomy the device server
//! reports to remote clients:
//!
//! - **Initialization failures** (`PluginNotFound`, `MissingCameraType`,
//!   `ControlConstruction`) never escape `init`; they move the device to
//!   `FAULT` and are kept as the device status.
//! - **Invalid arguments** (`InvalidArgument`, `TypeMismatch`, `ReadOnly`) are
//!   returned to the caller of an attribute write or command.
//! - **Engine errors** wrap whatever the acquisition engine returned.
//!
//! Capability gaps met by reads and commands (no manual shutter, unset numeric
//! values) are *not* errors; the façade maps them to sentinels or no-ops. Only
//! an explicit request for manual shutter mode fails, with
//! `ShutterCapabilityMissing`.

use thiserror::Error;

/// Convenience alias for results using the device server error type.
pub type LimaResult<T> = std::result::Result<T, LimaError>;

/// Primary error type for the LimaCCDs device server.
#[derive(Error, Debug)]
pub enum LimaError {
    /// The configured camera type names no registered camera plugin.
    ///
    /// **Recovery Strategy**: fix the `LimaCameraType` property or enable the
    /// plugin, then re-initialise the device.
    #[error("Camera plugin '{0}' is not available")]
    PluginNotFound(String),

    /// The `LimaCameraType` device property is absent or empty.
    #[error("Device property LimaCameraType is not set")]
    MissingCameraType,

    /// The camera plugin rejected the resolved properties.
    #[error("Camera plugin '{plugin}' failed to construct its control object: {source}")]
    ControlConstruction {
        /// Plugin that was asked to construct the control object
        plugin: String,
        /// Error reported by the plugin
        #[source]
        source: anyhow::Error,
    },

    /// An enumerated attribute was written with a symbol absent from its table.
    #[error("Wrong value {attribute}: {value}")]
    InvalidArgument {
        /// Attribute being written
        attribute: &'static str,
        /// Offending value, as uppercased for the lookup
        value: String,
    },

    /// Manual shutter mode requested on a shutter without hardware capability.
    #[error("Shutter has no hardware capability, cannot select MANUAL mode")]
    ShutterCapabilityMissing,

    /// The device has no control object (it is in FAULT or was deleted).
    #[error("Device has no control object: {0}")]
    NotInitialized(String),

    /// No attribute with this name exists on the device.
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// No command with this name exists on the device.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// Write requested on a read-only attribute.
    #[error("Attribute '{0}' is read-only")]
    ReadOnly(String),

    /// Value type does not match the attribute or command argument type.
    #[error("Attribute or command '{name}' expects {expected}")]
    TypeMismatch {
        /// Attribute or command name
        name: String,
        /// Human-readable description of the expected type
        expected: &'static str,
    },

    /// Plugin registration with the device-class registry failed.
    #[error("Registration of plugin '{plugin}' failed: {message}")]
    Registration {
        /// Plugin being registered
        plugin: String,
        /// Diagnostic from the registry or the plugin
        message: String,
    },

    /// The property database could not answer a query.
    #[error("Property database error: {0}")]
    Database(String),

    /// Server configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The acquisition engine reported an error.
    #[error("Engine error: {0}")]
    Engine(#[from] anyhow::Error),
}

impl LimaError {
    /// Protocol-level reason string reported alongside the message.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } | Self::TypeMismatch { .. } => "WrongData",
            Self::PluginNotFound(_)
            | Self::MissingCameraType
            | Self::ControlConstruction { .. }
            | Self::NotInitialized(_) => "DeviceFault",
            Self::ShutterCapabilityMissing => "NotSupported",
            Self::UnknownAttribute(_) => "AttrNotFound",
            Self::UnknownCommand(_) => "CommandNotFound",
            Self::ReadOnly(_) => "AttrNotAllowed",
            Self::Registration { .. } => "RegistrationFailed",
            Self::Database(_) => "DatabaseError",
            Self::Config(_) => "ConfigError",
            Self::Engine(_) => "EngineError",
        }
    }

    /// Whether this error marks the device unusable until re-initialisation.
    pub fn is_fatal_init(&self) -> bool {
        matches!(
            self,
            Self::PluginNotFound(_) | Self::MissingCameraType | Self::ControlConstruction { .. }
        )
    }
}

impl From<figment::Error> for LimaError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

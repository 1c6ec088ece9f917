//! `lima-ccds`
//!
//! The LimaCCDs device server. A [`LimaCcds`] device owns one acquisition
//! control object, built by the camera plugin named in its `LimaCameraType`
//! property, and exposes it as remote attributes and commands.
//!
//! Startup order:
//! 1. [`config`] loads the server configuration and property database
//! 2. [`registration`] loads plugins and registers their device classes
//! 3. [`resolver`] builds the control object for a device
//! 4. [`device`] serves attribute and command requests

pub mod attributes;
pub mod config;
pub mod device;
pub mod registration;
pub mod resolver;
pub mod server;

pub use attributes::{AttrValue, AttributeInfo, CommandInfo, DataType, ATTRIBUTES, COMMANDS};
pub use config::ServerConfig;
pub use device::{DevState, LimaCcds, ManualShutterState};
pub use registration::{register_plugins, RegistrationReport};
pub use resolver::{PropertyResolver, Resolution};
pub use server::{builtin_catalog, LimaServer};

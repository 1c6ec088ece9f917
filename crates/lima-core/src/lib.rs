//! `lima-core`
//!
//! Core trait definitions and types for the LimaCCDs device server.
//!
//! The device server exposes a camera's acquisition control as remote
//! attributes and commands. This crate holds everything shared between the
//! server and the plugins:
//!
//! - [`control`]: the acquisition engine as seen by the façade
//! - [`modes`]: engine mode constants and their symbolic tables
//! - [`debug`]: packed debug flags and the diagnostic configuration
//! - [`plugin`]: camera/common plugin traits, catalog and class registry
//! - [`property`]: device properties and the property database seam
//! - [`error`]: the [`LimaError`] taxonomy

pub mod control;
pub mod debug;
pub mod error;
pub mod modes;
pub mod plugin;
pub mod property;

pub use control::{
    AcquisitionCtrl, ControlObject, ControlRef, CtStatus, HwInterface, ImageCounters, SavingCtrl,
    ShutterCtrl,
};
pub use debug::{DebugFlags, DebugParams, DebugSettings};
pub use error::{LimaError, LimaResult};
pub use modes::{AcqMode, EnumerationTable, ShutterMode, ACQ_MODE_TABLE, SHUTTER_MODE_TABLE};
pub use plugin::{
    CameraPlugin, ClassRegistry, CommonPlugin, DeviceBinding, DeviceClassRegistry, PluginCatalog,
    PluginLoad, PluginRegistry,
};
pub use property::{
    DeviceClassEntry, DeviceRecord, MemoryDatabase, PropertyDatabase, PropertyTable,
    PropertyValue,
};

//! Server configuration.
//!
//! Layered with figment, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (optional)
//! 3. `LIMA_` environment variables, nested keys split on `__`
//!    (`LIMA_SERVER__INSTANCE=id00`)
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! exec_name = "LimaCCDs"
//! instance = "simulator"
//!
//! [plugins]
//! camera = ["simulator"]
//! common = ["counter_monitor"]
//!
//! [[devices]]
//! name = "id00/limaccds/simulator"
//! class = "LimaCCDs"
//! properties = { LimaCameraType = "simulator", NbProcessingThread = 4 }
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use lima_core::error::LimaResult;
use lima_core::property::{DeviceRecord, MemoryDatabase};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Class name of the façade device in the property database.
pub const FACADE_CLASS: &str = "LimaCCDs";

/// Identity of this server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Executable name, first half of the instance name
    pub exec_name: String,
    /// Instance name, second half
    pub instance: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            exec_name: FACADE_CLASS.to_string(),
            instance: "simulator".to_string(),
        }
    }
}

impl ServerSection {
    /// `<exec_name>/<instance>`, the key of this server in the property
    /// database.
    pub fn personal_name(&self) -> String {
        format!("{}/{}", self.exec_name, self.instance)
    }
}

/// Plugin names probed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSection {
    /// Camera plugins
    pub camera: Vec<String>,
    /// Plugins shared by every camera
    pub common: Vec<String>,
}

impl Default for PluginSection {
    fn default() -> Self {
        Self {
            camera: vec!["simulator".to_string()],
            common: ["counter_monitor", "bpm", "roi_counter"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Server identity
    pub server: ServerSection,
    /// Plugin lists
    pub plugins: PluginSection,
    /// Device records forming the property database
    pub devices: Vec<DeviceRecord>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerSection::default(),
            plugins: PluginSection::default(),
            devices: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> LimaResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(figment::Error::from(format!(
                    "config file not found: {}",
                    path.display()
                ))
                .into());
            }
            tracing::debug!(path = %path.display(), "Loading server configuration");
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("LIMA_").split("__"));
        Ok(figment.extract()?)
    }

    /// Parse a TOML document on top of the defaults, without environment
    /// overrides.
    pub fn from_toml_str(toml: &str) -> LimaResult<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?)
    }

    /// Build the property database described by the `[[devices]]` entries.
    pub fn database(&self) -> MemoryDatabase {
        let mut db = MemoryDatabase::new(self.server.personal_name());
        for device in &self.devices {
            db.add_device(device.clone());
        }
        db
    }

    /// Name of the first device of class `LimaCCDs`.
    pub fn facade_device(&self) -> Option<&str> {
        self.devices
            .iter()
            .find(|d| d.class.eq_ignore_ascii_case(FACADE_CLASS))
            .map(|d| d.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lima_core::property::PropertyDatabase;

    #[test]
    fn defaults_probe_simulator_and_common_plugins() {
        let config = ServerConfig::default();
        assert_eq!(config.server.personal_name(), "LimaCCDs/simulator");
        assert_eq!(config.plugins.camera, ["simulator"]);
        assert_eq!(
            config.plugins.common,
            ["counter_monitor", "bpm", "roi_counter"]
        );
        assert!(config.facade_device().is_none());
    }

    #[test]
    fn devices_become_a_property_database() {
        let config = ServerConfig::from_toml_str(
            r#"
            [server]
            instance = "id00"

            [[devices]]
            name = "id00/limaccds/sim"
            class = "LimaCCDs"
            properties = { LimaCameraType = "simulator" }

            [[devices]]
            name = "id00/simulator/0"
            class = "Simulator"
            properties = { shutter_modes = ["manual", "auto_frame"] }
            "#,
        )
        .unwrap();

        assert_eq!(config.facade_device(), Some("id00/limaccds/sim"));
        let db = config.database();
        let entries = db.device_class_list("LimaCCDs/id00").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            db.device_property("id00/simulator/0", "shutter_modes")
                .unwrap(),
            ["manual", "auto_frame"]
        );
    }

    #[test]
    fn unquoted_property_values_are_kept_as_text() {
        let config = ServerConfig::from_toml_str(
            r#"
            [[devices]]
            name = "id00/limaccds/sim"
            class = "LimaCCDs"
            properties = { LimaCameraType = "simulator", NbProcessingThread = 4 }

            [[devices]]
            name = "id00/simulator/0"
            class = "Simulator"
            properties = { expo_time = 0.5, shutter_capability = false }
            "#,
        )
        .unwrap();

        let db = config.database();
        assert_eq!(
            db.device_property("id00/limaccds/sim", "NbProcessingThread")
                .unwrap(),
            ["4"]
        );
        assert_eq!(
            db.device_property("id00/simulator/0", "expo_time").unwrap(),
            ["0.5"]
        );
        assert_eq!(
            db.device_property("id00/simulator/0", "shutter_capability")
                .unwrap(),
            ["false"]
        );
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = ServerConfig::from_toml_str("devices = 3").unwrap_err();
        assert_eq!(err.reason(), "ConfigError");
    }
}

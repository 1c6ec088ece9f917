//! Composition root: catalog, registration, property database and devices.

use crate::config::ServerConfig;
use crate::device::LimaCcds;
use crate::registration::{register_plugins, RegistrationReport};
use crate::resolver::PropertyResolver;
use lima_core::debug::DebugSettings;
use lima_core::error::{LimaError, LimaResult};
use lima_core::plugin::{ClassRegistry, PluginCatalog, PluginRegistry};
use lima_core::property::PropertyDatabase;
use std::sync::Arc;

/// Plugins compiled into this server.
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    lima_simulator::register_all(&mut catalog);
    catalog
}

/// A running server instance.
pub struct LimaServer {
    config: ServerConfig,
    registry: PluginRegistry,
    classes: Arc<ClassRegistry>,
    database: Arc<dyn PropertyDatabase>,
    debug: DebugSettings,
    report: RegistrationReport,
}

impl LimaServer {
    /// Start with the built-in plugin catalog.
    pub fn start(config: ServerConfig) -> Self {
        Self::with_catalog(config, &builtin_catalog())
    }

    /// Start with an explicit catalog.
    pub fn with_catalog(config: ServerConfig, catalog: &PluginCatalog) -> Self {
        let classes = Arc::new(ClassRegistry::new());
        let (registry, report) = register_plugins(catalog, &config.plugins, classes.as_ref());
        let database: Arc<dyn PropertyDatabase> = Arc::new(config.database());
        tracing::info!(
            server = %config.server.personal_name(),
            cameras = ?registry.camera_names(),
            commons = ?registry.common_names(),
            "Server started"
        );
        Self {
            config,
            registry,
            classes,
            database,
            debug: DebugSettings::default(),
            report,
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Loaded plugins.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Registered device classes.
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// What happened during plugin registration.
    pub fn report(&self) -> &RegistrationReport {
        &self.report
    }

    /// Diagnostic settings shared by every device of this server.
    pub fn debug_settings(&self) -> &DebugSettings {
        &self.debug
    }

    /// Create and initialise the device `name`.
    pub fn create_device(&self, name: &str) -> LimaCcds {
        let resolver = PropertyResolver::new(
            self.registry.clone(),
            self.database.clone(),
            self.config.server.personal_name(),
        );
        let mut device = LimaCcds::new(name, resolver, self.debug.clone());
        device.init();
        device
    }

    /// Create the device declared with class `LimaCCDs` in the configuration.
    pub fn facade(&self) -> LimaResult<LimaCcds> {
        let name = self.config.facade_device().ok_or_else(|| {
            LimaError::Database(format!(
                "no {} device declared for {}",
                crate::config::FACADE_CLASS,
                self.config.server.personal_name()
            ))
        })?;
        Ok(self.create_device(name))
    }
}

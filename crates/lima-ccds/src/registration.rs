//! Plugin registration at server startup.
//!
//! Every configured name is probed in the compiled-in catalog. A name the
//! catalog does not know is skipped quietly; a plugin that exists but fails to
//! load or to declare its device class is logged with its full error chain and
//! registration moves on to the next name.

use crate::config::PluginSection;
use lima_core::error::LimaError;
use lima_core::plugin::{DeviceBinding, DeviceClassRegistry, PluginCatalog, PluginLoad, PluginRegistry};

/// Outcome of a registration pass.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Plugins loaded, camera plugins first
    pub loaded: Vec<String>,
    /// Configured names absent from the catalog
    pub skipped: Vec<String>,
    /// Failures, in the order they happened
    pub failures: Vec<LimaError>,
}

impl RegistrationReport {
    fn fail(&mut self, plugin: &str, err: &anyhow::Error) {
        tracing::error!(plugin, error = ?err, "Plugin registration failed");
        self.failures.push(LimaError::Registration {
            plugin: plugin.to_string(),
            message: format!("{err:#}"),
        });
    }

    fn declare(
        &mut self,
        plugin: &str,
        binding: anyhow::Result<Option<DeviceBinding>>,
        classes: &dyn DeviceClassRegistry,
    ) {
        let binding = match binding {
            Ok(Some(binding)) => binding,
            Ok(None) => return,
            Err(e) => return self.fail(plugin, &e),
        };
        match classes.add_class(&binding) {
            Ok(()) => tracing::info!(
                plugin,
                class = %binding.class_name,
                device_type = %binding.device_type,
                "Registered device class"
            ),
            Err(e) => self.fail(plugin, &e),
        }
    }
}

/// Load every plugin named in `plugins` and register their device classes.
pub fn register_plugins(
    catalog: &PluginCatalog,
    plugins: &PluginSection,
    classes: &dyn DeviceClassRegistry,
) -> (PluginRegistry, RegistrationReport) {
    let mut registry = PluginRegistry::new();
    let mut report = RegistrationReport::default();

    for name in &plugins.camera {
        match catalog.load_camera(name) {
            PluginLoad::Missing => {
                tracing::debug!(plugin = %name, "Camera plugin not available, skipping");
                report.skipped.push(name.clone());
            }
            PluginLoad::Failed(e) => report.fail(name, &e),
            PluginLoad::Loaded(plugin) => {
                report.declare(name, plugin.device_binding(), classes);
                registry.insert_camera(plugin);
                report.loaded.push(name.clone());
            }
        }
    }

    for name in &plugins.common {
        match catalog.load_common(name) {
            PluginLoad::Missing => {
                tracing::debug!(plugin = %name, "Common plugin not available, skipping");
                report.skipped.push(name.clone());
            }
            PluginLoad::Failed(e) => report.fail(name, &e),
            PluginLoad::Loaded(plugin) => {
                report.declare(name, plugin.device_binding(), classes);
                registry.insert_common(plugin);
                report.loaded.push(name.clone());
            }
        }
    }

    tracing::info!(
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "Plugin registration complete"
    );
    (registry, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use lima_core::control::ControlObject;
    use lima_core::plugin::{CameraPlugin, ClassRegistry};
    use lima_core::property::PropertyTable;
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct BadBinding;

    impl CameraPlugin for BadBinding {
        fn name(&self) -> &str {
            "bad_binding"
        }

        fn device_binding(&self) -> anyhow::Result<Option<DeviceBinding>> {
            Err(anyhow!("class module is broken"))
        }

        fn construct(&self, _: &PropertyTable) -> anyhow::Result<Arc<dyn ControlObject>> {
            Err(anyhow!("never constructed"))
        }
    }

    fn catalog() -> PluginCatalog {
        let mut catalog = PluginCatalog::new();
        lima_simulator::register_all(&mut catalog);
        catalog.add_camera("bad_binding", || {
            Ok(Arc::new(BadBinding) as Arc<dyn CameraPlugin>)
        });
        catalog.add_camera("broken", || Err(anyhow!("shared library missing symbol")));
        catalog
    }

    #[test]
    #[traced_test]
    fn failures_are_logged_and_do_not_stop_registration() {
        let plugins = PluginSection {
            camera: vec![
                "broken".into(),
                "bad_binding".into(),
                "absent".into(),
                "simulator".into(),
            ],
            common: vec!["counter_monitor".into(), "bpm".into()],
        };
        let classes = ClassRegistry::new();

        let (registry, report) = register_plugins(&catalog(), &plugins, &classes);

        assert_eq!(report.loaded, ["bad_binding", "simulator", "counter_monitor"]);
        assert_eq!(report.skipped, ["absent", "bpm"]);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|e| e.reason() == "RegistrationFailed"));

        assert!(registry.camera("simulator").is_some());
        assert!(registry.camera("broken").is_none());
        assert_eq!(registry.common_names(), ["counter_monitor"]);
        assert_eq!(classes.device_types(), ["CounterMonitor", "Simulator"]);

        assert!(logs_contain("Plugin registration failed"));
        assert!(logs_contain("shared library missing symbol"));
        assert!(logs_contain("class module is broken"));
    }

    #[test]
    fn duplicate_device_class_is_a_failure() {
        let plugins = PluginSection {
            camera: vec!["simulator".into()],
            common: Vec::new(),
        };
        let classes = ClassRegistry::new();
        classes
            .add_class(&DeviceBinding::new("Other", "Simulator"))
            .unwrap();

        let (registry, report) = register_plugins(&catalog(), &plugins, &classes);
        assert_eq!(report.failures.len(), 1);
        assert!(registry.camera("simulator").is_some());
    }
}

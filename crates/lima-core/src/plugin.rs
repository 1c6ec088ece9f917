//! Plugin API
//!
//! Camera plugins construct the acquisition engine; common plugins add shared
//! behaviour on top of it. Both are compiled in and listed in a
//! [`PluginCatalog`] at startup via explicit `catalog.add_camera(...)` calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Composition Root (server)                     │
//! │  catalog.add_camera("simulator", || Ok(Arc::new(Simulator)));   │
//! │  catalog.add_common("counter_monitor", ...);                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │  load(name) for each configured name
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PluginRegistry                           │
//! │  camera: name → Arc<dyn CameraPlugin>                           │
//! │  common: [Arc<dyn CommonPlugin>]                                │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              CameraPlugin::construct(properties)                │
//! │     returns the control object owned by the device façade       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::control::{ControlObject, ControlRef};
use crate::property::PropertyTable;
use anyhow::Result;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Device class a plugin contributes to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceBinding {
    /// Class name registered with the device-class registry
    pub class_name: String,
    /// Device type; its name keys the registration and the class → device
    /// table used to find the plugin's persisted properties
    pub device_type: String,
}

impl DeviceBinding {
    /// Create a binding.
    pub fn new(class_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            device_type: device_type.into(),
        }
    }
}

/// A camera-specific plugin.
pub trait CameraPlugin: Send + Sync {
    /// Name the plugin is selected by (the `LimaCameraType` property value)
    fn name(&self) -> &str;

    /// Device class this plugin declares, if any.
    ///
    /// Errors are logged by registration, which then moves on to the next
    /// plugin.
    fn device_binding(&self) -> Result<Option<DeviceBinding>> {
        Ok(None)
    }

    /// Build the control object, the properties acting as named arguments.
    ///
    /// Unknown or malformed properties must be rejected with an error.
    fn construct(&self, properties: &PropertyTable) -> Result<Arc<dyn ControlObject>>;

    /// Release the camera interface when the device is deleted.
    fn close_interface(&self) -> Result<()> {
        Ok(())
    }
}

/// A plugin shared by every camera.
pub trait CommonPlugin: Send + Sync {
    /// Plugin name
    fn name(&self) -> &str;

    /// Device class this plugin declares, if any.
    fn device_binding(&self) -> Result<Option<DeviceBinding>> {
        Ok(None)
    }

    /// Notification that a control object is ready.
    ///
    /// The handle does not keep the control object alive. Plugins that do not
    /// observe the engine leave the default no-op.
    fn set_control_ref(&self, _control: ControlRef) {}
}

type CameraLoader = Box<dyn Fn() -> Result<Arc<dyn CameraPlugin>> + Send + Sync>;
type CommonLoader = Box<dyn Fn() -> Result<Arc<dyn CommonPlugin>> + Send + Sync>;

/// Outcome of asking the catalog for a plugin by name.
pub enum PluginLoad<P: ?Sized> {
    /// The catalog has no plugin with this name
    Missing,
    /// The plugin exists but its loader failed
    Failed(anyhow::Error),
    /// The plugin is ready
    Loaded(Arc<P>),
}

/// Compiled-in plugins, looked up by name.
#[derive(Default)]
pub struct PluginCatalog {
    cameras: BTreeMap<String, CameraLoader>,
    commons: BTreeMap<String, CommonLoader>,
}

impl PluginCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a camera plugin available under `name`.
    pub fn add_camera<F>(&mut self, name: impl Into<String>, loader: F)
    where
        F: Fn() -> Result<Arc<dyn CameraPlugin>> + Send + Sync + 'static,
    {
        self.cameras.insert(name.into(), Box::new(loader));
    }

    /// Make a common plugin available under `name`.
    pub fn add_common<F>(&mut self, name: impl Into<String>, loader: F)
    where
        F: Fn() -> Result<Arc<dyn CommonPlugin>> + Send + Sync + 'static,
    {
        self.commons.insert(name.into(), Box::new(loader));
    }

    /// Load a camera plugin.
    pub fn load_camera(&self, name: &str) -> PluginLoad<dyn CameraPlugin> {
        match self.cameras.get(name) {
            None => PluginLoad::Missing,
            Some(loader) => match loader() {
                Ok(plugin) => PluginLoad::Loaded(plugin),
                Err(e) => PluginLoad::Failed(e),
            },
        }
    }

    /// Load a common plugin.
    pub fn load_common(&self, name: &str) -> PluginLoad<dyn CommonPlugin> {
        match self.commons.get(name) {
            None => PluginLoad::Missing,
            Some(loader) => match loader() {
                Ok(plugin) => PluginLoad::Loaded(plugin),
                Err(e) => PluginLoad::Failed(e),
            },
        }
    }

    /// Names of the camera plugins in the catalog.
    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.keys().map(String::as_str).collect()
    }

    /// Names of the common plugins in the catalog.
    pub fn common_names(&self) -> Vec<&str> {
        self.commons.keys().map(String::as_str).collect()
    }
}

/// Plugins loaded at server startup.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    cameras: BTreeMap<String, Arc<dyn CameraPlugin>>,
    commons: Vec<Arc<dyn CommonPlugin>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loaded camera plugin under its name.
    pub fn insert_camera(&mut self, plugin: Arc<dyn CameraPlugin>) {
        self.cameras.insert(plugin.name().to_string(), plugin);
    }

    /// Add a loaded common plugin.
    pub fn insert_common(&mut self, plugin: Arc<dyn CommonPlugin>) {
        self.commons.push(plugin);
    }

    /// Camera plugin by name.
    pub fn camera(&self, name: &str) -> Option<Arc<dyn CameraPlugin>> {
        self.cameras.get(name).cloned()
    }

    /// Loaded common plugins, in load order.
    pub fn commons(&self) -> &[Arc<dyn CommonPlugin>] {
        &self.commons
    }

    /// Names of the loaded camera plugins.
    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.keys().map(String::as_str).collect()
    }

    /// Names of the loaded common plugins.
    pub fn common_names(&self) -> Vec<&str> {
        self.commons.iter().map(|p| p.name()).collect()
    }

    /// Hand a non-owning control handle to every common plugin.
    pub fn broadcast_control_ready(&self, control: &Arc<dyn ControlObject>) {
        for plugin in &self.commons {
            tracing::debug!(plugin = plugin.name(), "Publishing control reference");
            plugin.set_control_ref(ControlRef::new(control));
        }
    }
}

/// External registry of device classes served by the process.
pub trait DeviceClassRegistry: Send + Sync {
    /// Register `binding` under its device type's name.
    fn add_class(&self, binding: &DeviceBinding) -> Result<()>;

    /// Whether a device type is registered.
    fn contains(&self, device_type: &str) -> bool;
}

/// In-process device-class registry.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: DashMap<String, DeviceBinding>,
}

impl ClassRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered device type names, sorted.
    pub fn device_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Binding registered for a device type.
    pub fn get(&self, device_type: &str) -> Option<DeviceBinding> {
        self.classes.get(device_type).map(|e| e.value().clone())
    }
}

impl DeviceClassRegistry for ClassRegistry {
    fn add_class(&self, binding: &DeviceBinding) -> Result<()> {
        if binding.device_type.is_empty() || binding.class_name.is_empty() {
            anyhow::bail!("device class binding must name both class and device type");
        }
        match self.classes.entry(binding.device_type.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => anyhow::bail!(
                "device type '{}' already registered by class '{}'",
                binding.device_type,
                existing.get().class_name
            ),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(binding.clone());
                Ok(())
            }
        }
    }

    fn contains(&self, device_type: &str) -> bool {
        self.classes.contains_key(device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl CommonPlugin for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn catalog_distinguishes_missing_and_failed_plugins() {
        let mut catalog = PluginCatalog::new();
        catalog.add_common("ok", || Ok(Arc::new(Named("ok")) as Arc<dyn CommonPlugin>));
        catalog.add_common("broken", || Err(anyhow::anyhow!("init failed")));

        assert!(matches!(catalog.load_common("ok"), PluginLoad::Loaded(_)));
        assert!(matches!(catalog.load_common("broken"), PluginLoad::Failed(_)));
        assert!(matches!(catalog.load_common("absent"), PluginLoad::Missing));
        assert_eq!(catalog.common_names(), ["broken", "ok"]);
    }

    #[test]
    fn class_registry_rejects_duplicate_device_types() {
        let registry = ClassRegistry::new();
        let binding = DeviceBinding::new("SimulatorClass", "Simulator");
        registry.add_class(&binding).unwrap();
        assert!(registry.contains("Simulator"));

        let err = registry
            .add_class(&DeviceBinding::new("OtherClass", "Simulator"))
            .unwrap_err();
        assert!(err.to_string().contains("SimulatorClass"));
        assert_eq!(registry.get("Simulator"), Some(binding));
    }

    #[test]
    fn class_registry_rejects_empty_binding() {
        let registry = ClassRegistry::new();
        assert!(registry.add_class(&DeviceBinding::new("", "X")).is_err());
        assert!(registry.device_types().is_empty());
    }
}

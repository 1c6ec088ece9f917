//! Property resolution and control-object construction.

use lima_core::control::ControlObject;
use lima_core::error::{LimaError, LimaResult};
use lima_core::plugin::{CameraPlugin, PluginRegistry};
use lima_core::property::{PropertyDatabase, PropertyTable, PropertyValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A constructed control object together with what produced it.
pub struct Resolution {
    /// Plugin that built the control object
    pub plugin: Arc<dyn CameraPlugin>,
    /// The control object; the caller becomes its only owner
    pub control: Arc<dyn ControlObject>,
    /// Properties handed to the constructor
    pub properties: PropertyTable,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("plugin", &self.plugin.name())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Turns a camera type into a live control object.
#[derive(Clone)]
pub struct PropertyResolver {
    registry: PluginRegistry,
    database: Arc<dyn PropertyDatabase>,
    server_name: String,
}

impl PropertyResolver {
    /// Resolver for the server instance `server_name` (`<exec_name>/<instance>`).
    pub fn new(
        registry: PluginRegistry,
        database: Arc<dyn PropertyDatabase>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            database,
            server_name: server_name.into(),
        }
    }

    /// Property database the resolver reads from.
    pub fn database(&self) -> &Arc<dyn PropertyDatabase> {
        &self.database
    }

    /// Class name → device name for every device of this server instance.
    pub fn class_devices(&self) -> LimaResult<BTreeMap<String, String>> {
        Ok(self
            .database
            .device_class_list(&self.server_name)?
            .into_iter()
            .map(|entry| (entry.class_name, entry.device_name))
            .collect())
    }

    /// Every persisted property of `device`, single-element lists collapsed.
    pub fn device_properties(&self, device: &str) -> LimaResult<PropertyTable> {
        let mut properties = PropertyTable::new();
        for name in self.database.device_property_list(device, "*")? {
            let values = self.database.device_property(device, &name)?;
            properties.insert(name, PropertyValue::from_list(values));
        }
        Ok(properties)
    }

    /// Load `camera_type`, gather its device's properties and construct the
    /// control object. Common plugins receive a non-owning handle on success.
    #[tracing::instrument(skip(self), fields(server = %self.server_name))]
    pub fn resolve(&self, device_name: &str, camera_type: &str) -> LimaResult<Resolution> {
        let plugin = self
            .registry
            .camera(camera_type)
            .ok_or_else(|| LimaError::PluginNotFound(camera_type.to_string()))?;

        let binding = plugin
            .device_binding()
            .map_err(|source| LimaError::ControlConstruction {
                plugin: camera_type.to_string(),
                source,
            })?;

        let properties = match binding {
            None => PropertyTable::new(),
            Some(binding) => match self.class_devices()?.get(&binding.device_type) {
                Some(specific) => {
                    tracing::debug!(device = %specific, "Reading camera device properties");
                    self.device_properties(specific)?
                }
                None => {
                    tracing::debug!(
                        device_type = %binding.device_type,
                        "No device declared for camera class, constructing with defaults"
                    );
                    PropertyTable::new()
                }
            },
        };

        let control =
            plugin
                .construct(&properties)
                .map_err(|source| LimaError::ControlConstruction {
                    plugin: camera_type.to_string(),
                    source,
                })?;
        tracing::info!(plugin = camera_type, "Control object constructed");

        self.registry.broadcast_control_ready(&control);

        Ok(Resolution {
            plugin,
            control,
            properties,
        })
    }
}

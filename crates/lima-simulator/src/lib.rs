//! `lima-simulator`
//!
//! Simulated camera plugin and a counter-monitor common plugin.
//!
//! Everything here runs without hardware, which makes the crate the default
//! camera of the server and the backbone of its integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut catalog = PluginCatalog::new();
//! lima_simulator::register_all(&mut catalog);
//! ```

pub mod camera;
pub mod monitor;

pub use camera::{SimulatorConfig, SimulatorControl, SimulatorPlugin};
pub use monitor::CounterMonitor;

use lima_core::plugin::{CameraPlugin, CommonPlugin, PluginCatalog};
use std::sync::Arc;

/// Add every plugin of this crate to `catalog`.
pub fn register_all(catalog: &mut PluginCatalog) {
    catalog.add_camera(SimulatorPlugin::NAME, || {
        Ok(Arc::new(SimulatorPlugin::new()) as Arc<dyn CameraPlugin>)
    });
    catalog.add_common(CounterMonitor::NAME, || {
        Ok(Arc::new(CounterMonitor::new()) as Arc<dyn CommonPlugin>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_camera_and_common_plugins() {
        let mut catalog = PluginCatalog::new();
        register_all(&mut catalog);
        assert_eq!(catalog.camera_names(), ["simulator"]);
        assert_eq!(catalog.common_names(), ["counter_monitor"]);
    }
}

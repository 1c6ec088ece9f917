//! `counter_monitor` common plugin.

use lima_core::control::ControlRef;
use lima_core::plugin::{CommonPlugin, DeviceBinding};
use parking_lot::RwLock;

/// Observes image counters of whichever control object is current.
///
/// Holds a [`ControlRef`] only, so it never extends the engine's lifetime.
#[derive(Debug, Default)]
pub struct CounterMonitor {
    control: RwLock<Option<ControlRef>>,
}

impl CounterMonitor {
    /// Name the plugin is selected by.
    pub const NAME: &'static str = "counter_monitor";

    /// Create the plugin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the observed engine is still alive.
    pub fn is_attached(&self) -> bool {
        self.control
            .read()
            .as_ref()
            .is_some_and(ControlRef::is_alive)
    }

    /// Last image acquired by the observed engine.
    pub fn last_image_ready(&self) -> Option<i32> {
        let control = self.control.read().as_ref()?.upgrade()?;
        match control.status() {
            Ok(status) => status.image_counters.last_image_ready,
            Err(e) => {
                tracing::warn!(error = %e, "Counter monitor could not read status");
                None
            }
        }
    }
}

impl CommonPlugin for CounterMonitor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn device_binding(&self) -> anyhow::Result<Option<DeviceBinding>> {
        Ok(Some(DeviceBinding::new("CounterMonitorClass", "CounterMonitor")))
    }

    fn set_control_ref(&self, control: ControlRef) {
        *self.control.write() = Some(control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SimulatorConfig, SimulatorControl};
    use lima_core::control::{ControlObject, ImageCounters};
    use std::sync::Arc;

    #[test]
    fn follows_engine_until_it_is_dropped() {
        let monitor = CounterMonitor::new();
        assert!(!monitor.is_attached());
        assert_eq!(monitor.last_image_ready(), None);

        let sim = Arc::new(SimulatorControl::new(SimulatorConfig::default()));
        sim.set_image_counters(ImageCounters {
            last_image_ready: Some(7),
            last_image_saved: Some(5),
        });
        let control: Arc<dyn ControlObject> = sim.clone();
        monitor.set_control_ref(ControlRef::new(&control));
        assert!(monitor.is_attached());
        assert_eq!(monitor.last_image_ready(), Some(7));

        drop(control);
        drop(sim);
        assert!(!monitor.is_attached());
        assert_eq!(monitor.last_image_ready(), None);
    }
}

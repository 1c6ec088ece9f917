//! Simulated acquisition engine and the `simulator` camera plugin.

use anyhow::{anyhow, bail, Result};
use lima_core::control::{
    AcquisitionCtrl, ControlObject, CtStatus, HwInterface, ImageCounters, SavingCtrl, ShutterCtrl,
};
use lima_core::modes::{AcqMode, ShutterMode};
use lima_core::plugin::{CameraPlugin, DeviceBinding};
use lima_core::property::PropertyTable;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Properties accepted by [`SimulatorPlugin::construct`].
const KNOWN_PROPERTIES: &[&str] = &[
    "detector_type",
    "detector_model",
    "expo_time",
    "latency_time",
    "acc_max_expo_time",
    "shutter_capability",
    "shutter_modes",
];

const DEFAULT_PROCESSING_THREADS: usize = 2;

// =============================================================================
// SimulatorConfig
// =============================================================================

/// Construction parameters of the simulated engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Reported detector type (default: "Simulator")
    pub detector_type: String,
    /// Reported detector model (default: "Generator")
    pub detector_model: String,
    /// Total exposure time per image in seconds (default: 1.0)
    pub expo_time: f64,
    /// Initial latency time in seconds (default: 0.0)
    pub latency_time: f64,
    /// Initial accumulation max exposure time, unset by default
    pub acc_max_expo_time: Option<f64>,
    /// Whether a hardware shutter is present (default: true)
    pub shutter_capability: bool,
    /// Supported shutter modes (default: all three)
    pub shutter_modes: Vec<ShutterMode>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            detector_type: "Simulator".to_string(),
            detector_model: "Generator".to_string(),
            expo_time: 1.0,
            latency_time: 0.0,
            acc_max_expo_time: None,
            shutter_capability: true,
            shutter_modes: vec![
                ShutterMode::MANUAL,
                ShutterMode::AUTO_FRAME,
                ShutterMode::AUTO_SEQUENCE,
            ],
        }
    }
}

fn parse_shutter_mode(name: &str) -> Result<ShutterMode> {
    match name.trim().to_lowercase().as_str() {
        "manual" => Ok(ShutterMode::MANUAL),
        "auto_frame" => Ok(ShutterMode::AUTO_FRAME),
        "auto_sequence" => Ok(ShutterMode::AUTO_SEQUENCE),
        other => bail!("unknown shutter mode '{other}'"),
    }
}

impl SimulatorConfig {
    /// Build from device properties, rejecting any property the simulator
    /// does not understand.
    pub fn from_properties(properties: &PropertyTable) -> Result<Self> {
        if let Some(unknown) = properties.keys().find(|k| !KNOWN_PROPERTIES.contains(k)) {
            bail!("unexpected property '{unknown}'");
        }

        let mut config = Self::default();
        if let Some(value) = properties.get_str("detector_type") {
            config.detector_type = value.to_string();
        }
        if let Some(value) = properties.get_str("detector_model") {
            config.detector_model = value.to_string();
        }
        if let Some(value) = properties.parse::<f64>("expo_time")? {
            if value <= 0.0 {
                bail!("expo_time must be positive");
            }
            config.expo_time = value;
        }
        if let Some(value) = properties.parse::<f64>("latency_time")? {
            config.latency_time = value;
        }
        config.acc_max_expo_time = properties.parse::<f64>("acc_max_expo_time")?;
        if let Some(value) = properties.parse::<bool>("shutter_capability")? {
            config.shutter_capability = value;
        }
        if let Some(value) = properties.get("shutter_modes") {
            config.shutter_modes = value
                .as_list()
                .into_iter()
                .map(parse_shutter_mode)
                .collect::<Result<_>>()?;
        }
        Ok(config)
    }
}

// =============================================================================
// Sub-objects
// =============================================================================

#[derive(Debug)]
struct AcquisitionState {
    mode: AcqMode,
    expo_time: f64,
    latency_time: Option<f64>,
    acc_max_expo_time: Option<f64>,
}

/// Simulated acquisition parameters.
#[derive(Debug)]
pub struct SimAcquisition {
    state: Mutex<AcquisitionState>,
}

impl SimAcquisition {
    fn new(config: &SimulatorConfig) -> Self {
        Self {
            state: Mutex::new(AcquisitionState {
                mode: AcqMode::SINGLE,
                expo_time: config.expo_time,
                latency_time: Some(config.latency_time),
                acc_max_expo_time: config.acc_max_expo_time,
            }),
        }
    }

    /// Frames needed to stay under the max exposure, `None` while unset.
    fn accumulation(state: &AcquisitionState) -> Option<(i32, f64)> {
        let max = state.acc_max_expo_time?;
        if max <= 0.0 {
            return None;
        }
        let nb = (state.expo_time / max).ceil().max(1.0);
        Some((nb as i32, state.expo_time / nb))
    }

    /// Install a raw mode constant without validation, as a newer engine
    /// reporting a mode this server does not know would.
    pub fn force_mode(&self, mode: AcqMode) {
        self.state.lock().mode = mode;
    }

    /// Clear the latency time, leaving it unset.
    pub fn clear_latency_time(&self) {
        self.state.lock().latency_time = None;
    }
}

impl AcquisitionCtrl for SimAcquisition {
    fn acq_mode(&self) -> Result<AcqMode> {
        Ok(self.state.lock().mode)
    }

    fn set_acq_mode(&self, mode: AcqMode) -> Result<()> {
        if ![AcqMode::SINGLE, AcqMode::ACCUMULATION, AcqMode::CONCATENATION].contains(&mode) {
            bail!("invalid acquisition mode {mode}");
        }
        tracing::debug!(mode = mode.0, "Simulator acquisition mode changed");
        self.state.lock().mode = mode;
        Ok(())
    }

    fn acc_max_expo_time(&self) -> Result<Option<f64>> {
        Ok(self.state.lock().acc_max_expo_time)
    }

    fn set_acc_max_expo_time(&self, seconds: f64) -> Result<()> {
        if seconds <= 0.0 {
            bail!("accumulation max exposure time must be positive, got {seconds}");
        }
        self.state.lock().acc_max_expo_time = Some(seconds);
        Ok(())
    }

    fn acc_expo_time(&self) -> Result<Option<f64>> {
        Ok(Self::accumulation(&self.state.lock()).map(|(_, expo)| expo))
    }

    fn acc_nb_frames(&self) -> Result<Option<i32>> {
        Ok(Self::accumulation(&self.state.lock()).map(|(nb, _)| nb))
    }

    fn latency_time(&self) -> Result<Option<f64>> {
        Ok(self.state.lock().latency_time)
    }

    fn set_latency_time(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 {
            bail!("latency time cannot be negative, got {seconds}");
        }
        self.state.lock().latency_time = Some(seconds);
        Ok(())
    }
}

#[derive(Debug)]
struct ShutterState {
    mode: ShutterMode,
    open: bool,
    open_time: Option<f64>,
    close_time: Option<f64>,
}

/// Simulated shutter.
#[derive(Debug)]
pub struct SimShutter {
    capability: bool,
    modes: Vec<ShutterMode>,
    state: Mutex<ShutterState>,
}

impl SimShutter {
    fn new(config: &SimulatorConfig) -> Self {
        let mode = config
            .shutter_modes
            .iter()
            .copied()
            .find(|m| *m != ShutterMode::MANUAL)
            .or_else(|| config.shutter_modes.first().copied())
            .unwrap_or(ShutterMode::AUTO_FRAME);
        Self {
            capability: config.shutter_capability,
            modes: config.shutter_modes.clone(),
            state: Mutex::new(ShutterState {
                mode,
                open: false,
                open_time: Some(0.0),
                close_time: Some(0.0),
            }),
        }
    }

    /// Install a raw mode constant without validation.
    pub fn force_mode(&self, mode: ShutterMode) {
        self.state.lock().mode = mode;
    }

    /// Clear the open and close times, leaving both unset.
    pub fn clear_timings(&self) {
        let mut state = self.state.lock();
        state.open_time = None;
        state.close_time = None;
    }
}

impl ShutterCtrl for SimShutter {
    fn has_capability(&self) -> bool {
        self.capability
    }

    fn mode_list(&self) -> Result<Vec<ShutterMode>> {
        Ok(self.modes.clone())
    }

    fn mode(&self) -> Result<ShutterMode> {
        Ok(self.state.lock().mode)
    }

    fn set_mode(&self, mode: ShutterMode) -> Result<()> {
        if !self.modes.contains(&mode) {
            bail!("shutter mode {mode} not supported by this camera");
        }
        if mode == ShutterMode::MANUAL && !self.capability {
            bail!("manual shutter mode requires a hardware shutter");
        }
        let mut state = self.state.lock();
        state.mode = mode;
        if mode != ShutterMode::MANUAL {
            state.open = false;
        }
        Ok(())
    }

    fn state(&self) -> Result<bool> {
        Ok(self.state.lock().open)
    }

    fn set_state(&self, open: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.mode != ShutterMode::MANUAL {
            bail!("shutter state can only be driven in manual mode");
        }
        state.open = open;
        tracing::debug!(open, "Simulator shutter state changed");
        Ok(())
    }

    fn open_time(&self) -> Result<Option<f64>> {
        Ok(self.state.lock().open_time)
    }

    fn set_open_time(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 {
            bail!("shutter open time cannot be negative");
        }
        self.state.lock().open_time = Some(seconds);
        Ok(())
    }

    fn close_time(&self) -> Result<Option<f64>> {
        Ok(self.state.lock().close_time)
    }

    fn set_close_time(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 {
            bail!("shutter close time cannot be negative");
        }
        self.state.lock().close_time = Some(seconds);
        Ok(())
    }
}

/// Simulated saving statistics.
#[derive(Debug, Default)]
pub struct SimSaving {
    write_times: Mutex<Vec<f64>>,
}

impl SimSaving {
    /// Record the write duration of one saved image.
    pub fn record_write_time(&self, seconds: f64) {
        self.write_times.lock().push(seconds);
    }
}

impl SavingCtrl for SimSaving {
    fn write_time_statistic(&self) -> Result<Vec<f64>> {
        Ok(self.write_times.lock().clone())
    }
}

#[derive(Debug)]
struct SimInterface {
    detector_type: String,
    detector_model: String,
}

impl HwInterface for SimInterface {
    fn detector_type(&self) -> Result<String> {
        Ok(self.detector_type.clone())
    }

    fn detector_model(&self) -> Result<String> {
        Ok(self.detector_model.clone())
    }
}

// =============================================================================
// SimulatorControl
// =============================================================================

/// In-memory acquisition engine.
///
/// Nothing is actually acquired; the engine keeps parameters and counters so
/// every attribute of the device can be exercised without hardware. Test code
/// drives the counters and statistics through the `pub` helpers.
#[derive(Debug)]
pub struct SimulatorControl {
    acquisition: SimAcquisition,
    shutter: SimShutter,
    saving: SimSaving,
    interface: SimInterface,
    counters: Mutex<ImageCounters>,
    processing_threads: AtomicUsize,
}

impl SimulatorControl {
    /// Create an engine from its configuration.
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            acquisition: SimAcquisition::new(&config),
            shutter: SimShutter::new(&config),
            saving: SimSaving::default(),
            interface: SimInterface {
                detector_type: config.detector_type,
                detector_model: config.detector_model,
            },
            counters: Mutex::new(ImageCounters::default()),
            processing_threads: AtomicUsize::new(DEFAULT_PROCESSING_THREADS),
        }
    }

    /// Concrete acquisition sub-object.
    pub fn sim_acquisition(&self) -> &SimAcquisition {
        &self.acquisition
    }

    /// Concrete shutter sub-object.
    pub fn sim_shutter(&self) -> &SimShutter {
        &self.shutter
    }

    /// Concrete saving sub-object.
    pub fn sim_saving(&self) -> &SimSaving {
        &self.saving
    }

    /// Simulate progress of an acquisition.
    pub fn set_image_counters(&self, counters: ImageCounters) {
        *self.counters.lock() = counters;
    }

    /// Current size of the processing pool.
    pub fn processing_threads(&self) -> usize {
        self.processing_threads.load(Ordering::SeqCst)
    }
}

impl ControlObject for SimulatorControl {
    fn acquisition(&self) -> &dyn AcquisitionCtrl {
        &self.acquisition
    }

    fn shutter(&self) -> &dyn ShutterCtrl {
        &self.shutter
    }

    fn saving(&self) -> &dyn SavingCtrl {
        &self.saving
    }

    fn interface(&self) -> &dyn HwInterface {
        &self.interface
    }

    fn status(&self) -> Result<CtStatus> {
        Ok(CtStatus {
            image_counters: *self.counters.lock(),
        })
    }

    fn set_processing_threads(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(anyhow!("processing pool needs at least one thread"));
        }
        self.processing_threads.store(count, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// SimulatorPlugin
// =============================================================================

/// The `simulator` camera plugin.
#[derive(Debug, Default)]
pub struct SimulatorPlugin {
    last_control: Mutex<Weak<SimulatorControl>>,
    closed: AtomicBool,
}

impl SimulatorPlugin {
    /// Name the plugin is selected by.
    pub const NAME: &'static str = "simulator";

    /// Create the plugin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete engine built by the last `construct` call.
    pub fn last_control(&self) -> Option<Arc<SimulatorControl>> {
        self.last_control.lock().upgrade()
    }

    /// Whether `close_interface` has been called since the last construction.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CameraPlugin for SimulatorPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn device_binding(&self) -> Result<Option<DeviceBinding>> {
        Ok(Some(DeviceBinding::new("SimulatorClass", "Simulator")))
    }

    fn construct(&self, properties: &PropertyTable) -> Result<Arc<dyn ControlObject>> {
        let config = SimulatorConfig::from_properties(properties)?;
        tracing::info!(
            model = %config.detector_model,
            shutter = config.shutter_capability,
            "Constructing simulator control object"
        );
        let control = Arc::new(SimulatorControl::new(config));
        *self.last_control.lock() = Arc::downgrade(&control);
        self.closed.store(false, Ordering::SeqCst);
        Ok(control)
    }

    fn close_interface(&self) -> Result<()> {
        *self.last_control.lock() = Weak::new();
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Simulator interface closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lima_core::property::PropertyValue;

    #[test]
    fn default_config_when_no_properties() {
        let config = SimulatorConfig::from_properties(&PropertyTable::new()).unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }

    #[test]
    fn unknown_property_is_an_argument_mismatch() {
        let props = PropertyTable::new().with("frame_rate", "30");
        let err = SimulatorConfig::from_properties(&props).unwrap_err();
        assert!(err.to_string().contains("frame_rate"));
    }

    #[test]
    fn shutter_modes_accept_scalar_and_list() {
        let props = PropertyTable::new().with("shutter_modes", "auto_sequence");
        let config = SimulatorConfig::from_properties(&props).unwrap();
        assert_eq!(config.shutter_modes, [ShutterMode::AUTO_SEQUENCE]);

        let mut props = PropertyTable::new();
        props.insert(
            "shutter_modes",
            PropertyValue::List(vec!["manual".into(), "auto_frame".into()]),
        );
        let config = SimulatorConfig::from_properties(&props).unwrap();
        assert_eq!(
            config.shutter_modes,
            [ShutterMode::MANUAL, ShutterMode::AUTO_FRAME]
        );
    }

    #[test]
    fn accumulation_follows_max_exposure() {
        let control = SimulatorControl::new(SimulatorConfig {
            expo_time: 1.0,
            ..Default::default()
        });
        let acq = control.acquisition();
        assert_eq!(acq.acc_nb_frames().unwrap(), None);
        assert_eq!(acq.acc_expo_time().unwrap(), None);

        acq.set_acc_max_expo_time(0.3).unwrap();
        assert_eq!(acq.acc_nb_frames().unwrap(), Some(4));
        assert_eq!(acq.acc_expo_time().unwrap(), Some(0.25));
    }

    #[test]
    fn manual_state_requires_manual_mode() {
        let control = SimulatorControl::new(SimulatorConfig::default());
        let shutter = control.shutter();
        assert_eq!(shutter.mode().unwrap(), ShutterMode::AUTO_FRAME);
        assert!(shutter.set_state(true).is_err());

        shutter.set_mode(ShutterMode::MANUAL).unwrap();
        shutter.set_state(true).unwrap();
        assert!(shutter.state().unwrap());

        shutter.set_mode(ShutterMode::AUTO_SEQUENCE).unwrap();
        assert!(!shutter.state().unwrap());
    }

    #[test]
    fn plugin_tracks_construction_and_close() {
        let plugin = SimulatorPlugin::new();
        let control = plugin.construct(&PropertyTable::new()).unwrap();
        assert!(plugin.last_control().is_some());
        control.set_processing_threads(4).unwrap();
        assert_eq!(plugin.last_control().unwrap().processing_threads(), 4);

        plugin.close_interface().unwrap();
        assert!(plugin.is_closed());
        assert!(plugin.last_control().is_none());
    }
}

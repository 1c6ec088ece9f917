//! The `LimaCCDs` device: acquisition control exposed as attributes and
//! commands.
//!
//! # State machine
//!
//! ```text
//!   init() ──► ON ──(camera plugin missing / construction failed)──► FAULT
//!    ▲                                                                 │
//!    └──────────────────────────── init() ─────────────────────────────┘
//! ```
//!
//! The device owns the control object; common plugins only ever see a
//! [`ControlRef`](lima_core::ControlRef). Numeric reads map an unset engine
//! value to `-1`.

use crate::resolver::PropertyResolver;
use lima_core::control::{ControlObject, ShutterCtrl};
use lima_core::debug::{DebugFlags, DebugSettings};
use lima_core::error::{LimaError, LimaResult};
use lima_core::modes::{ShutterMode, ACQ_MODE_TABLE, NOT_SUPPORTED, SHUTTER_MODE_TABLE};
use lima_core::plugin::CameraPlugin;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Primary camera-type property.
pub const PROP_CAMERA_TYPE: &str = "LimaCameraType";
/// Accepted alias of [`PROP_CAMERA_TYPE`].
pub const PROP_CAMERA_TYPE_ALIAS: &str = "CameraType";
/// Size of the image-processing pool.
pub const PROP_PROCESSING_THREADS: &str = "NbProcessingThread";
/// Value used when `NbProcessingThread` is not set.
pub const DEFAULT_PROCESSING_THREADS: &str = "2";

/// Capacity of the `write_statistic` spectrum.
pub const WRITE_STATISTIC_CAPACITY: usize = 256;

const UNSET_F64: f64 = -1.0;
const UNSET_I32: i32 = -1;

/// Device state as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DevState {
    /// Control object available
    On,
    /// Initialisation failed; only `init` recovers
    Fault,
}

impl fmt::Display for DevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("ON"),
            Self::Fault => f.write_str("FAULT"),
        }
    }
}

/// Manual shutter state reported by `shutter_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualShutterState {
    /// Shutter open
    Open,
    /// Shutter closed
    Closed,
    /// The camera cannot drive its shutter manually
    NoManualMode,
}

impl ManualShutterState {
    /// Wire symbol.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::NoManualMode => "NO_MANUAL_MODE",
        }
    }
}

/// Device façade over one control object.
pub struct LimaCcds {
    name: String,
    resolver: PropertyResolver,
    debug: DebugSettings,
    state: DevState,
    status: String,
    camera_type: Option<String>,
    camera: Option<Arc<dyn CameraPlugin>>,
    control: Option<Arc<dyn ControlObject>>,
}

impl fmt::Debug for LimaCcds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimaCcds")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("status", &self.status)
            .field("camera_type", &self.camera_type)
            .field("has_control", &self.control.is_some())
            .finish()
    }
}

impl LimaCcds {
    /// Uninitialised device. Call [`init`](Self::init) before use.
    pub fn new(name: impl Into<String>, resolver: PropertyResolver, debug: DebugSettings) -> Self {
        Self {
            name: name.into(),
            resolver,
            debug,
            state: DevState::On,
            status: "Device not initialised".to_string(),
            camera_type: None,
            camera: None,
            control: None,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> DevState {
        self.state
    }

    /// Human-readable status.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Owning handle on the control object, for the server and tests.
    pub fn control_object(&self) -> Option<&Arc<dyn ControlObject>> {
        self.control.as_ref()
    }

    fn set_fault(&mut self, status: String) {
        tracing::error!(device = %self.name, %status, "Device entering FAULT");
        self.state = DevState::Fault;
        self.status = status;
    }

    fn read_property(&self, name: &str) -> LimaResult<Option<String>> {
        Ok(self
            .resolver
            .database()
            .device_property(&self.name, name)?
            .into_iter()
            .next()
            .filter(|value| !value.trim().is_empty()))
    }

    /// (Re)initialise the device.
    ///
    /// Never fails: a missing plugin or a rejected construction leaves the
    /// device in [`DevState::Fault`] with the reason in its status.
    #[instrument(skip(self), fields(device = %self.name))]
    pub fn init(&mut self) {
        if self.control.is_some() {
            self.delete();
        }
        self.state = DevState::On;
        self.status = "Device is ON".to_string();
        self.camera_type = None;

        let camera_type = match self.read_property(PROP_CAMERA_TYPE).and_then(|v| match v {
            Some(v) => Ok(Some(v)),
            None => self.read_property(PROP_CAMERA_TYPE_ALIAS),
        }) {
            Ok(Some(camera_type)) => camera_type,
            Ok(None) => return self.set_fault(LimaError::MissingCameraType.to_string()),
            Err(e) => return self.set_fault(e.to_string()),
        };
        self.camera_type = Some(camera_type.clone());

        let nb_threads = match self.read_property(PROP_PROCESSING_THREADS) {
            Ok(value) => value.unwrap_or_else(|| DEFAULT_PROCESSING_THREADS.to_string()),
            Err(e) => return self.set_fault(e.to_string()),
        };

        match self.resolver.resolve(&self.name, &camera_type) {
            Ok(resolution) => {
                self.camera = Some(resolution.plugin);
                self.control = Some(resolution.control);
            }
            Err(e) if e.is_fatal_init() => {
                return self.set_fault(format!("Camera initialisation failed: {e}"))
            }
            Err(e) => return self.set_fault(format!("Property resolution failed: {e}")),
        }

        match nb_threads.trim().parse::<usize>() {
            Ok(count) => {
                if let Some(control) = &self.control {
                    if let Err(e) = control.set_processing_threads(count) {
                        tracing::warn!(count, error = %e, "Processing pool rejected thread count");
                    }
                }
            }
            Err(e) => tracing::debug!(
                value = %nb_threads,
                error = %e,
                "Ignoring invalid NbProcessingThread"
            ),
        }

        tracing::info!(camera_type = %camera_type, "Device initialised");
    }

    /// Release the camera interface and drop the control object.
    #[instrument(skip(self), fields(device = %self.name))]
    pub fn delete(&mut self) {
        if let Some(camera) = self.camera.take() {
            if let Err(e) = camera.close_interface() {
                tracing::warn!(plugin = camera.name(), error = ?e, "Closing camera interface failed");
            }
        }
        if self.control.take().is_some() {
            tracing::info!("Control object released");
        }
    }

    fn control(&self) -> LimaResult<&Arc<dyn ControlObject>> {
        self.control
            .as_ref()
            .ok_or_else(|| LimaError::NotInitialized(self.status.clone()))
    }

    /// Shutter sub-object when manual control is possible.
    fn manual_shutter(&self) -> LimaResult<Option<&dyn ShutterCtrl>> {
        let shutter = self.control()?.shutter();
        if shutter.has_capability() && shutter.mode_list()?.contains(&ShutterMode::MANUAL) {
            Ok(Some(shutter))
        } else {
            Ok(None)
        }
    }

    // ---------------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------------

    /// Configured camera type.
    pub fn read_lima_type(&self) -> LimaResult<String> {
        self.camera_type.clone().ok_or(LimaError::MissingCameraType)
    }

    /// Detector type reported by the hardware.
    pub fn read_camera_type(&self) -> LimaResult<String> {
        Ok(self.control()?.interface().detector_type()?)
    }

    /// Detector model reported by the hardware.
    pub fn read_camera_model(&self) -> LimaResult<String> {
        Ok(self.control()?.interface().detector_model()?)
    }

    // ---------------------------------------------------------------------
    // Acquisition
    // ---------------------------------------------------------------------

    /// Maximum exposure of one accumulated frame, `-1` when unset.
    pub fn read_acc_max_expotime(&self) -> LimaResult<f64> {
        Ok(self
            .control()?
            .acquisition()
            .acc_max_expo_time()?
            .unwrap_or(UNSET_F64))
    }

    /// Set the maximum exposure of one accumulated frame.
    pub fn write_acc_max_expotime(&self, seconds: f64) -> LimaResult<()> {
        Ok(self.control()?.acquisition().set_acc_max_expo_time(seconds)?)
    }

    /// Exposure of each accumulated frame.
    pub fn read_acc_expotime(&self) -> LimaResult<f64> {
        Ok(self
            .control()?
            .acquisition()
            .acc_expo_time()?
            .unwrap_or(UNSET_F64))
    }

    /// Number of frames accumulated into one image.
    pub fn read_acc_nb_frames(&self) -> LimaResult<i32> {
        Ok(self
            .control()?
            .acquisition()
            .acc_nb_frames()?
            .unwrap_or(UNSET_I32))
    }

    /// Acquisition mode symbol, `NOT_SUPPORTED` for a mode this server does
    /// not know.
    pub fn read_acq_mode(&self) -> LimaResult<&'static str> {
        let mode = self.control()?.acquisition().acq_mode()?;
        Ok(ACQ_MODE_TABLE.symbol_of(mode).unwrap_or(NOT_SUPPORTED))
    }

    /// Select the acquisition mode by symbol, case-insensitive.
    #[instrument(skip(self))]
    pub fn write_acq_mode(&self, symbol: &str) -> LimaResult<()> {
        let mode = ACQ_MODE_TABLE
            .value_of(symbol)
            .ok_or_else(|| LimaError::InvalidArgument {
                attribute: "acq_mode",
                value: symbol.to_uppercase(),
            })?;
        Ok(self.control()?.acquisition().set_acq_mode(mode)?)
    }

    /// Dead time between frames, `-1` when unset.
    pub fn read_latency_time(&self) -> LimaResult<f64> {
        Ok(self
            .control()?
            .acquisition()
            .latency_time()?
            .unwrap_or(UNSET_F64))
    }

    /// Set the dead time between frames.
    pub fn write_latency_time(&self, seconds: f64) -> LimaResult<()> {
        Ok(self.control()?.acquisition().set_latency_time(seconds)?)
    }

    // ---------------------------------------------------------------------
    // Status and saving
    // ---------------------------------------------------------------------

    /// Index of the last acquired image.
    pub fn read_last_image_ready(&self) -> LimaResult<i32> {
        let status = self.control()?.status()?;
        Ok(status.image_counters.last_image_ready.unwrap_or(UNSET_I32))
    }

    /// Index of the last saved image.
    pub fn read_last_image_saved(&self) -> LimaResult<i32> {
        let status = self.control()?.status()?;
        Ok(status.image_counters.last_image_saved.unwrap_or(UNSET_I32))
    }

    /// Recent write durations, at most 256. A single `-1` when none were
    /// recorded yet.
    pub fn read_write_statistic(&self) -> LimaResult<Vec<f64>> {
        let mut stat = self.control()?.saving().write_time_statistic()?;
        if stat.is_empty() {
            return Ok(vec![UNSET_F64]);
        }
        stat.truncate(WRITE_STATISTIC_CAPACITY);
        Ok(stat)
    }

    // ---------------------------------------------------------------------
    // Shutter
    // ---------------------------------------------------------------------

    /// Shutter mode symbol, `NOT_SUPPORTED` for an unknown engine mode.
    pub fn read_shutter_mode(&self) -> LimaResult<&'static str> {
        let mode = self.control()?.shutter().mode()?;
        Ok(SHUTTER_MODE_TABLE.symbol_of(mode).unwrap_or(NOT_SUPPORTED))
    }

    /// Select the shutter mode by symbol. `MANUAL` requires a hardware
    /// shutter.
    #[instrument(skip(self))]
    pub fn write_shutter_mode(&self, symbol: &str) -> LimaResult<()> {
        let mode = SHUTTER_MODE_TABLE
            .value_of(symbol)
            .ok_or_else(|| LimaError::InvalidArgument {
                attribute: "shutter_mode",
                value: symbol.to_uppercase(),
            })?;
        let shutter = self.control()?.shutter();
        if mode == ShutterMode::MANUAL && !shutter.has_capability() {
            return Err(LimaError::ShutterCapabilityMissing);
        }
        Ok(shutter.set_mode(mode)?)
    }

    /// Manual shutter state, `NoManualMode` without manual capability.
    pub fn read_shutter_manual_state(&self) -> LimaResult<ManualShutterState> {
        Ok(match self.manual_shutter()? {
            Some(shutter) if shutter.state()? => ManualShutterState::Open,
            Some(_) => ManualShutterState::Closed,
            None => ManualShutterState::NoManualMode,
        })
    }

    /// Shutter opening delay, `-1` when unset.
    pub fn read_shutter_open_time(&self) -> LimaResult<f64> {
        Ok(self
            .control()?
            .shutter()
            .open_time()?
            .unwrap_or(UNSET_F64))
    }

    /// Set the shutter opening delay.
    pub fn write_shutter_open_time(&self, seconds: f64) -> LimaResult<()> {
        Ok(self.control()?.shutter().set_open_time(seconds)?)
    }

    /// Shutter closing delay, `-1` when unset.
    pub fn read_shutter_close_time(&self) -> LimaResult<f64> {
        Ok(self
            .control()?
            .shutter()
            .close_time()?
            .unwrap_or(UNSET_F64))
    }

    /// Set the shutter closing delay.
    pub fn write_shutter_close_time(&self, seconds: f64) -> LimaResult<()> {
        Ok(self.control()?.shutter().set_close_time(seconds)?)
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    fn trace_flag_names(&self) {
        let params = self.debug.params();
        tracing::trace!(flags = ?params.format_flag_names(), "FormatFlags");
        tracing::trace!(flags = ?params.type_flag_names(), "TypeFlags");
        tracing::trace!(flags = ?params.module_flag_names(), "ModuleFlags");
    }

    /// Packed debug flags: type in bits 23..16, module in bits 15..0.
    #[instrument(skip(self))]
    pub fn get_debug_flags(&self) -> u32 {
        self.trace_flag_names();
        let flags = self.debug.flags().encode();
        tracing::debug!("Getting debug flags: 0x{flags:08x}");
        flags
    }

    /// Replace type and module debug flags. Bits 31..24 are ignored.
    #[instrument(skip(self))]
    pub fn set_debug_flags(&self, flags: u32) {
        tracing::debug!("Setting debug flags: 0x{flags:08x}");
        self.debug.set_flags(DebugFlags::decode(flags));
        self.trace_flag_names();
    }

    /// Open the shutter. Ignored when manual control is unavailable.
    #[instrument(skip(self))]
    pub fn open_shutter_manual(&self) -> LimaResult<()> {
        match self.manual_shutter()? {
            Some(shutter) => Ok(shutter.set_state(true)?),
            None => {
                tracing::debug!("No manual shutter, open ignored");
                Ok(())
            }
        }
    }

    /// Close the shutter. Ignored when manual control is unavailable.
    #[instrument(skip(self))]
    pub fn close_shutter_manual(&self) -> LimaResult<()> {
        match self.manual_shutter()? {
            Some(shutter) => Ok(shutter.set_state(false)?),
            None => {
                tracing::debug!("No manual shutter, close ignored");
                Ok(())
            }
        }
    }

    /// Symbols accepted by an enumerated attribute, in table order.
    ///
    /// Empty for attributes that are not enumerations.
    #[instrument(skip(self))]
    pub fn get_attr_string_value_list(&self, attribute: &str) -> LimaResult<Vec<String>> {
        let symbols = match attribute {
            "acq_mode" => ACQ_MODE_TABLE.symbols().collect(),
            "shutter_mode" => {
                let supported = self.control()?.shutter().mode_list()?;
                SHUTTER_MODE_TABLE.symbols_in(&supported)
            }
            _ => Vec::new(),
        };
        Ok(symbols.into_iter().map(str::to_string).collect())
    }
}

impl Drop for LimaCcds {
    fn drop(&mut self) {
        self.delete();
    }
}

//! Acquisition Control Object
//!
//! The acquisition engine is an opaque control object built by a camera
//! plugin. The device façade only ever talks to it through the sub-object
//! traits below, one per concern:
//!
//! - [`AcquisitionCtrl`] - acquisition mode, accumulation and latency timing
//! - [`ShutterCtrl`] - shutter capability, mode and manual state
//! - [`SavingCtrl`] - saving statistics
//! - [`HwInterface`] - detector identity
//! - [`ControlObject::status`] - image counters
//!
//! Methods return `anyhow::Result` so each engine reports failures in its own
//! terms. Numeric getters return `Option` where the engine can leave a value
//! unset; the façade turns `None` into the `-1` sentinel.
//!
//! # Ownership
//!
//! The façade holds the only strong reference ([`Arc`]) for the device's
//! lifetime. Secondary plugins receive a [`ControlRef`] which never keeps the
//! engine alive.

use crate::modes::{AcqMode, ShutterMode};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Acquisition parameters.
pub trait AcquisitionCtrl: Send + Sync {
    /// Current acquisition mode constant
    fn acq_mode(&self) -> Result<AcqMode>;

    /// Select the acquisition mode
    fn set_acq_mode(&self, mode: AcqMode) -> Result<()>;

    /// Maximum exposure time of one accumulated frame, in seconds
    fn acc_max_expo_time(&self) -> Result<Option<f64>>;

    /// Set the maximum exposure time of one accumulated frame
    fn set_acc_max_expo_time(&self, seconds: f64) -> Result<()>;

    /// Exposure time of one accumulated frame, as computed by the engine
    fn acc_expo_time(&self) -> Result<Option<f64>>;

    /// Number of accumulated frames per image, as computed by the engine
    fn acc_nb_frames(&self) -> Result<Option<i32>>;

    /// Latency between two frames, in seconds
    fn latency_time(&self) -> Result<Option<f64>>;

    /// Set the latency between two frames
    fn set_latency_time(&self, seconds: f64) -> Result<()>;
}

/// Shutter control.
///
/// # Contract
/// - `has_capability()` reports whether a hardware shutter exists at all
/// - `mode_list()` reports the subset of modes this camera supports
/// - `state()` is only meaningful in manual mode
pub trait ShutterCtrl: Send + Sync {
    /// Whether the camera drives a hardware shutter
    fn has_capability(&self) -> bool;

    /// Modes supported by the camera
    fn mode_list(&self) -> Result<Vec<ShutterMode>>;

    /// Current mode constant
    fn mode(&self) -> Result<ShutterMode>;

    /// Select the shutter mode
    fn set_mode(&self, mode: ShutterMode) -> Result<()>;

    /// `true` when the shutter is open
    fn state(&self) -> Result<bool>;

    /// Open (`true`) or close (`false`) the shutter in manual mode
    fn set_state(&self, open: bool) -> Result<()>;

    /// Delay for the shutter to open, in seconds
    fn open_time(&self) -> Result<Option<f64>>;

    /// Set the opening delay
    fn set_open_time(&self, seconds: f64) -> Result<()>;

    /// Delay for the shutter to close, in seconds
    fn close_time(&self) -> Result<Option<f64>>;

    /// Set the closing delay
    fn set_close_time(&self, seconds: f64) -> Result<()>;
}

/// Image saving.
pub trait SavingCtrl: Send + Sync {
    /// Write durations of the most recent saved images, in seconds
    fn write_time_statistic(&self) -> Result<Vec<f64>>;
}

/// Detector identity as reported by the hardware layer.
pub trait HwInterface: Send + Sync {
    /// Detector type, e.g. the manufacturer's family name
    fn detector_type(&self) -> Result<String>;

    /// Detector model
    fn detector_model(&self) -> Result<String>;
}

/// Image counters of the running acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCounters {
    /// Index of the last image fully acquired
    pub last_image_ready: Option<i32>,
    /// Index of the last image written to disk
    pub last_image_saved: Option<i32>,
}

/// Engine status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtStatus {
    /// Image counters at the time of the snapshot
    pub image_counters: ImageCounters,
}

/// The acquisition engine handle.
pub trait ControlObject: Send + Sync {
    /// Acquisition sub-object
    fn acquisition(&self) -> &dyn AcquisitionCtrl;

    /// Shutter sub-object
    fn shutter(&self) -> &dyn ShutterCtrl;

    /// Saving sub-object
    fn saving(&self) -> &dyn SavingCtrl;

    /// Hardware interface sub-object
    fn interface(&self) -> &dyn HwInterface;

    /// Current status
    fn status(&self) -> Result<CtStatus>;

    /// Size of the image-processing worker pool
    fn set_processing_threads(&self, count: usize) -> Result<()>;
}

/// Non-owning handle on a control object, handed to secondary plugins.
///
/// The handle observes; it must not be used to mutate the engine concurrently
/// with the façade, and it stops resolving once the device drops the engine.
#[derive(Clone)]
pub struct ControlRef {
    inner: Weak<dyn ControlObject>,
}

impl ControlRef {
    /// Downgrade an owning reference.
    pub fn new(control: &Arc<dyn ControlObject>) -> Self {
        Self {
            inner: Arc::downgrade(control),
        }
    }

    /// Temporary access to the engine, `None` once the owner dropped it.
    pub fn upgrade(&self) -> Option<Arc<dyn ControlObject>> {
        self.inner.upgrade()
    }

    /// Whether the engine is still alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for ControlRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}

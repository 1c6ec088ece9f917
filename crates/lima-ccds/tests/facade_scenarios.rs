use std::io::Write;
use std::sync::Arc;

use lima_ccds::{AttrValue, DevState, LimaCcds, LimaServer, ServerConfig};
use lima_core::control::ImageCounters;
use lima_core::error::LimaError;
use lima_core::modes::{AcqMode, ShutterMode, ACQ_MODE_TABLE, NOT_SUPPORTED};
use lima_core::plugin::{CameraPlugin, CommonPlugin, DeviceClassRegistry, PluginCatalog};
use lima_core::property::{DeviceRecord, PropertyTable, PropertyValue};
use lima_simulator::{CounterMonitor, SimulatorControl, SimulatorPlugin};

const FACADE: &str = "id00/limaccds/test";
const CAMERA: &str = "id00/simulator/test";

/// Server whose plugins stay reachable from the test.
struct Harness {
    server: LimaServer,
    camera: Arc<SimulatorPlugin>,
    monitor: Arc<CounterMonitor>,
}

impl Harness {
    fn new(facade: PropertyTable, camera: Option<PropertyTable>) -> Self {
        let mut config = ServerConfig::default();
        config.devices.push(DeviceRecord {
            name: FACADE.into(),
            class: "LimaCCDs".into(),
            properties: facade,
        });
        if let Some(properties) = camera {
            config.devices.push(DeviceRecord {
                name: CAMERA.into(),
                class: "Simulator".into(),
                properties,
            });
        }

        let camera = Arc::new(SimulatorPlugin::new());
        let monitor = Arc::new(CounterMonitor::new());
        let mut catalog = PluginCatalog::new();
        let plugin = camera.clone();
        catalog.add_camera("simulator", move || {
            Ok(plugin.clone() as Arc<dyn CameraPlugin>)
        });
        let common = monitor.clone();
        catalog.add_common("counter_monitor", move || {
            Ok(common.clone() as Arc<dyn CommonPlugin>)
        });

        Self {
            server: LimaServer::with_catalog(config, &catalog),
            camera,
            monitor,
        }
    }

    fn simulator(threads: &str) -> Self {
        Self::new(
            PropertyTable::new()
                .with("LimaCameraType", "simulator")
                .with("NbProcessingThread", threads),
            None,
        )
    }

    fn device(&self) -> LimaCcds {
        self.server.facade().unwrap()
    }

    fn engine(&self) -> Arc<SimulatorControl> {
        self.camera.last_control().unwrap()
    }
}

#[test]
fn simulator_camera_initialises_on() {
    let harness = Harness::simulator("4");
    let device = harness.device();

    assert_eq!(device.state(), DevState::On);
    assert_eq!(device.read_lima_type().unwrap(), "simulator");
    assert_eq!(device.read_camera_type().unwrap(), "Simulator");
    assert_eq!(harness.engine().processing_threads(), 4);
}

#[test]
fn unknown_camera_type_faults_without_crashing() {
    let harness = Harness::new(
        PropertyTable::new().with("LimaCameraType", "nonexistent_plugin"),
        None,
    );
    let device = harness.device();

    assert_eq!(device.state(), DevState::Fault);
    assert!(device.status().contains("nonexistent_plugin"));
    assert!(matches!(
        device.read_acq_mode(),
        Err(LimaError::NotInitialized(_))
    ));
}

#[test]
fn rejected_camera_properties_fault() {
    let harness = Harness::new(
        PropertyTable::new().with("LimaCameraType", "simulator"),
        Some(PropertyTable::new().with("pixel_clock", "fast")),
    );
    let device = harness.device();

    assert_eq!(device.state(), DevState::Fault);
    assert!(device.status().contains("pixel_clock"));
}

#[test]
fn debug_flags_round_trip_through_the_shared_settings() {
    let harness = Harness::simulator("2");
    let device = harness.device();

    device.set_debug_flags(0x00FF_1234);
    assert_eq!(device.get_debug_flags(), 0x00FF_1234);

    let flags = harness.server.debug_settings().flags();
    assert_eq!(flags.type_flags, 0xFF);
    assert_eq!(flags.module_flags, 0x1234);

    device
        .command_inout("setDebugFlags", AttrValue::ULong(0xAB00_0001))
        .unwrap();
    assert_eq!(
        device
            .command_inout("getDebugFlags", AttrValue::Void)
            .unwrap(),
        AttrValue::ULong(0x0000_0001)
    );
}

#[test]
fn every_acq_mode_symbol_round_trips() {
    let device = Harness::simulator("2").device();
    for symbol in ACQ_MODE_TABLE.symbols() {
        device.write_acq_mode(&symbol.to_lowercase()).unwrap();
        assert_eq!(device.read_acq_mode().unwrap(), symbol);
    }
}

#[test]
fn bogus_acq_mode_leaves_engine_untouched() {
    let harness = Harness::simulator("2");
    let device = harness.device();
    device.write_acq_mode("ACCUMULATION").unwrap();

    let err = device.write_acq_mode("bogus").unwrap_err();
    assert!(matches!(
        err,
        LimaError::InvalidArgument { attribute: "acq_mode", ref value } if value == "BOGUS"
    ));
    assert_eq!(device.read_acq_mode().unwrap(), "ACCUMULATION");
}

#[test]
fn unknown_engine_modes_read_as_not_supported() {
    let harness = Harness::simulator("2");
    let device = harness.device();
    let engine = harness.engine();

    engine.sim_shutter().force_mode(ShutterMode(42));
    engine.sim_acquisition().force_mode(AcqMode(7));

    assert_eq!(device.read_shutter_mode().unwrap(), NOT_SUPPORTED);
    assert_eq!(device.read_acq_mode().unwrap(), NOT_SUPPORTED);
}

#[test]
fn authorized_values_follow_table_order() {
    let mut camera = PropertyTable::new();
    camera.insert(
        "shutter_modes",
        PropertyValue::List(vec!["auto_sequence".into(), "manual".into()]),
    );
    let harness = Harness::new(
        PropertyTable::new().with("LimaCameraType", "simulator"),
        Some(camera),
    );
    let device = harness.device();

    assert_eq!(
        device.get_attr_string_value_list("shutter_mode").unwrap(),
        ["MANUAL", "AUTO_SEQUENCE"]
    );
    assert_eq!(
        device.get_attr_string_value_list("acq_mode").unwrap(),
        ["SINGLE", "CONCATENATION", "ACCUMULATION"]
    );
    assert!(device
        .get_attr_string_value_list("latency_time")
        .unwrap()
        .is_empty());
}

#[test]
fn unset_numeric_values_read_as_minus_one() {
    let harness = Harness::simulator("2");
    let device = harness.device();

    assert_eq!(device.read_acc_max_expotime().unwrap(), -1.0);
    assert_eq!(device.read_acc_nb_frames().unwrap(), -1);
    assert_eq!(device.read_acc_expotime().unwrap(), -1.0);
    assert_eq!(device.read_last_image_ready().unwrap(), -1);

    device.write_acc_max_expotime(0.25).unwrap();
    assert_eq!(device.read_acc_max_expotime().unwrap(), 0.25);
    assert_eq!(device.read_acc_nb_frames().unwrap(), 4);

    harness.engine().sim_acquisition().clear_latency_time();
    assert_eq!(device.read_latency_time().unwrap(), -1.0);

    harness.engine().set_image_counters(ImageCounters {
        last_image_ready: Some(11),
        last_image_saved: None,
    });
    assert_eq!(device.read_last_image_ready().unwrap(), 11);
    assert_eq!(device.read_last_image_saved().unwrap(), -1);
}

#[test]
fn write_statistic_reports_its_true_length() {
    let harness = Harness::simulator("2");
    let device = harness.device();
    assert_eq!(device.read_write_statistic().unwrap(), [-1.0]);

    let saving = harness.engine();
    saving.sim_saving().record_write_time(0.5);
    saving.sim_saving().record_write_time(0.75);
    assert_eq!(device.read_write_statistic().unwrap(), [0.5, 0.75]);

    for i in 0..300 {
        saving.sim_saving().record_write_time(f64::from(i));
    }
    let stat = device.read_write_statistic().unwrap();
    assert_eq!(stat.len(), 256);
    assert_eq!(stat[..2], [0.5, 0.75]);
}

#[test]
fn manual_shutter_is_driven_by_commands() {
    let device = Harness::simulator("2").device();
    assert_eq!(device.read_shutter_manual_state().unwrap().as_str(), "CLOSED");

    device.write_shutter_mode("manual").unwrap();
    device.open_shutter_manual().unwrap();
    assert_eq!(
        device.read_attribute("shutter_state").unwrap(),
        AttrValue::String("OPEN".into())
    );
    device.close_shutter_manual().unwrap();
    assert_eq!(device.read_shutter_manual_state().unwrap().as_str(), "CLOSED");
}

#[test]
fn shutter_without_capability_has_no_manual_mode() {
    let harness = Harness::new(
        PropertyTable::new().with("LimaCameraType", "simulator"),
        Some(PropertyTable::new().with("shutter_capability", "false")),
    );
    let device = harness.device();

    assert_eq!(
        device.read_shutter_manual_state().unwrap().as_str(),
        "NO_MANUAL_MODE"
    );
    device.open_shutter_manual().unwrap();
    device.close_shutter_manual().unwrap();

    let err = device.write_shutter_mode("MANUAL").unwrap_err();
    assert!(matches!(err, LimaError::ShutterCapabilityMissing));
    assert_eq!(device.read_shutter_mode().unwrap(), "AUTO_FRAME");
}

#[test]
fn delete_releases_the_engine_for_every_observer() {
    let harness = Harness::simulator("2");
    let mut device = harness.device();
    assert!(harness.monitor.is_attached());

    harness.engine().set_image_counters(ImageCounters {
        last_image_ready: Some(3),
        last_image_saved: Some(2),
    });
    assert_eq!(harness.monitor.last_image_ready(), Some(3));

    device.delete();
    assert!(harness.camera.is_closed());
    assert!(!harness.monitor.is_attached());
    assert_eq!(harness.monitor.last_image_ready(), None);
    assert!(matches!(
        device.read_camera_model(),
        Err(LimaError::NotInitialized(_))
    ));
}

#[test]
fn generic_dispatch_checks_names_access_and_types() {
    let device = Harness::simulator("2").device();

    assert!(matches!(
        device.read_attribute("frame_rate"),
        Err(LimaError::UnknownAttribute(_))
    ));
    assert!(matches!(
        device.write_attribute("camera_model", AttrValue::String("x".into())),
        Err(LimaError::ReadOnly(_))
    ));
    assert!(matches!(
        device.write_attribute("latency_time", AttrValue::String("x".into())),
        Err(LimaError::TypeMismatch { .. })
    ));
    assert!(matches!(
        device.command_inout("startAcq", AttrValue::Void),
        Err(LimaError::UnknownCommand(_))
    ));

    device
        .write_attribute("latency_time", AttrValue::Double(0.125))
        .unwrap();
    assert_eq!(
        device.read_attribute("latency_time").unwrap(),
        AttrValue::Double(0.125)
    );
    assert_eq!(device.attribute_list().len(), 15);
}

#[test]
fn server_starts_from_a_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [server]
        instance = "file"

        [plugins]
        common = ["counter_monitor"]

        [[devices]]
        name = "id00/limaccds/file"
        class = "LimaCCDs"
        properties = {{ LimaCameraType = "simulator", NbProcessingThread = 3 }}

        [[devices]]
        name = "id00/simulator/file"
        class = "Simulator"
        properties = {{ detector_model = "FileModel", shutter_modes = ["auto_frame"] }}
        "#
    )
    .unwrap();

    let config = ServerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.personal_name(), "LimaCCDs/file");

    let server = LimaServer::start(config);
    assert!(server.classes().contains("Simulator"));
    let device = server.facade().unwrap();

    assert_eq!(device.state(), DevState::On);
    assert_eq!(device.read_camera_model().unwrap(), "FileModel");
    assert_eq!(
        device.get_attr_string_value_list("shutter_mode").unwrap(),
        ["AUTO_FRAME"]
    );
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = ServerConfig::load(Some(path.as_path())).unwrap_err();
    assert_eq!(err.reason(), "ConfigError");
}

#[test]
fn shutter_timings_round_trip_and_read_unset_as_minus_one() {
    let harness = Harness::simulator("2");
    let device = harness.device();

    device.write_shutter_open_time(0.5).unwrap();
    device
        .write_attribute("shutter_close_time", AttrValue::Double(0.25))
        .unwrap();
    assert_eq!(device.read_shutter_open_time().unwrap(), 0.5);
    assert_eq!(
        device.read_attribute("shutter_close_time").unwrap(),
        AttrValue::Double(0.25)
    );

    harness.engine().sim_shutter().clear_timings();
    assert_eq!(device.read_shutter_open_time().unwrap(), -1.0);
    assert_eq!(device.read_shutter_close_time().unwrap(), -1.0);
}

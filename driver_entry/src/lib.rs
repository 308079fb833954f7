use std::{
    ffi::CStr,
    fs::File,
    os::raw::{c_char, c_uint},
    sync::atomic::{AtomicBool, Ordering},
};

use driver_core::config::DebugOptions;
use driver_core::host_interfaces::{XrtDevice, XrtPose};
use driver_core::runtime_interfaces::{RawPlugin, RawRegistry};
use log::{error, info, warn};
use simplelog::*;

pub const LOG_FILE_ENV: &str = "ILLIXR_DRIVER_LOG_FILE";

static LOGGER_LOADED: AtomicBool = AtomicBool::new(false);

fn init_logging() {
    if LOGGER_LOADED.swap(true, Ordering::AcqRel) {
        return;
    }

    let options = DebugOptions::get();
    let level = if options.print_spew {
        LevelFilter::Trace
    } else if options.print_debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    let mut file_error = None;
    if let Some(path) = std::env::var_os(LOG_FILE_ENV) {
        match File::create(&path) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Trace, Config::default(), file)),
            Err(err) => file_error = Some((path, err)),
        }
    }

    // The host may already have installed a logger.
    if CombinedLogger::init(loggers).is_ok() {
        info!("Initializing {} driver", driver_core::DRIVER_NAME);
    }
    if let Some((path, err)) = file_error {
        warn!("Could not open log file {:?}: {}", path, err);
    }
}

/// Plugin factory the runtime calls to construct the bridge.
#[no_mangle]
#[allow(clippy::missing_safety_doc)]
pub unsafe extern "C" fn illixr_monado_create_plugin(registry: *const RawRegistry) -> *mut RawPlugin {
    init_logging();
    driver_core::create_plugin(registry)
}

#[no_mangle]
pub extern "C" fn illixr_read_pose() -> XrtPose {
    driver_core::bridge::read_pose()
}

#[no_mangle]
pub extern "C" fn illixr_write_frame(left: c_uint, right: c_uint) {
    driver_core::bridge::write_frame(left, right)
}

#[no_mangle]
pub extern "C" fn illixr_get_vsync_ns() -> i64 {
    driver_core::bridge::get_vsync_ns()
}

#[no_mangle]
pub extern "C" fn illixr_get_now_ns() -> i64 {
    driver_core::bridge::get_now_ns()
}

/// Creates the headset device. Both strings are borrowed for the life of the process.
#[no_mangle]
#[allow(clippy::missing_safety_doc)]
pub unsafe extern "C" fn illixr_hmd_create(path: *const c_char, comp: *const c_char) -> *mut XrtDevice {
    init_logging();
    if path.is_null() || comp.is_null() {
        error!("illixr_hmd_create called with a null path or plugin list");
        return std::ptr::null_mut();
    }
    driver_core::wrappers::create_device(CStr::from_ptr(path), CStr::from_ptr(comp))
}

/// Creates the headset device from `ILLIXR_PATH` and `ILLIXR_COMP`, or returns null.
#[no_mangle]
pub extern "C" fn illixr_hmd_create_from_env() -> *mut XrtDevice {
    init_logging();
    driver_core::prober::create_from_env()
}

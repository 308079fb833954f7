//! Creates a device when the environment names a runtime.

use std::ffi::CStr;

use log::info;

use crate::config::{ProbeConfig, COMP_ENV, PATH_ENV};
use crate::host_interfaces::XrtDevice;
use crate::wrappers;

/// Null unless both `ILLIXR_PATH` and `ILLIXR_COMP` are set.
pub fn create_from_env() -> *mut XrtDevice {
    match ProbeConfig::from_env() {
        Some(config) => create_from_config(config),
        None => {
            info!("{} and {} not set; no device", PATH_ENV, COMP_ENV);
            std::ptr::null_mut()
        }
    }
}

pub fn create_from_config(config: ProbeConfig) -> *mut XrtDevice {
    // The device borrows both strings for the life of the process.
    let path: &'static CStr = Box::leak(config.runtime_path.into_boxed_c_str());
    let comp: &'static CStr = Box::leak(config.plugins.into_boxed_c_str());
    wrappers::create_device(path, comp)
}

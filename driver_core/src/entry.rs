use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use log::{debug, error};

use crate::bridge::{self, Bridge};
use crate::runtime_interfaces::{RawPlugin, RawRegistry};
use crate::services::ffi::FfiRegistry;
use crate::services::Plugin;

const PLUGIN_NAME_NUL: &[u8] = b"illixr_plugin\0";

/// Plugin factory registered with the runtime. Builds and installs the bridge.
///
/// A null registry, a missing service or a second construction aborts the process.
///
/// # Safety
///
/// `registry` must be null or a registry table valid for the duration of the call.
pub unsafe extern "C" fn create_plugin(registry: *const RawRegistry) -> *mut RawPlugin {
    let registry = match FfiRegistry::from_raw(registry) {
        Some(registry) => registry,
        None => {
            error!("Plugin factory called without a registry");
            std::process::abort()
        }
    };
    let bridge = match bridge::create(&registry) {
        Ok(bridge) => bridge,
        Err(err) => {
            error!("Failed to create the bridge plugin: {}", err);
            std::process::abort()
        }
    };
    debug!("Created plugin `{}`", bridge.name());

    Box::into_raw(Box::new(RawPlugin {
        name: PLUGIN_NAME_NUL.as_ptr().cast::<c_char>(),
        ctx: Arc::into_raw(bridge) as *mut c_void,
        start: plugin_start,
        stop: plugin_stop,
        destroy: plugin_destroy,
    }))
}

unsafe fn plugin_bridge<'a>(plugin: *mut RawPlugin) -> &'a Bridge {
    &*((*plugin).ctx as *const Bridge)
}

unsafe extern "C" fn plugin_start(plugin: *mut RawPlugin) {
    plugin_bridge(plugin).start()
}

unsafe extern "C" fn plugin_stop(plugin: *mut RawPlugin) {
    plugin_bridge(plugin).stop()
}

unsafe extern "C" fn plugin_destroy(plugin: *mut RawPlugin) {
    let plugin = Box::from_raw(plugin);
    let bridge = Arc::from_raw(plugin.ctx as *const Bridge);
    if bridge::instance().map_or(false, |installed| Arc::ptr_eq(&installed, &bridge)) {
        bridge::shutdown();
    }
}

use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use log::{error, info};

use crate::config::DisplayParams;
use crate::host_interfaces::XrtPose;
use crate::services::{Phonebook, Plugin};

use super::{Bridge, BridgeError};

lazy_static! {
    static ref BRIDGE: RwLock<Option<Arc<Bridge>>> = RwLock::new(None);
}

/// Builds the bridge from the runtime's registry, installs it and starts it.
pub fn create(registry: &dyn Phonebook) -> Result<Arc<Bridge>, BridgeError> {
    let mut slot = BRIDGE.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(BridgeError::AlreadyInitialized);
    }
    let bridge = Arc::new(Bridge::new(registry, &DisplayParams::default())?);
    *slot = Some(bridge.clone());
    drop(slot);

    bridge.start();
    Ok(bridge)
}

pub fn instance() -> Option<Arc<Bridge>> {
    BRIDGE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Stops and uninstalls the bridge. Returns it if one was installed.
pub fn shutdown() -> Option<Arc<Bridge>> {
    let bridge = BRIDGE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()?;
    bridge.stop();
    info!("Plugin `{}` shut down", bridge.name());
    Some(bridge)
}

fn require() -> Arc<Bridge> {
    match instance() {
        Some(bridge) => bridge,
        None => {
            error!("bridge plugin must be created before use");
            panic!("bridge plugin must be created before use");
        }
    }
}

pub fn read_pose() -> XrtPose {
    require().read_pose()
}

pub fn write_frame(left: u32, right: u32) {
    require().write_frame(left, right)
}

pub fn get_vsync_ns() -> i64 {
    require().get_vsync_ns()
}

pub fn get_now_ns() -> i64 {
    require().get_now_ns()
}

//! Callbacks installed in the host-visible device struct.

use log::{debug, error};

use crate::device::HmdDevice;
use crate::graphics::GraphicsContext;
use crate::host_interfaces::*;
use crate::wrappers::{self, DeviceHandle};

pub unsafe extern "C" fn update_inputs(xdev: *mut XrtDevice, _timekeeping: *mut TimeState) {
    DeviceHandle::from_raw(xdev).run(|device| device.update_inputs());
}

pub unsafe extern "C" fn get_tracked_pose(
    xdev: *mut XrtDevice,
    name: XrtInputName,
    _timekeeping: *mut TimeState,
    out_timestamp: *mut i64,
    out_relation: *mut XrtSpaceRelation,
) {
    let result = DeviceHandle::from_raw(xdev).run(|device| device.get_tracked_pose(name));
    // Outputs are left untouched on error.
    if let Some(Ok((timestamp, relation))) = result {
        *out_timestamp = timestamp;
        *out_relation = relation;
    }
}

pub unsafe extern "C" fn get_view_pose(
    xdev: *mut XrtDevice,
    eye_relation: *const XrtVec3,
    view_index: u32,
    out_pose: *mut XrtPose,
) {
    let eye_relation = *eye_relation;
    if let Some(pose) =
        DeviceHandle::from_raw(xdev).run(|device| device.get_view_pose(&eye_relation, view_index))
    {
        *out_pose = pose;
    }
}

/// The host passes the GL context it renders with in place of the timekeeping pointer.
pub unsafe extern "C" fn set_output(
    xdev: *mut XrtDevice,
    name: XrtOutputName,
    timekeeping: *mut TimeState,
    value: *mut XrtOutputValue,
) {
    let value = value.as_ref().copied().unwrap_or_default();
    DeviceHandle::from_raw(xdev).run(|device| {
        let context = GraphicsContext::from_raw(timekeeping.cast()).or_current();
        device.set_output(name, context, &value)
    });
}

pub unsafe extern "C" fn destroy(xdev: *mut XrtDevice) {
    let wrapper = match DeviceHandle::from_raw(xdev).remove() {
        Some(wrapper) => wrapper,
        None => {
            error!("Destroy called on unknown device {:p}", xdev);
            return;
        }
    };

    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        wrapper
            .device
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .destroy()
    }))
    .is_err()
    {
        error!("Panic while destroying device {:p}", xdev);
        std::process::abort();
    }
    drop(wrapper);

    wrappers::free_device(xdev);
    debug!("Device {:p} freed", xdev);
}

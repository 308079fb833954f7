//! Devices handed to the host, keyed by the address of their host-visible struct.

use std::ffi::CStr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use lazy_static::lazy_static;
use log::{error, info};

use crate::device::{IllixrHmd, DEVICE_NAME};
use crate::host_interfaces::*;
use crate::interceptors;

lazy_static! {
    static ref DEVICE_WRAPPERS: DashMap<DeviceHandle, Arc<DeviceWrapper>> = DashMap::new();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn from_raw(xdev: *const XrtDevice) -> Self {
        DeviceHandle(xdev as usize)
    }

    /// Runs `f` on the device behind this handle. A panic in `f` aborts the process, since it
    /// cannot unwind into the host.
    pub fn run<R>(self, f: impl FnOnce(&mut IllixrHmd) -> R) -> Option<R> {
        let wrapper = match DEVICE_WRAPPERS.get(&self) {
            Some(wrapper) => wrapper.value().clone(),
            None => {
                error!("Unknown device {:#x}", self.0);
                return None;
            }
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut device = wrapper.device.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *device)
        })) {
            Ok(res) => Some(res),
            Err(_) => {
                error!("Panic in device {:#x}", self.0);
                std::process::abort()
            }
        }
    }

    /// Unregisters the device, returning it for destruction.
    pub fn remove(self) -> Option<Arc<DeviceWrapper>> {
        DEVICE_WRAPPERS.remove(&self).map(|(_, wrapper)| wrapper)
    }
}

pub struct DeviceWrapper {
    pub device: Mutex<IllixrHmd>,
}

/// The single allocation the host sees. `base` must stay first so a `*mut XrtDevice` is also a
/// `*mut DeviceAllocation`.
#[repr(C)]
pub struct DeviceAllocation {
    pub base: XrtDevice,
    pub hmd: XrtHmdParts,
    pub inputs: [XrtInput; 1],
}

/// Builds a device with the default collaborators and hands it to the host. Null on failure.
pub fn create_device(path: &'static CStr, comp: &'static CStr) -> *mut XrtDevice {
    match IllixrHmd::builder(path, comp).build() {
        Ok(hmd) => register_device(hmd),
        Err(err) => {
            error!("Failed to set up display geometry: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Allocates the host-visible struct for `hmd`, wires its callbacks and registers it.
pub fn register_device(hmd: IllixrHmd) -> *mut XrtDevice {
    let mut alloc = Box::new(DeviceAllocation {
        base: XrtDevice {
            name: XRT_DEVICE_GENERIC_HMD,
            str: [0; XRT_DEVICE_NAME_LEN],
            hmd: std::ptr::null_mut(),
            num_inputs: 1,
            inputs: std::ptr::null_mut(),
            update_inputs: Some(interceptors::update_inputs),
            get_tracked_pose: Some(interceptors::get_tracked_pose),
            get_view_pose: Some(interceptors::get_view_pose),
            set_output: Some(interceptors::set_output),
            destroy: Some(interceptors::destroy),
        },
        hmd: *hmd.parts(),
        inputs: [XrtInput {
            active: true,
            timestamp: 0,
            name: XrtInputName::GENERIC_HEAD_POSE,
        }],
    });
    alloc.base.set_str(DEVICE_NAME);
    alloc.base.hmd = &mut alloc.hmd;
    alloc.base.inputs = alloc.inputs.as_mut_ptr();

    let xdev = Box::into_raw(alloc).cast::<XrtDevice>();
    DEVICE_WRAPPERS.insert(
        DeviceHandle::from_raw(xdev),
        Arc::new(DeviceWrapper {
            device: Mutex::new(hmd),
        }),
    );
    info!("Created {} device {:p}", DEVICE_NAME, xdev);
    xdev
}

/// Releases the host-visible struct.
///
/// # Safety
///
/// `xdev` must come from [`register_device`] and must not be used afterwards.
pub unsafe fn free_device(xdev: *mut XrtDevice) {
    drop(Box::from_raw(xdev.cast::<DeviceAllocation>()));
}

pub fn is_registered(xdev: *const XrtDevice) -> bool {
    DEVICE_WRAPPERS.contains_key(&DeviceHandle::from_raw(xdev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugOptions;
    use crate::mock::MockRuntimeProvider;

    fn cstr(bytes: &'static [u8]) -> &'static CStr {
        CStr::from_bytes_with_nul(bytes).unwrap()
    }

    #[test]
    fn registered_device_is_wired_and_freed() {
        let provider = MockRuntimeProvider::default();
        let hmd = IllixrHmd::builder(cstr(b"runtime.so\0"), cstr(b"a.so\0"))
            .options(DebugOptions::default())
            .provider(provider.clone())
            .build()
            .unwrap();
        let xdev = register_device(hmd);

        unsafe {
            let alloc = &*xdev.cast::<DeviceAllocation>();
            assert_eq!(alloc.base.hmd as *const XrtHmdParts, &alloc.hmd as *const _);
            assert_eq!(alloc.base.inputs as *const XrtInput, alloc.inputs.as_ptr());
            assert_eq!(alloc.base.name, XRT_DEVICE_GENERIC_HMD);
            assert_eq!(alloc.hmd.views[1].viewport.x_pixels, 1280);
        }
        assert!(is_registered(xdev));

        let state = DeviceHandle::from_raw(xdev).run(|device| device.state().is_launched());
        assert_eq!(state, Some(false));

        unsafe { ((*xdev).destroy.unwrap())(xdev) };
        assert!(!is_registered(xdev));
        assert!(provider.log().drops.is_empty());
    }
}

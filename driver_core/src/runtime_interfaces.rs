//! Layouts shared with the dynamically loaded runtime.
//!
//! Every capability the runtime hands us, and every capability we hand back, is a `#[repr(C)]`
//! table of an opaque `ctx` plus function pointers taking that `ctx`. The runtime owns each `ctx`.

use std::os::raw::{c_char, c_void};

use crate::time::TimePoint;

/// Symbol resolved from the runtime module to construct a runtime.
pub const RUNTIME_FACTORY_SYMBOL: &[u8] = b"runtime_factory\0";

pub const EYEBUFFER_TOPIC: &str = "eyebuffer";
pub const VSYNC_ESTIMATE_TOPIC: &str = "vsync_estimate";
pub const SLOW_POSE_TOPIC: &str = "slow_pose";

/// A pose as the runtime produces it. Orientation is `[x, y, z, w]`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pose {
    pub sensor_time: TimePoint,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            sensor_time: TimePoint::default(),
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FastPose {
    pub pose: Pose,
    pub predict_computed_time: TimePoint,
    pub predict_target_time: TimePoint,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RenderedFrame {
    /// Left and right eye image handles.
    pub swapchain_indices: [u32; 2],
    /// Double-buffer slot for each eye.
    pub swap_indices: [u32; 2],
    pub render_pose: FastPose,
    pub sample_time: TimePoint,
    pub render_time: TimePoint,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawReader {
    pub ctx: *mut c_void,
    /// Writes the latest event into `out` and returns true, or returns false if nothing was
    /// published yet. Never blocks.
    pub get_ro_nullable: unsafe extern "C" fn(ctx: *mut c_void, out: *mut c_void) -> bool,
    pub release: unsafe extern "C" fn(ctx: *mut c_void),
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawWriter {
    pub ctx: *mut c_void,
    pub put: unsafe extern "C" fn(ctx: *mut c_void, event: *const c_void),
    pub release: unsafe extern "C" fn(ctx: *mut c_void),
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawSwitchboard {
    pub ctx: *mut c_void,
    pub get_reader: unsafe extern "C" fn(
        ctx: *mut c_void,
        topic: *const c_char,
        event_size: usize,
        out: *mut RawReader,
    ) -> bool,
    pub get_writer: unsafe extern "C" fn(
        ctx: *mut c_void,
        topic: *const c_char,
        event_size: usize,
        out: *mut RawWriter,
    ) -> bool,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawPosePrediction {
    pub ctx: *mut c_void,
    pub fast_pose_reliable: unsafe extern "C" fn(ctx: *mut c_void) -> bool,
    pub get_fast_pose: unsafe extern "C" fn(ctx: *mut c_void, out: *mut FastPose),
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawClock {
    pub ctx: *mut c_void,
    pub now: unsafe extern "C" fn(ctx: *mut c_void) -> i64,
}

/// The runtime's service registry. A null return means the service is not registered.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct RawRegistry {
    pub ctx: *mut c_void,
    pub switchboard: unsafe extern "C" fn(ctx: *mut c_void) -> *const RawSwitchboard,
    pub pose_prediction: unsafe extern "C" fn(ctx: *mut c_void) -> *const RawPosePrediction,
    pub clock: unsafe extern "C" fn(ctx: *mut c_void) -> *const RawClock,
}

/// A plugin as handed to the runtime. The runtime calls `destroy` exactly once.
#[repr(C)]
pub struct RawPlugin {
    pub name: *const c_char,
    pub ctx: *mut c_void,
    pub start: unsafe extern "C" fn(plugin: *mut RawPlugin),
    pub stop: unsafe extern "C" fn(plugin: *mut RawPlugin),
    pub destroy: unsafe extern "C" fn(plugin: *mut RawPlugin),
}

pub type PluginFactory = unsafe extern "C" fn(registry: *const RawRegistry) -> *mut RawPlugin;

/// A runtime instance. `destroy` releases `ctx` and the table itself.
#[repr(C)]
pub struct RawRuntime {
    pub ctx: *mut c_void,
    pub load_so: unsafe extern "C" fn(
        ctx: *mut c_void,
        paths: *const *const c_char,
        count: usize,
    ) -> bool,
    pub load_plugin_factory: unsafe extern "C" fn(ctx: *mut c_void, factory: PluginFactory) -> bool,
    pub stop: unsafe extern "C" fn(ctx: *mut c_void),
    pub destroy: unsafe extern "C" fn(ctx: *mut c_void),
}

/// Signature of [`RUNTIME_FACTORY_SYMBOL`]: builds a runtime on the given GL context.
pub type RuntimeFactory = unsafe extern "C" fn(gl_context: *mut c_void) -> *mut RawRuntime;

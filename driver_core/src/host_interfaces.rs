//! Layouts shared with the host device framework.
//!
//! Everything the host reads or writes through a raw pointer lives here; the rest of the crate
//! works with these types by value.

use std::os::raw::c_char;

use bitflags::bitflags;

pub const XRT_DEVICE_NAME_LEN: usize = 256;
pub const XRT_DEVICE_GENERIC_HMD: u32 = 1;

pub const XRT_INPUT_TYPE_BITWIDTH: u32 = 8;
pub const XRT_INPUT_TYPE_POSE: u32 = 0x05;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl XrtQuat {
    pub const IDENTITY: XrtQuat = XrtQuat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl XrtVec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        XrtVec3 { x, y, z }
    }
}

/// Where a pose handed to the host came from.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XrtPoseType {
    /// A new slow (keyframe) pose arrived since the previous read.
    KeyframeGen = 0,
    /// Extrapolated from the last keyframe.
    PredictionGen = 1,
}

impl Default for XrtPoseType {
    fn default() -> Self {
        XrtPoseType::PredictionGen
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtPose {
    pub orientation: XrtQuat,
    pub position: XrtVec3,
    pub pose_type: XrtPoseType,
}

impl XrtPose {
    pub const IDENTITY: XrtPose = XrtPose {
        orientation: XrtQuat::IDENTITY,
        position: XrtVec3::new(0.0, 0.0, 0.0),
        pose_type: XrtPoseType::PredictionGen,
    };
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default)]
    pub struct XrtSpaceRelationFlags: u32 {
        const ORIENTATION_VALID         = 1 << 0;
        const POSITION_VALID            = 1 << 1;
        const LINEAR_VELOCITY_VALID     = 1 << 2;
        const ANGULAR_VELOCITY_VALID    = 1 << 3;
        const LINEAR_ACCELERATION_VALID = 1 << 4;
        const ANGULAR_ACCELERATION_VALID = 1 << 5;
        const ORIENTATION_TRACKED       = 1 << 6;
        const POSITION_TRACKED          = 1 << 7;
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtSpaceRelation {
    pub relation_flags: XrtSpaceRelationFlags,
    pub pose: XrtPose,
    pub linear_velocity: XrtVec3,
    pub angular_velocity: XrtVec3,
    pub linear_acceleration: XrtVec3,
    pub angular_acceleration: XrtVec3,
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct XrtInputName(pub u32);

impl XrtInputName {
    pub const GENERIC_HEAD_POSE: XrtInputName = XrtInputName::new(0x0000, XRT_INPUT_TYPE_POSE);

    pub const fn new(id: u32, ty: u32) -> Self {
        XrtInputName((id << XRT_INPUT_TYPE_BITWIDTH) | ty)
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct XrtOutputName(pub u32);

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtOutputVibration {
    pub frequency: f32,
    pub amplitude: f32,
    pub duration: i64,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union XrtOutputValue {
    pub vibration: XrtOutputVibration,
}

impl Default for XrtOutputValue {
    fn default() -> Self {
        XrtOutputValue {
            vibration: XrtOutputVibration::default(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct XrtInput {
    pub active: bool,
    pub timestamp: i64,
    pub name: XrtInputName,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtFov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct XrtViewport {
    pub x_pixels: u32,
    pub y_pixels: u32,
    pub w_pixels: u32,
    pub h_pixels: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct XrtViewDisplay {
    pub w_pixels: u32,
    pub h_pixels: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtMatrix2x2 {
    pub v: [f32; 4],
}

impl XrtMatrix2x2 {
    pub const IDENTITY: XrtMatrix2x2 = XrtMatrix2x2 {
        v: [1.0, 0.0, 0.0, 1.0],
    };
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtView {
    pub viewport: XrtViewport,
    pub display: XrtViewDisplay,
    pub rot: XrtMatrix2x2,
    pub fov: XrtFov,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct XrtScreen {
    pub w_pixels: u32,
    pub h_pixels: u32,
    pub nominal_frame_interval_ns: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XrtBlendMode {
    Opaque = 1,
    Additive = 2,
    AlphaBlend = 3,
}

impl Default for XrtBlendMode {
    fn default() -> Self {
        XrtBlendMode::Opaque
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default)]
    pub struct XrtDistortionModel: u32 {
        const NONE    = 1 << 0;
        const COMPUTE = 1 << 1;
        const MESHUV  = 1 << 2;
    }
}

/// Borrowed view of a distortion mesh; the driver owns the storage.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct XrtDistortionMesh {
    pub vertices: *const f32,
    pub stride: u32,
    pub num_vertices: u32,
    pub num_uv_channels: u32,
    pub indices: *const u32,
    pub index_counts: [u32; 2],
    pub index_offsets: [u32; 2],
    pub index_count_total: u32,
}

impl Default for XrtDistortionMesh {
    fn default() -> Self {
        XrtDistortionMesh {
            vertices: std::ptr::null(),
            stride: 0,
            num_vertices: 0,
            num_uv_channels: 0,
            indices: std::ptr::null(),
            index_counts: [0; 2],
            index_offsets: [0; 2],
            index_count_total: 0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtDistortion {
    pub models: XrtDistortionModel,
    pub preferred: XrtDistortionModel,
    pub mesh: XrtDistortionMesh,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XrtHmdParts {
    pub screens: [XrtScreen; 1],
    pub views: [XrtView; 2],
    pub blend_mode: XrtBlendMode,
    pub distortion: XrtDistortion,
}

/// Host timekeeping; only ever handled by pointer.
#[repr(C)]
pub struct TimeState {
    _private: [u8; 0],
}

pub type FnUpdateInputs = unsafe extern "C" fn(xdev: *mut XrtDevice, timekeeping: *mut TimeState);

pub type FnGetTrackedPose = unsafe extern "C" fn(
    xdev: *mut XrtDevice,
    name: XrtInputName,
    timekeeping: *mut TimeState,
    out_timestamp: *mut i64,
    out_relation: *mut XrtSpaceRelation,
);

pub type FnGetViewPose = unsafe extern "C" fn(
    xdev: *mut XrtDevice,
    eye_relation: *const XrtVec3,
    view_index: u32,
    out_pose: *mut XrtPose,
);

pub type FnSetOutput = unsafe extern "C" fn(
    xdev: *mut XrtDevice,
    name: XrtOutputName,
    timekeeping: *mut TimeState,
    value: *mut XrtOutputValue,
);

pub type FnDestroy = unsafe extern "C" fn(xdev: *mut XrtDevice);

#[repr(C)]
pub struct XrtDevice {
    pub name: u32,
    pub str: [c_char; XRT_DEVICE_NAME_LEN],
    pub hmd: *mut XrtHmdParts,
    pub num_inputs: usize,
    pub inputs: *mut XrtInput,
    pub update_inputs: Option<FnUpdateInputs>,
    pub get_tracked_pose: Option<FnGetTrackedPose>,
    pub get_view_pose: Option<FnGetViewPose>,
    pub set_output: Option<FnSetOutput>,
    pub destroy: Option<FnDestroy>,
}

impl XrtDevice {
    /// Copies `name` into the fixed-size, NUL terminated display string.
    pub fn set_str(&mut self, name: &str) {
        self.str = [0; XRT_DEVICE_NAME_LEN];
        for (dst, src) in self
            .str
            .iter_mut()
            .zip(name.bytes().take(XRT_DEVICE_NAME_LEN - 1))
        {
            *dst = src as c_char;
        }
    }
}

//! The headset as the host framework sees it.

use std::ffi::CStr;
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};
use thiserror::Error;

use crate::config::{DebugOptions, DisplayParams};
use crate::distortion::{self, DistortionMesh};
use crate::geometry::{self, GeometryError};
use crate::graphics::GraphicsContext;
use crate::host_interfaces::*;
use crate::introspection::{self, RootId};
use crate::loader::{self, DynamicLibraryProvider, LaunchError, Runtime, RuntimeModule, RuntimeProvider};
use crate::runtime_interfaces::PluginFactory;
use crate::services::{Clock, MonotonicClock};

pub const DEVICE_NAME: &str = "ILLIXR";

/// Spew is the most verbose level, gated by `ILLIXR_PRINT_SPEW`.
macro_rules! hmd_spew {
    ($hmd:expr, $($arg:tt)+) => {
        if $hmd.options.print_spew {
            log::trace!($($arg)+);
        }
    };
}

/// Gated by `ILLIXR_PRINT_DEBUG`.
macro_rules! hmd_debug {
    ($hmd:expr, $($arg:tt)+) => {
        if $hmd.options.print_debug {
            log::debug!($($arg)+);
        }
    };
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("unknown input name {0:?}")]
    UnknownInput(XrtInputName),
    #[error("device is no longer usable")]
    Unusable,
}

/// Operations the host framework dispatches to a device.
pub trait HmdDevice {
    fn update_inputs(&mut self);

    /// Pose of `name` and the host time it was sampled at.
    fn get_tracked_pose(&mut self, name: XrtInputName) -> Result<(i64, XrtSpaceRelation), DeviceError>;

    /// Pose of one eye relative to the head.
    fn get_view_pose(&self, eye_relation: &XrtVec3, view_index: u32) -> XrtPose;

    fn set_output(&mut self, name: XrtOutputName, context: GraphicsContext, value: &XrtOutputValue);

    fn destroy(&mut self);
}

/// Where head poses come from.
pub trait PoseSource: Send {
    fn read_pose(&self) -> XrtPose;
}

/// Reads poses from the installed bridge plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgePoseSource;

impl PoseSource for BridgePoseSource {
    fn read_pose(&self) -> XrtPose {
        crate::bridge::read_pose()
    }
}

pub enum LaunchState {
    /// Waiting for the first output to be set.
    Pending,
    // Field order matters: the runtime must be dropped before its module.
    Launched {
        runtime: Box<dyn Runtime>,
        module: Box<dyn RuntimeModule>,
    },
    /// Launch failed; never retried.
    Failed,
    Destroyed,
}

impl LaunchState {
    pub fn is_launched(&self) -> bool {
        matches!(self, LaunchState::Launched { .. })
    }
}

pub struct IllixrHmd {
    pose: Arc<Mutex<XrtPose>>,
    options: DebugOptions,
    // Borrowed from the creator, read on launch.
    path: &'static CStr,
    comp: &'static CStr,
    state: LaunchState,
    provider: Box<dyn RuntimeProvider>,
    pose_source: Box<dyn PoseSource>,
    host_clock: Arc<dyn Clock>,
    plugin_factory: PluginFactory,
    parts: XrtHmdParts,
    mesh: Option<DistortionMesh>,
    vars_root: Option<RootId>,
}

// The only raw pointers are the mesh pointers in `parts`, which point into `mesh`.
unsafe impl Send for IllixrHmd {}

pub struct IllixrHmdBuilder {
    path: &'static CStr,
    comp: &'static CStr,
    options: DebugOptions,
    display: DisplayParams,
    provider: Box<dyn RuntimeProvider>,
    pose_source: Box<dyn PoseSource>,
    host_clock: Arc<dyn Clock>,
    plugin_factory: PluginFactory,
}

impl IllixrHmdBuilder {
    pub fn options(mut self, options: DebugOptions) -> Self {
        self.options = options;
        self
    }

    pub fn display(mut self, display: DisplayParams) -> Self {
        self.display = display;
        self
    }

    pub fn provider(mut self, provider: impl RuntimeProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    pub fn pose_source(mut self, pose_source: impl PoseSource + 'static) -> Self {
        self.pose_source = Box::new(pose_source);
        self
    }

    pub fn host_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.host_clock = clock;
        self
    }

    pub fn plugin_factory(mut self, factory: PluginFactory) -> Self {
        self.plugin_factory = factory;
        self
    }

    pub fn build(self) -> Result<IllixrHmd, GeometryError> {
        let mut parts = geometry::setup_split_side_by_side(&self.display)?;
        let mesh = distortion::setup_mesh_none(&mut parts);

        let pose = Arc::new(Mutex::new(XrtPose::IDENTITY));
        let vars_root = introspection::add_root(DEVICE_NAME);
        introspection::add_pose(vars_root, &pose, "pose");

        let hmd = IllixrHmd {
            pose,
            options: self.options,
            path: self.path,
            comp: self.comp,
            state: LaunchState::Pending,
            provider: self.provider,
            pose_source: self.pose_source,
            host_clock: self.host_clock,
            plugin_factory: self.plugin_factory,
            parts,
            mesh,
            vars_root: Some(vars_root),
        };
        hmd_debug!(
            hmd,
            "Created device for runtime `{}` with plugins `{}`",
            hmd.path.to_string_lossy(),
            hmd.comp.to_string_lossy()
        );
        Ok(hmd)
    }
}

impl IllixrHmd {
    /// A device that launches the runtime module at `path` with the `:` separated plugin list
    /// `comp`. Both strings are borrowed for the life of the process.
    pub fn builder(path: &'static CStr, comp: &'static CStr) -> IllixrHmdBuilder {
        IllixrHmdBuilder {
            path,
            comp,
            options: DebugOptions::get(),
            display: DisplayParams::default(),
            provider: Box::new(DynamicLibraryProvider),
            pose_source: Box::new(BridgePoseSource),
            host_clock: Arc::new(MonotonicClock),
            plugin_factory: crate::entry::create_plugin,
        }
    }

    pub fn state(&self) -> &LaunchState {
        &self.state
    }

    pub fn parts(&self) -> &XrtHmdParts {
        &self.parts
    }

    pub fn vars_root(&self) -> Option<RootId> {
        self.vars_root
    }

    /// The last head pose handed to the host, as registered for debugging tools.
    pub fn tracked_pose(&self) -> XrtPose {
        *self.pose.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(
        &self,
        context: GraphicsContext,
    ) -> Result<(Box<dyn Runtime>, Box<dyn RuntimeModule>), LaunchError> {
        let path = self.path.to_str().map_err(|_| LaunchError::InvalidPath)?;
        let comp = self.comp.to_str().map_err(|_| LaunchError::InvalidPath)?;
        loader::launch(self.provider.as_ref(), path, comp, context, self.plugin_factory)
    }

    fn teardown(&mut self, next: LaunchState) {
        if let LaunchState::Launched {
            mut runtime,
            module,
        } = std::mem::replace(&mut self.state, next)
        {
            runtime.stop();
            drop(runtime);
            drop(module);
            info!("Runtime stopped");
        }
        if let Some(root) = self.vars_root.take() {
            introspection::remove_root(root);
        }
    }
}

impl HmdDevice for IllixrHmd {
    fn update_inputs(&mut self) {}

    fn get_tracked_pose(&mut self, name: XrtInputName) -> Result<(i64, XrtSpaceRelation), DeviceError> {
        if name != XrtInputName::GENERIC_HEAD_POSE {
            error!("unknown input name {:?}", name);
            return Err(DeviceError::UnknownInput(name));
        }
        if matches!(self.state, LaunchState::Failed | LaunchState::Destroyed) {
            error!("pose requested from a torn down device");
            return Err(DeviceError::Unusable);
        }

        let timestamp = self.host_clock.now().as_nanos();
        let relation = XrtSpaceRelation {
            relation_flags: XrtSpaceRelationFlags::ORIENTATION_VALID
                | XrtSpaceRelationFlags::POSITION_VALID,
            pose: self.pose_source.read_pose(),
            ..Default::default()
        };
        hmd_spew!(self, "head pose at {}: {:?}", timestamp, relation.pose);
        *self.pose.lock().unwrap_or_else(PoisonError::into_inner) = relation.pose;

        Ok((timestamp, relation))
    }

    fn get_view_pose(&self, eye_relation: &XrtVec3, view_index: u32) -> XrtPose {
        let adjust = view_index == 0;
        // Mirror to the left without producing -0.0.
        let half = |v: f32| {
            let v = v / 2.0;
            if adjust && v > 0.0 {
                -v
            } else {
                v
            }
        };

        XrtPose {
            orientation: XrtQuat::IDENTITY,
            position: XrtVec3::new(half(eye_relation.x), half(eye_relation.y), half(eye_relation.z)),
            pose_type: XrtPoseType::PredictionGen,
        }
    }

    fn set_output(&mut self, _name: XrtOutputName, context: GraphicsContext, _value: &XrtOutputValue) {
        if !matches!(self.state, LaunchState::Pending) {
            return;
        }

        match self.launch(context) {
            Ok((runtime, module)) => {
                self.state = LaunchState::Launched { runtime, module };
                info!("ILLIXR runtime launched");
            }
            Err(err) => {
                error!("Failed to load ILLIXR runtime: {}", err);
                self.teardown(LaunchState::Failed);
            }
        }
    }

    fn destroy(&mut self) {
        hmd_debug!(self, "Destroying device");
        self.teardown(LaunchState::Destroyed);
    }
}

impl Drop for IllixrHmd {
    fn drop(&mut self) {
        if !matches!(self.state, LaunchState::Destroyed) {
            self.teardown(LaunchState::Destroyed);
        }
    }
}

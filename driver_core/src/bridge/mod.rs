//! The bridge plugin: the runtime-side half of the driver.
//!
//! The runtime builds one [`Bridge`] through [`crate::entry::create_plugin`]; the device and the
//! runtime's renderer then reach it through free functions that carry no handle. Using any of
//! those before the bridge exists is a programming error and panics.

mod singleton;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::DisplayParams;
use crate::host_interfaces::{XrtPose, XrtPoseType, XrtQuat, XrtVec3};
use crate::runtime_interfaces::*;
use crate::services::*;
use crate::time::TimePoint;

pub use singleton::{create, get_now_ns, get_vsync_ns, instance, read_pose, shutdown, write_frame};

pub const PLUGIN_NAME: &str = "illixr_plugin";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("the bridge plugin is already initialized")]
    AlreadyInitialized,
}

struct Cursor {
    /// Sensor tick of the newest slow pose seen so far.
    last_slow_pose_tick: i64,
    prev_pose: FastPose,
    sample_time: TimePoint,
    sampled: bool,
    buffer_to_use: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            last_slow_pose_tick: -1,
            prev_pose: FastPose::default(),
            sample_time: TimePoint::default(),
            sampled: false,
            buffer_to_use: 0,
        }
    }
}

pub struct Bridge {
    name: String,
    pose_prediction: Arc<dyn PosePrediction>,
    clock: Arc<dyn Clock>,
    eyebuffer: Box<dyn Writer<RenderedFrame>>,
    vsync_estimate: Box<dyn Reader<TimePoint>>,
    slow_pose: Box<dyn Reader<Pose>>,
    frame_period: Duration,
    running: AtomicBool,
    cursor: Mutex<Cursor>,
}

impl Bridge {
    pub fn new(registry: &dyn Phonebook, display: &DisplayParams) -> Result<Self, BridgeError> {
        let switchboard = registry
            .lookup_switchboard()
            .ok_or(ServiceError::Missing("switchboard"))?;
        let pose_prediction = registry
            .lookup_pose_prediction()
            .ok_or(ServiceError::Missing("pose_prediction"))?;
        let clock = registry
            .lookup_clock()
            .ok_or(ServiceError::Missing("clock"))?;

        Ok(Bridge {
            name: PLUGIN_NAME.to_owned(),
            eyebuffer: switchboard.get_frame_writer(EYEBUFFER_TOPIC)?,
            vsync_estimate: switchboard.get_time_reader(VSYNC_ESTIMATE_TOPIC)?,
            slow_pose: switchboard.get_pose_reader(SLOW_POSE_TOPIC)?,
            pose_prediction,
            clock,
            frame_period: display.period(),
            running: AtomicBool::new(false),
            cursor: Mutex::new(Cursor::default()),
        })
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest fast pose in host form. The pose and the time it was sampled are cached for the
    /// next [`Bridge::write_frame`].
    pub fn read_pose(&self) -> XrtPose {
        if !self.pose_prediction.fast_pose_reliable() {
            warn!("Pose not reliable yet; returning best guess");
        }
        let fast_pose = self.pose_prediction.get_fast_pose();
        let sample_time = self.clock.now();

        let pose = &fast_pose.pose;
        let [qx, qy, qz, qw] = pose.orientation;
        let [px, py, pz] = pose.position;

        let mut cursor = self.cursor();
        let pose_type = match self.slow_pose.get_ro_nullable() {
            Some(slow_pose) if slow_pose.sensor_time.as_nanos() > cursor.last_slow_pose_tick => {
                cursor.last_slow_pose_tick = slow_pose.sensor_time.as_nanos();
                XrtPoseType::KeyframeGen
            }
            _ => XrtPoseType::PredictionGen,
        };

        cursor.prev_pose = fast_pose;
        cursor.sample_time = sample_time;
        cursor.sampled = true;

        XrtPose {
            orientation: XrtQuat {
                x: qx,
                y: qy,
                z: qz,
                w: qw,
            },
            position: XrtVec3::new(px, py, pz),
            pose_type,
        }
    }

    /// Publishes the eye images rendered from the pose of the last [`Bridge::read_pose`].
    pub fn write_frame(&self, left: u32, right: u32) {
        let mut cursor = self.cursor();
        if !cursor.sampled {
            warn!("Frame written before any pose was read; submitting the default pose");
        }

        let slot = cursor.buffer_to_use;
        self.eyebuffer.put(RenderedFrame {
            swapchain_indices: [left, right],
            swap_indices: [slot, slot],
            render_pose: cursor.prev_pose,
            sample_time: cursor.sample_time,
            render_time: self.clock.now(),
        });

        cursor.buffer_to_use = if slot == 0 { 1 } else { 0 };
    }

    pub fn get_vsync_ns(&self) -> i64 {
        let target = self
            .vsync_estimate
            .get_ro_nullable()
            .unwrap_or_else(|| self.clock.now() + self.frame_period);
        target.as_nanos()
    }

    pub fn get_now_ns(&self) -> i64 {
        self.clock.now().as_nanos()
    }
}

impl Plugin for Bridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("Plugin `{}` started", self.name);
        }
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Plugin `{}` stopped", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServices;

    fn bridge(services: &MockServices) -> Bridge {
        Bridge::new(services, &DisplayParams::default()).unwrap()
    }

    fn slow_pose(tick: i64) -> Pose {
        Pose {
            sensor_time: TimePoint::from_nanos(tick),
            ..Default::default()
        }
    }

    #[test]
    fn buffer_slots_alternate_from_zero() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        for _ in 0..5 {
            bridge.write_frame(10, 11);
        }

        let slots: Vec<_> = services
            .switchboard
            .frames(EYEBUFFER_TOPIC)
            .iter()
            .map(|frame| frame.swap_indices)
            .collect();
        assert_eq!(slots, vec![[0, 0], [1, 1], [0, 0], [1, 1], [0, 0]]);
    }

    #[test]
    fn frame_carries_the_pose_that_was_read() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        let fast_pose = FastPose {
            pose: Pose {
                sensor_time: TimePoint::from_nanos(5),
                position: [1.0, 2.0, 3.0],
                orientation: [0.0, 0.7071, 0.0, 0.7071],
            },
            predict_computed_time: TimePoint::from_nanos(6),
            predict_target_time: TimePoint::from_nanos(7),
        };
        services.pose_prediction.set_fast_pose(fast_pose);
        services.clock.set(TimePoint::from_nanos(1_000));

        let pose = bridge.read_pose();
        assert_eq!(pose.position, XrtVec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            pose.orientation,
            XrtQuat {
                x: 0.0,
                y: 0.7071,
                z: 0.0,
                w: 0.7071
            }
        );

        // The predictor moves on and time passes before the frame is written.
        services.pose_prediction.set_fast_pose(FastPose::default());
        services.clock.set(TimePoint::from_nanos(50_000_000));
        bridge.write_frame(1, 2);

        let frames = services.switchboard.frames(EYEBUFFER_TOPIC);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].render_pose, fast_pose);
        assert_eq!(frames[0].sample_time, TimePoint::from_nanos(1_000));
        assert_eq!(frames[0].render_time, TimePoint::from_nanos(50_000_000));
        assert_eq!(frames[0].swapchain_indices, [1, 2]);
    }

    #[test]
    fn write_before_read_uses_default_pose() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        bridge.write_frame(0, 0);

        let frames = services.switchboard.frames(EYEBUFFER_TOPIC);
        assert_eq!(frames[0].render_pose, FastPose::default());
        assert_eq!(frames[0].sample_time, TimePoint::default());
    }

    #[test]
    fn no_slow_pose_means_prediction() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::PredictionGen);
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::PredictionGen);
    }

    #[test]
    fn keyframe_only_when_slow_pose_tick_advances() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services.switchboard.publish_pose(SLOW_POSE_TOPIC, slow_pose(100));
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::KeyframeGen);
        // Same tick again.
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::PredictionGen);

        services.switchboard.publish_pose(SLOW_POSE_TOPIC, slow_pose(99));
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::PredictionGen);

        services.switchboard.publish_pose(SLOW_POSE_TOPIC, slow_pose(101));
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::KeyframeGen);
    }

    #[test]
    fn first_slow_pose_at_tick_zero_is_a_keyframe() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services.switchboard.publish_pose(SLOW_POSE_TOPIC, slow_pose(0));
        assert_eq!(bridge.read_pose().pose_type, XrtPoseType::KeyframeGen);
    }

    #[test]
    fn unreliable_pose_is_still_returned() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services.pose_prediction.set_reliable(false);
        services.pose_prediction.set_fast_pose(FastPose {
            pose: Pose {
                position: [0.5, 0.0, 0.0],
                ..Default::default()
            },
            ..Default::default()
        });

        assert_eq!(bridge.read_pose().position.x, 0.5);
    }

    #[test]
    fn vsync_falls_back_to_one_frame_from_now() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services.clock.set(TimePoint::from_nanos(1_000_000));
        let period = DisplayParams::default().period().as_nanos() as i64;
        assert_eq!(bridge.get_vsync_ns(), 1_000_000 + period);
    }

    #[test]
    fn vsync_uses_published_estimate() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services
            .switchboard
            .publish_time(VSYNC_ESTIMATE_TOPIC, TimePoint::from_nanos(123_456_789));
        assert_eq!(bridge.get_vsync_ns(), 123_456_789);
    }

    #[test]
    fn now_reads_the_runtime_clock() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        services.clock.set(TimePoint::from_nanos(77));
        assert_eq!(bridge.get_now_ns(), 77);
    }

    #[test]
    fn missing_services_are_reported() {
        let services = MockServices::new().without_pose_prediction();
        let err = Bridge::new(&services, &DisplayParams::default()).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::Service(ServiceError::Missing("pose_prediction"))
        ));
    }

    #[test]
    fn missing_switchboard_is_reported() {
        let services = MockServices::new().without_switchboard();
        let err = Bridge::new(&services, &DisplayParams::default()).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::Service(ServiceError::Missing("switchboard"))
        ));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let services = MockServices::new();
        let bridge = bridge(&services);

        bridge.start();
        bridge.start();
        assert!(bridge.running.load(Ordering::Acquire));
        bridge.stop();
        bridge.stop();
        assert!(!bridge.running.load(Ordering::Acquire));
        assert_eq!(bridge.name(), PLUGIN_NAME);
    }
}

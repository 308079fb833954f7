//! The runtime capabilities the bridge depends on.

pub mod ffi;

use std::sync::Arc;

use thiserror::Error;

use crate::runtime_interfaces::{FastPose, Pose, RenderedFrame};
use crate::time::TimePoint;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service `{0}` is not registered")]
    Missing(&'static str),
    #[error("switchboard refused topic `{0}`")]
    Topic(String),
}

/// Non-blocking view of the latest event on a topic.
pub trait Reader<E>: Send + Sync {
    fn get_ro_nullable(&self) -> Option<E>;
}

pub trait Writer<E>: Send + Sync {
    fn put(&self, event: E);
}

/// Publish/subscribe hub. Readers and writers do their own synchronisation.
pub trait Switchboard: Send + Sync {
    fn get_frame_writer(&self, topic: &str) -> Result<Box<dyn Writer<RenderedFrame>>, ServiceError>;

    fn get_time_reader(&self, topic: &str) -> Result<Box<dyn Reader<TimePoint>>, ServiceError>;

    fn get_pose_reader(&self, topic: &str) -> Result<Box<dyn Reader<Pose>>, ServiceError>;
}

pub trait PosePrediction: Send + Sync {
    fn fast_pose_reliable(&self) -> bool;

    fn get_fast_pose(&self) -> FastPose;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> TimePoint;
}

/// Service registry the runtime passes to plugin factories.
pub trait Phonebook {
    fn lookup_switchboard(&self) -> Option<Arc<dyn Switchboard>>;

    fn lookup_pose_prediction(&self) -> Option<Arc<dyn PosePrediction>>;

    fn lookup_clock(&self) -> Option<Arc<dyn Clock>>;
}

/// Lifecycle the runtime drives on its plugins.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self);

    fn stop(&self);
}

/// The host's own monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_nanos(crate::time::monotonic_now_ns())
    }
}

//! Adapters from the runtime's raw capability tables to the service traits.

use std::ffi::CString;
use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::sync::Arc;

use crate::runtime_interfaces::*;
use crate::time::TimePoint;

use super::{Clock, Phonebook, PosePrediction, Reader, ServiceError, Switchboard, Writer};

/// Registry handed to `illixr_monado_create_plugin`.
pub struct FfiRegistry {
    raw: RawRegistry,
}

impl FfiRegistry {
    /// # Safety
    ///
    /// `raw` must be null or point to a registry whose services stay valid for the rest of the
    /// process.
    pub unsafe fn from_raw(raw: *const RawRegistry) -> Option<Self> {
        raw.as_ref().map(|raw| FfiRegistry { raw: *raw })
    }
}

impl Phonebook for FfiRegistry {
    fn lookup_switchboard(&self) -> Option<Arc<dyn Switchboard>> {
        let raw = unsafe { (self.raw.switchboard)(self.raw.ctx).as_ref() }?;
        Some(Arc::new(FfiSwitchboard { raw: *raw }))
    }

    fn lookup_pose_prediction(&self) -> Option<Arc<dyn PosePrediction>> {
        let raw = unsafe { (self.raw.pose_prediction)(self.raw.ctx).as_ref() }?;
        Some(Arc::new(FfiPosePrediction { raw: *raw }))
    }

    fn lookup_clock(&self) -> Option<Arc<dyn Clock>> {
        let raw = unsafe { (self.raw.clock)(self.raw.ctx).as_ref() }?;
        Some(Arc::new(FfiClock { raw: *raw }))
    }
}

struct FfiSwitchboard {
    raw: RawSwitchboard,
}

// The runtime's switchboard is internally synchronised.
unsafe impl Send for FfiSwitchboard {}
unsafe impl Sync for FfiSwitchboard {}

impl FfiSwitchboard {
    fn reader<E: Copy + Send + 'static>(&self, topic: &str) -> Result<FfiReader<E>, ServiceError> {
        let c_topic = CString::new(topic).map_err(|_| ServiceError::Topic(topic.to_owned()))?;
        let mut raw = MaybeUninit::<RawReader>::uninit();
        let ok = unsafe {
            (self.raw.get_reader)(self.raw.ctx, c_topic.as_ptr(), size_of::<E>(), raw.as_mut_ptr())
        };
        if !ok {
            return Err(ServiceError::Topic(topic.to_owned()));
        }
        Ok(FfiReader {
            raw: unsafe { raw.assume_init() },
            _event: PhantomData,
        })
    }

    fn writer<E: Copy + Send + 'static>(&self, topic: &str) -> Result<FfiWriter<E>, ServiceError> {
        let c_topic = CString::new(topic).map_err(|_| ServiceError::Topic(topic.to_owned()))?;
        let mut raw = MaybeUninit::<RawWriter>::uninit();
        let ok = unsafe {
            (self.raw.get_writer)(self.raw.ctx, c_topic.as_ptr(), size_of::<E>(), raw.as_mut_ptr())
        };
        if !ok {
            return Err(ServiceError::Topic(topic.to_owned()));
        }
        Ok(FfiWriter {
            raw: unsafe { raw.assume_init() },
            _event: PhantomData,
        })
    }
}

impl Switchboard for FfiSwitchboard {
    fn get_frame_writer(&self, topic: &str) -> Result<Box<dyn Writer<RenderedFrame>>, ServiceError> {
        Ok(Box::new(self.writer::<RenderedFrame>(topic)?))
    }

    fn get_time_reader(&self, topic: &str) -> Result<Box<dyn Reader<TimePoint>>, ServiceError> {
        Ok(Box::new(self.reader::<TimePoint>(topic)?))
    }

    fn get_pose_reader(&self, topic: &str) -> Result<Box<dyn Reader<Pose>>, ServiceError> {
        Ok(Box::new(self.reader::<Pose>(topic)?))
    }
}

struct FfiReader<E> {
    raw: RawReader,
    _event: PhantomData<fn() -> E>,
}

unsafe impl<E> Send for FfiReader<E> {}
unsafe impl<E> Sync for FfiReader<E> {}

impl<E: Copy> Reader<E> for FfiReader<E> {
    fn get_ro_nullable(&self) -> Option<E> {
        let mut event = MaybeUninit::<E>::uninit();
        let published = unsafe { (self.raw.get_ro_nullable)(self.raw.ctx, event.as_mut_ptr().cast()) };
        if published {
            Some(unsafe { event.assume_init() })
        } else {
            None
        }
    }
}

impl<E> Drop for FfiReader<E> {
    fn drop(&mut self) {
        unsafe { (self.raw.release)(self.raw.ctx) }
    }
}

struct FfiWriter<E> {
    raw: RawWriter,
    _event: PhantomData<fn(E)>,
}

unsafe impl<E> Send for FfiWriter<E> {}
unsafe impl<E> Sync for FfiWriter<E> {}

impl<E: Copy> Writer<E> for FfiWriter<E> {
    fn put(&self, event: E) {
        unsafe { (self.raw.put)(self.raw.ctx, (&event as *const E).cast()) }
    }
}

impl<E> Drop for FfiWriter<E> {
    fn drop(&mut self) {
        unsafe { (self.raw.release)(self.raw.ctx) }
    }
}

struct FfiPosePrediction {
    raw: RawPosePrediction,
}

unsafe impl Send for FfiPosePrediction {}
unsafe impl Sync for FfiPosePrediction {}

impl PosePrediction for FfiPosePrediction {
    fn fast_pose_reliable(&self) -> bool {
        unsafe { (self.raw.fast_pose_reliable)(self.raw.ctx) }
    }

    fn get_fast_pose(&self) -> FastPose {
        let mut pose = FastPose::default();
        unsafe { (self.raw.get_fast_pose)(self.raw.ctx, &mut pose) };
        pose
    }
}

struct FfiClock {
    raw: RawClock,
}

unsafe impl Send for FfiClock {}
unsafe impl Sync for FfiClock {}

impl Clock for FfiClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_nanos(unsafe { (self.raw.now)(self.raw.ctx) })
    }
}

//! In-memory runtime services and a recording runtime, for tests.

use std::collections::HashMap;
use std::ffi::CStr;
use std::mem::size_of;
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::graphics::GraphicsContext;
use crate::loader::{LaunchError, Runtime, RuntimeModule, RuntimeProvider};
use crate::runtime_interfaces::*;
use crate::services::*;
use crate::time::TimePoint;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Topics {
    times: Mutex<HashMap<String, TimePoint>>,
    poses: Mutex<HashMap<String, Pose>>,
    frames: Mutex<HashMap<String, Vec<RenderedFrame>>>,
}

/// Keeps the latest value per topic and every frame ever written.
#[derive(Default, Clone)]
pub struct MockSwitchboard {
    topics: Arc<Topics>,
}

impl MockSwitchboard {
    pub fn publish_time(&self, topic: &str, time: TimePoint) {
        lock(&self.topics.times).insert(topic.to_owned(), time);
    }

    pub fn publish_pose(&self, topic: &str, pose: Pose) {
        lock(&self.topics.poses).insert(topic.to_owned(), pose);
    }

    pub fn frames(&self, topic: &str) -> Vec<RenderedFrame> {
        lock(&self.topics.frames)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    fn latest_time(&self, topic: &str) -> Option<TimePoint> {
        lock(&self.topics.times).get(topic).copied()
    }

    fn latest_pose(&self, topic: &str) -> Option<Pose> {
        lock(&self.topics.poses).get(topic).copied()
    }

    fn record_frame(&self, topic: &str, frame: RenderedFrame) {
        lock(&self.topics.frames)
            .entry(topic.to_owned())
            .or_default()
            .push(frame);
    }
}

struct TopicReader<E> {
    board: MockSwitchboard,
    topic: String,
    read: fn(&MockSwitchboard, &str) -> Option<E>,
}

impl<E: Send> Reader<E> for TopicReader<E> {
    fn get_ro_nullable(&self) -> Option<E> {
        (self.read)(&self.board, &self.topic)
    }
}

struct FrameWriter {
    board: MockSwitchboard,
    topic: String,
}

impl Writer<RenderedFrame> for FrameWriter {
    fn put(&self, event: RenderedFrame) {
        self.board.record_frame(&self.topic, event)
    }
}

impl Switchboard for MockSwitchboard {
    fn get_frame_writer(&self, topic: &str) -> Result<Box<dyn Writer<RenderedFrame>>, ServiceError> {
        Ok(Box::new(FrameWriter {
            board: self.clone(),
            topic: topic.to_owned(),
        }))
    }

    fn get_time_reader(&self, topic: &str) -> Result<Box<dyn Reader<TimePoint>>, ServiceError> {
        Ok(Box::new(TopicReader {
            board: self.clone(),
            topic: topic.to_owned(),
            read: MockSwitchboard::latest_time,
        }))
    }

    fn get_pose_reader(&self, topic: &str) -> Result<Box<dyn Reader<Pose>>, ServiceError> {
        Ok(Box::new(TopicReader {
            board: self.clone(),
            topic: topic.to_owned(),
            read: MockSwitchboard::latest_pose,
        }))
    }
}

pub struct MockPosePrediction {
    fast_pose: Mutex<FastPose>,
    reliable: AtomicBool,
}

impl Default for MockPosePrediction {
    fn default() -> Self {
        MockPosePrediction {
            fast_pose: Mutex::new(FastPose::default()),
            reliable: AtomicBool::new(true),
        }
    }
}

impl MockPosePrediction {
    pub fn set_fast_pose(&self, pose: FastPose) {
        *lock(&self.fast_pose) = pose;
    }

    pub fn set_reliable(&self, reliable: bool) {
        self.reliable.store(reliable, Ordering::Release);
    }
}

impl PosePrediction for MockPosePrediction {
    fn fast_pose_reliable(&self) -> bool {
        self.reliable.load(Ordering::Acquire)
    }

    fn get_fast_pose(&self) -> FastPose {
        *lock(&self.fast_pose)
    }
}

#[derive(Default)]
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    pub fn set(&self, now: TimePoint) {
        self.now.store(now.as_nanos(), Ordering::Release);
    }
}

impl Clock for MockClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_nanos(self.now.load(Ordering::Acquire))
    }
}

/// A registry with all three services, any of which can be withheld.
#[derive(Clone)]
pub struct MockServices {
    pub switchboard: Arc<MockSwitchboard>,
    pub pose_prediction: Arc<MockPosePrediction>,
    pub clock: Arc<MockClock>,
    registered: [bool; 3],
}

impl MockServices {
    pub fn new() -> Self {
        MockServices {
            switchboard: Default::default(),
            pose_prediction: Default::default(),
            clock: Default::default(),
            registered: [true; 3],
        }
    }

    pub fn without_switchboard(mut self) -> Self {
        self.registered[0] = false;
        self
    }

    pub fn without_pose_prediction(mut self) -> Self {
        self.registered[1] = false;
        self
    }

    pub fn without_clock(mut self) -> Self {
        self.registered[2] = false;
        self
    }
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

impl Phonebook for MockServices {
    fn lookup_switchboard(&self) -> Option<Arc<dyn Switchboard>> {
        self.registered[0].then(|| self.switchboard.clone() as Arc<dyn Switchboard>)
    }

    fn lookup_pose_prediction(&self) -> Option<Arc<dyn PosePrediction>> {
        self.registered[1].then(|| self.pose_prediction.clone() as Arc<dyn PosePrediction>)
    }

    fn lookup_clock(&self) -> Option<Arc<dyn Clock>> {
        self.registered[2].then(|| self.clock.clone() as Arc<dyn Clock>)
    }
}

struct RawTables {
    services: MockServices,
    registry: RawRegistry,
    switchboard: RawSwitchboard,
    pose_prediction: RawPosePrediction,
    clock: RawClock,
}

/// [`MockServices`] behind the runtime's C tables, as the runtime would hand them over.
pub struct RawServices {
    tables: Box<RawTables>,
}

impl RawServices {
    pub fn new(services: &MockServices) -> Self {
        let services = services.clone();
        let mut tables = Box::new(RawTables {
            registry: RawRegistry {
                ctx: std::ptr::null_mut(),
                switchboard: registry_switchboard,
                pose_prediction: registry_pose_prediction,
                clock: registry_clock,
            },
            switchboard: RawSwitchboard {
                ctx: Arc::as_ptr(&services.switchboard) as *mut c_void,
                get_reader: switchboard_get_reader,
                get_writer: switchboard_get_writer,
            },
            pose_prediction: RawPosePrediction {
                ctx: Arc::as_ptr(&services.pose_prediction) as *mut c_void,
                fast_pose_reliable: pose_reliable,
                get_fast_pose: pose_get_fast_pose,
            },
            clock: RawClock {
                ctx: Arc::as_ptr(&services.clock) as *mut c_void,
                now: clock_now,
            },
            services,
        });
        tables.registry.ctx = &*tables as *const RawTables as *mut c_void;
        RawServices { tables }
    }

    pub fn registry(&self) -> *const RawRegistry {
        &self.tables.registry
    }
}

unsafe extern "C" fn registry_switchboard(ctx: *mut c_void) -> *const RawSwitchboard {
    let tables = &*(ctx as *const RawTables);
    if tables.services.registered[0] {
        &tables.switchboard
    } else {
        std::ptr::null()
    }
}

unsafe extern "C" fn registry_pose_prediction(ctx: *mut c_void) -> *const RawPosePrediction {
    let tables = &*(ctx as *const RawTables);
    if tables.services.registered[1] {
        &tables.pose_prediction
    } else {
        std::ptr::null()
    }
}

unsafe extern "C" fn registry_clock(ctx: *mut c_void) -> *const RawClock {
    let tables = &*(ctx as *const RawTables);
    if tables.services.registered[2] {
        &tables.clock
    } else {
        std::ptr::null()
    }
}

struct RawTopic {
    board: MockSwitchboard,
    topic: String,
    event_size: usize,
}

unsafe fn open_topic(ctx: *mut c_void, topic: *const c_char, event_size: usize) -> *mut c_void {
    let board = (*(ctx as *const MockSwitchboard)).clone();
    let topic = CStr::from_ptr(topic).to_string_lossy().into_owned();
    Box::into_raw(Box::new(RawTopic {
        board,
        topic,
        event_size,
    }))
    .cast()
}

unsafe extern "C" fn switchboard_get_reader(
    ctx: *mut c_void,
    topic: *const c_char,
    event_size: usize,
    out: *mut RawReader,
) -> bool {
    if event_size != size_of::<TimePoint>() && event_size != size_of::<Pose>() {
        return false;
    }
    out.write(RawReader {
        ctx: open_topic(ctx, topic, event_size),
        get_ro_nullable: reader_get_ro_nullable,
        release: release_topic,
    });
    true
}

unsafe extern "C" fn switchboard_get_writer(
    ctx: *mut c_void,
    topic: *const c_char,
    event_size: usize,
    out: *mut RawWriter,
) -> bool {
    if event_size != size_of::<RenderedFrame>() {
        return false;
    }
    out.write(RawWriter {
        ctx: open_topic(ctx, topic, event_size),
        put: writer_put,
        release: release_topic,
    });
    true
}

unsafe extern "C" fn reader_get_ro_nullable(ctx: *mut c_void, out: *mut c_void) -> bool {
    let topic = &*(ctx as *const RawTopic);
    if topic.event_size == size_of::<TimePoint>() {
        match topic.board.latest_time(&topic.topic) {
            Some(time) => {
                out.cast::<TimePoint>().write(time);
                true
            }
            None => false,
        }
    } else {
        match topic.board.latest_pose(&topic.topic) {
            Some(pose) => {
                out.cast::<Pose>().write(pose);
                true
            }
            None => false,
        }
    }
}

unsafe extern "C" fn writer_put(ctx: *mut c_void, event: *const c_void) {
    let topic = &*(ctx as *const RawTopic);
    topic
        .board
        .record_frame(&topic.topic, event.cast::<RenderedFrame>().read());
}

unsafe extern "C" fn release_topic(ctx: *mut c_void) {
    drop(Box::from_raw(ctx as *mut RawTopic));
}

unsafe extern "C" fn pose_reliable(ctx: *mut c_void) -> bool {
    (*(ctx as *const MockPosePrediction)).fast_pose_reliable()
}

unsafe extern "C" fn pose_get_fast_pose(ctx: *mut c_void, out: *mut FastPose) {
    out.write((*(ctx as *const MockPosePrediction)).get_fast_pose());
}

unsafe extern "C" fn clock_now(ctx: *mut c_void) -> i64 {
    (*(ctx as *const MockClock)).now().as_nanos()
}

/// Everything a mock runtime was asked to do.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RuntimeLog {
    pub opened: Vec<PathBuf>,
    pub contexts: Vec<usize>,
    pub plugin_lists: Vec<Vec<String>>,
    pub factories: usize,
    pub stops: usize,
    pub drops: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Open,
    LoadSo,
}

#[derive(Default, Clone)]
pub struct MockRuntimeProvider {
    log: Arc<Mutex<RuntimeLog>>,
    failure: Option<Failure>,
}

impl MockRuntimeProvider {
    pub fn failing_open() -> Self {
        MockRuntimeProvider {
            failure: Some(Failure::Open),
            ..Default::default()
        }
    }

    pub fn failing_load_so() -> Self {
        MockRuntimeProvider {
            failure: Some(Failure::LoadSo),
            ..Default::default()
        }
    }

    pub fn log(&self) -> RuntimeLog {
        lock(&self.log).clone()
    }
}

impl RuntimeProvider for MockRuntimeProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, LaunchError> {
        lock(&self.log).opened.push(path.to_owned());
        if self.failure == Some(Failure::Open) {
            return Err(LaunchError::Rejected(format!("module {}", path.display())));
        }
        Ok(Box::new(MockModule {
            log: self.log.clone(),
            failure: self.failure,
        }))
    }
}

struct MockModule {
    log: Arc<Mutex<RuntimeLog>>,
    failure: Option<Failure>,
}

impl RuntimeModule for MockModule {
    fn create_runtime(&self, context: GraphicsContext) -> Result<Box<dyn Runtime>, LaunchError> {
        lock(&self.log).contexts.push(context.as_ptr() as usize);
        Ok(Box::new(MockRuntime {
            log: self.log.clone(),
            failure: self.failure,
        }))
    }
}

impl Drop for MockModule {
    fn drop(&mut self) {
        lock(&self.log).drops.push("module");
    }
}

struct MockRuntime {
    log: Arc<Mutex<RuntimeLog>>,
    failure: Option<Failure>,
}

impl Runtime for MockRuntime {
    fn load_so(&mut self, paths: &[String]) -> Result<(), LaunchError> {
        lock(&self.log).plugin_lists.push(paths.to_vec());
        if self.failure == Some(Failure::LoadSo) {
            return Err(LaunchError::Rejected(format!("plugins {:?}", paths)));
        }
        Ok(())
    }

    fn load_plugin_factory(&mut self, _factory: PluginFactory) -> Result<(), LaunchError> {
        lock(&self.log).factories += 1;
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.log).stops += 1;
    }
}

impl Drop for MockRuntime {
    fn drop(&mut self) {
        lock(&self.log).drops.push("runtime");
    }
}

#[repr(C)]
struct RecordingRuntime {
    table: RawRuntime,
    log: Arc<Mutex<RuntimeLog>>,
}

/// A runtime table as a loaded module would return it from its factory.
pub fn raw_runtime() -> (*mut RawRuntime, Arc<Mutex<RuntimeLog>>) {
    let log = Arc::new(Mutex::new(RuntimeLog::default()));
    let runtime = Box::into_raw(Box::new(RecordingRuntime {
        table: RawRuntime {
            ctx: std::ptr::null_mut(),
            load_so: raw_load_so,
            load_plugin_factory: raw_load_plugin_factory,
            stop: raw_stop,
            destroy: raw_destroy,
        },
        log: log.clone(),
    }));
    unsafe { (*runtime).table.ctx = runtime.cast() };
    (runtime.cast(), log)
}

unsafe fn raw_log<'a>(ctx: *mut c_void) -> &'a Mutex<RuntimeLog> {
    &(*(ctx as *const RecordingRuntime)).log
}

unsafe extern "C" fn raw_load_so(ctx: *mut c_void, paths: *const *const c_char, count: usize) -> bool {
    let paths = std::slice::from_raw_parts(paths, count)
        .iter()
        .map(|path| CStr::from_ptr(*path).to_string_lossy().into_owned())
        .collect();
    lock(raw_log(ctx)).plugin_lists.push(paths);
    true
}

unsafe extern "C" fn raw_load_plugin_factory(ctx: *mut c_void, _factory: PluginFactory) -> bool {
    lock(raw_log(ctx)).factories += 1;
    true
}

unsafe extern "C" fn raw_stop(ctx: *mut c_void) {
    lock(raw_log(ctx)).stops += 1;
}

// `ctx` is the table's own allocation.
unsafe extern "C" fn raw_destroy(ctx: *mut c_void) {
    let runtime = Box::from_raw(ctx as *mut RecordingRuntime);
    lock(&runtime.log).drops.push("runtime");
}

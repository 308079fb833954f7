use std::ffi::CStr;

use driver_core::bridge;
use driver_core::host_interfaces::*;
use driver_core::mock::{MockServices, RawServices};
use driver_core::runtime_interfaces::*;
use driver_core::time::TimePoint;
use driver_core::wrappers;
use driver_entry::*;

fn cstr(bytes: &'static [u8]) -> &'static CStr {
    CStr::from_bytes_with_nul(bytes).unwrap()
}

fn untouched() -> (i64, XrtSpaceRelation) {
    let relation = XrtSpaceRelation {
        relation_flags: XrtSpaceRelationFlags::POSITION_TRACKED,
        linear_velocity: XrtVec3::new(9.0, 9.0, 9.0),
        ..Default::default()
    };
    (-1, relation)
}

unsafe fn tracked_pose(xdev: *mut XrtDevice, name: XrtInputName) -> (i64, XrtSpaceRelation) {
    let (mut timestamp, mut relation) = untouched();
    ((*xdev).get_tracked_pose.unwrap())(
        xdev,
        name,
        std::ptr::null_mut(),
        &mut timestamp,
        &mut relation,
    );
    (timestamp, relation)
}

unsafe fn tracked_head_pose(xdev: *mut XrtDevice) -> (i64, XrtSpaceRelation) {
    tracked_pose(xdev, XrtInputName::GENERIC_HEAD_POSE)
}

unsafe fn set_output(xdev: *mut XrtDevice) {
    let mut value = XrtOutputValue::default();
    ((*xdev).set_output.unwrap())(xdev, XrtOutputName(0), std::ptr::null_mut(), &mut value);
}

unsafe fn destroy(xdev: *mut XrtDevice) {
    ((*xdev).destroy.unwrap())(xdev);
    assert!(!wrappers::is_registered(xdev));
}

// The bridge is process-wide, so the whole lifecycle runs as one test.
#[test]
fn bridge_and_device_lifecycle() {
    let services = MockServices::new();
    let raw = RawServices::new(&services);

    let plugin = unsafe { illixr_monado_create_plugin(raw.registry()) };
    assert!(!plugin.is_null());
    unsafe {
        assert_eq!(CStr::from_ptr((*plugin).name), cstr(b"illixr_plugin\0"));
        ((*plugin).start)(plugin);
    }
    assert!(bridge::instance().is_some());

    let fast_pose = FastPose {
        pose: Pose {
            sensor_time: TimePoint::from_nanos(10),
            position: [0.5, 1.5, -2.0],
            orientation: [0.0, 0.0, 0.38268343, 0.9238795],
        },
        predict_computed_time: TimePoint::from_nanos(900),
        predict_target_time: TimePoint::from_nanos(1_100),
    };
    services.pose_prediction.set_fast_pose(fast_pose);
    services.clock.set(TimePoint::from_nanos(1_000));

    let pose = illixr_read_pose();
    assert_eq!(pose.position, XrtVec3::new(0.5, 1.5, -2.0));
    assert_eq!(pose.orientation.z, 0.38268343);
    assert_eq!(pose.orientation.w, 0.9238795);
    assert_eq!(pose.pose_type, XrtPoseType::PredictionGen);

    services.clock.set(TimePoint::from_nanos(2_000));
    illixr_write_frame(3, 4);
    illixr_write_frame(5, 6);
    let frames = services.switchboard.frames(EYEBUFFER_TOPIC);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].swapchain_indices, [3, 4]);
    assert_eq!(frames[0].swap_indices, [0, 0]);
    assert_eq!(frames[0].render_pose, fast_pose);
    assert_eq!(frames[0].sample_time, TimePoint::from_nanos(1_000));
    assert_eq!(frames[0].render_time, TimePoint::from_nanos(2_000));
    assert_eq!(frames[1].swap_indices, [1, 1]);

    assert_eq!(illixr_get_now_ns(), 2_000);
    services
        .switchboard
        .publish_time(VSYNC_ESTIMATE_TOPIC, TimePoint::from_nanos(8_333_333));
    assert_eq!(illixr_get_vsync_ns(), 8_333_333);

    // A device that never launches reads poses straight from the bridge.
    let xdev = unsafe {
        illixr_hmd_create(
            cstr(b"/nonexistent/libillixr_runtime.so\0").as_ptr(),
            cstr(b"a.so:b.so\0").as_ptr(),
        )
    };
    assert!(!xdev.is_null());
    unsafe {
        assert_eq!(CStr::from_ptr((*xdev).str.as_ptr()), cstr(b"ILLIXR\0"));
        assert_eq!((*xdev).num_inputs, 1);
        assert_eq!((*(*xdev).inputs).name, XrtInputName::GENERIC_HEAD_POSE);
        assert_eq!((*(*xdev).hmd).screens[0].w_pixels, 2560);

        let mut view = XrtPose::default();
        ((*xdev).get_view_pose.unwrap())(xdev, &XrtVec3::new(0.064, 0.0, 0.0), 0, &mut view);
        assert_eq!(view.position.x, -0.032);

        let (timestamp, relation) = tracked_head_pose(xdev);
        assert!(timestamp > 0);
        assert_eq!(relation.pose.position, XrtVec3::new(0.5, 1.5, -2.0));
        assert!(relation
            .relation_flags
            .contains(XrtSpaceRelationFlags::ORIENTATION_VALID | XrtSpaceRelationFlags::POSITION_VALID));

        // Only the head pose is served; other inputs leave the outputs as they were.
        let hand = XrtInputName::new(0x0001, XRT_INPUT_TYPE_POSE);
        assert_eq!(tracked_pose(xdev, hand), untouched());

        // The runtime module cannot be opened; the device is torn down and stops answering.
        set_output(xdev);
        assert_eq!(tracked_head_pose(xdev), untouched());

        destroy(xdev);
    }

    unsafe { ((*plugin).destroy)(plugin) };
    assert!(bridge::instance().is_none());
}

#[test]
fn null_arguments_create_no_device() {
    let xdev = unsafe { illixr_hmd_create(std::ptr::null(), cstr(b"a.so\0").as_ptr()) };
    assert!(xdev.is_null());
}

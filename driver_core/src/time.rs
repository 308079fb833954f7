use std::ops::Add;
use std::time::Duration;

/// Nanoseconds since the runtime clock's epoch.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(i64);

impl TimePoint {
    pub const fn from_nanos(nanos: i64) -> Self {
        TimePoint(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Duration) -> TimePoint {
        let rhs = i64::try_from(rhs.as_nanos()).unwrap_or(i64::MAX);
        TimePoint(self.0.saturating_add(rhs))
    }
}

/// Host monotonic time, the same source the host's timekeeping is built on.
pub fn monotonic_now_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid pointer.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as i64)
        .saturating_mul(1_000_000_000)
        .saturating_add(ts.tv_nsec as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_a_frame_period() {
        let t = TimePoint::from_nanos(1_000) + Duration::from_nanos(8_333_333);
        assert_eq!(t.as_nanos(), 8_334_333);
    }

    #[test]
    fn addition_saturates() {
        let t = TimePoint::from_nanos(i64::MAX - 1) + Duration::from_secs(1);
        assert_eq!(t.as_nanos(), i64::MAX);
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let a = monotonic_now_ns();
        let b = monotonic_now_ns();
        assert!(b >= a);
        assert!(a > 0);
    }
}

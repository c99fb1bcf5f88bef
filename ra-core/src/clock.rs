//! Wall-clock abstraction.
//!
//! The RA algorithm only needs a monotonically-reasonable source of
//! wall-time seconds to stamp requests and to decide when timers have
//! elapsed. [`RefClock`] exists so that tests can drive time forward
//! deterministically instead of sleeping through 10s/15s real-time
//! windows.
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in wall-clock time, expressed as fractional seconds since
/// the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    pub fn elapsed_since(&self, other: Timestamp) -> f64 {
        self.0 - other.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system clock, backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(d.as_secs_f64())
    }
}

/// A shared, swappable clock handle.
///
/// In production this simply delegates to [`SystemClock`]. Tests can
/// construct a [`RefClock`] over a fake [`Clock`] and advance it
/// explicitly, letting timeout-driven behavior (reply deadlines,
/// heartbeat pruning, CS auto-release) be exercised without real
/// delays.
#[derive(Clone)]
pub struct RefClock(Arc<Mutex<Box<dyn Clock>>>);

impl RefClock {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(clock))))
    }

    pub fn system() -> Self {
        Self::new(SystemClock)
    }

    pub fn now(&self) -> Timestamp {
        self.0.lock().unwrap().now()
    }
}

impl std::fmt::Debug for RefClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefClock(..)")
    }
}

/// A fake clock for tests: holds an explicit time that only advances
/// when told to.
#[derive(Debug, Default)]
pub struct FakeClock(Mutex<f64>);

impl FakeClock {
    pub fn new(start: f64) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, secs: f64) {
        *self.0.lock().unwrap() += secs;
    }

    pub fn set(&self, secs: f64) {
        *self.0.lock().unwrap() = secs;
    }
}

impl Clock for Arc<FakeClock> {
    fn now(&self) -> Timestamp {
        Timestamp(*self.0.lock().unwrap())
    }
}

//! Time source abstraction.
//!
//! All expiration and refresh decisions in this crate are made against a
//! single monotonic nanosecond timeline. Wall-clock time is captured only as
//! a diagnostic (entry creation timestamps exposed through snapshots); it is
//! never compared against the monotonic timeline.
//!
//! A [`Clock`] is cheap to clone and is shared by the cache facade, the
//! entry store and the maintenance scheduler. Tests that exercise
//! time-dependent behavior can install a manual clock and advance it
//! explicitly instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic nanosecond value used for "never expires".
pub(crate) const NO_EXPIRY: u64 = u64::MAX;

/// The cache's time source.
///
/// The default clock anchors an [`Instant`] at construction and reports
/// monotonic nanoseconds elapsed since that anchor. A manual clock backed by
/// an atomic counter can be created with [`Clock::manual`] for tests.
#[derive(Clone, Debug)]
pub struct Clock {
    source: Source,
}

#[derive(Clone, Debug)]
enum Source {
    System { anchor: Instant },
    Manual(Arc<AtomicU64>),
}

impl Clock {
    /// Creates a clock backed by the system's monotonic timer.
    pub fn system() -> Self {
        Clock {
            source: Source::System {
                anchor: Instant::now(),
            },
        }
    }

    /// Creates a manually driven clock, paired with the handle used to
    /// advance it. The clock starts at zero nanoseconds.
    pub fn manual() -> (Self, ManualClock) {
        let ticks = Arc::new(AtomicU64::new(0));
        let clock = Clock {
            source: Source::Manual(Arc::clone(&ticks)),
        };
        (clock, ManualClock { ticks })
    }

    /// Returns the current monotonic timestamp in nanoseconds.
    #[inline]
    pub fn now(&self) -> u64 {
        match &self.source {
            Source::System { anchor } => saturating_nanos(anchor.elapsed()),
            Source::Manual(ticks) => ticks.load(Ordering::Acquire),
        }
    }

    /// Returns the current wall-clock time in nanoseconds since the Unix
    /// epoch. Diagnostic only; expiration never consults this value.
    #[inline]
    pub fn wall_now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(saturating_nanos)
            .unwrap_or(0)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

/// Handle advancing a manual [`Clock`].
///
/// Cloning the handle is allowed; all clones drive the same timeline.
#[derive(Clone, Debug)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.ticks
            .fetch_add(saturating_nanos(delta), Ordering::AcqRel);
    }

    /// Sets the clock to an absolute nanosecond value.
    ///
    /// The timeline is monotonic; setting a value smaller than the current
    /// one is ignored.
    pub fn set(&self, nanos: u64) {
        self.ticks.fetch_max(nanos, Ordering::AcqRel);
    }
}

#[inline]
fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

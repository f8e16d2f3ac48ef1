use chrono::{DateTime, Utc};

/// Monotonic source of wall-clock time, injectable for test determinism.
///
/// The engine never calls `Utc::now()` directly outside this trait — every
/// component that needs "now" takes an `Arc<dyn Clock>` so tests can freeze
/// or advance time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub use test_support::FakeClock;

/// Deterministic clock used by unit tests and the top-level scenario suite
/// in `tests/engine.rs` — not gated behind `cfg(test)` since integration
/// tests compile against the crate as an ordinary dependency.
pub mod test_support {
    use super::Clock;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    /// Fixed/advanceable clock for deterministic tests.
    pub struct FakeClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FakeClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, delta: chrono::Duration) {
            let mut now = self.now.lock();
            *now += delta;
        }

        pub fn set(&self, at: DateTime<Utc>) {
            *self.now.lock() = at;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fake_clock_advances() {
        let start = Utc::now();
        let clock = FakeClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));
    }
}

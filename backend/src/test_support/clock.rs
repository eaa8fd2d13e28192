//! Controllable clock for datadump and validation tests.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// `2016-01-02T00:00:00Z`, the day after the fixture observations.
pub fn fixture_now() -> DateTime<Utc> {
    crate::test_support::sensor_network::jan_first(0, 0).and_utc() + TimeDelta::days(1)
}

// libs/appointment-cell/src/services/clock.rs
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, PoisonError};

pub use mockable::{Clock, DefaultClock};

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Local wall-clock time used for past and too-soon decisions.
pub fn local_now(clock: &(dyn Clock + Send + Sync)) -> NaiveDateTime {
    clock.local().naive_local()
}

/// A clock that only moves when told to. Holds local wall-clock time.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        let naive = *self.now.lock().unwrap_or_else(PoisonError::into_inner);
        Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive))
    }

    fn utc(&self) -> DateTime<Utc> {
        self.local().with_timezone(&Utc)
    }
}

use std::cmp::Ordering;
use std::fmt;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;

/// Number of 100ns ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Last tick of 9999-12-31.
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// UTC time as 100ns ticks since 0001-01-01 plus a uniquifier that orders
/// entries sharing the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateTimeStamp {
    pub ticks: i64,
    pub uniquifier: u8,
}

impl DateTimeStamp {
    pub const MIN: DateTimeStamp = DateTimeStamp {
        ticks: 0,
        uniquifier: 0,
    };

    pub fn new(
        ticks: i64,
        uniquifier: u8,
    ) -> Self {
        Self { ticks, uniquifier }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        let ticks = UNIX_EPOCH_TICKS
            + time.timestamp() * TICKS_PER_SECOND
            + i64::from(time.timestamp_subsec_nanos() / 100);
        Self { ticks, uniquifier: 0 }
    }

    /// Returns `None` for tick counts outside of years 1..=9999.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !Self::is_valid_ticks(self.ticks) {
            return None;
        }
        let since_epoch = self.ticks - UNIX_EPOCH_TICKS;
        let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
        let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos).single()
    }

    pub fn is_valid_ticks(ticks: i64) -> bool {
        (0..=MAX_TICKS).contains(&ticks)
    }

    /// A stamp strictly greater than `previous`, based on `self`.
    ///
    /// When the clock did not move forward (same tick or backwards), the
    /// previous tick is reused with an incremented uniquifier; on uniquifier
    /// overflow the tick is bumped.
    pub fn after(
        self,
        previous: DateTimeStamp,
    ) -> DateTimeStamp {
        if self.ticks > previous.ticks {
            return DateTimeStamp::new(self.ticks, 0);
        }
        if previous.uniquifier == u8::MAX {
            DateTimeStamp::new(previous.ticks + 1, 0)
        } else {
            DateTimeStamp::new(previous.ticks, previous.uniquifier + 1)
        }
    }
}

impl PartialOrd for DateTimeStamp {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateTimeStamp {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.ticks
            .cmp(&other.ticks)
            .then(self.uniquifier.cmp(&other.uniquifier))
    }
}

impl fmt::Display for DateTimeStamp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.to_datetime() {
            Some(t) => write!(
                f,
                "{}.{:07}",
                t.format("%Y-%m-%d %H:%M:%S"),
                self.ticks.rem_euclid(TICKS_PER_SECOND)
            )?,
            None => write!(f, "ticks:{}", self.ticks)?,
        }
        if self.uniquifier != 0 {
            write!(f, "({})", self.uniquifier)?;
        }
        Ok(())
    }
}

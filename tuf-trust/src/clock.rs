use std::time::{Duration, SystemTime};

use der::asn1::UtcTime;
use der::DateTime;
use tuf_trust_common::TufError;

/// Source of the reference time that expiration dates are compared against.
///
/// The clock is queried for every single expiry check.
pub trait ReferenceClock {
    fn now(&self) -> Result<UtcTime, TufError>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ReferenceClock for SystemClock {
    fn now(&self) -> Result<UtcTime, TufError> {
        UtcTime::from_system_time(SystemTime::now()).map_err(|_| TufError::InvalidUtcTimestamp)
    }
}

/// A clock that is pinned to a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub UtcTime);

impl FixedClock {
    pub fn from_unix_secs(secs: u64) -> Result<Self, TufError> {
        UtcTime::from_unix_duration(Duration::from_secs(secs))
            .map(FixedClock)
            .map_err(|_| TufError::InvalidUtcTimestamp)
    }

    pub fn from_utc(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minutes: u8,
        seconds: u8,
    ) -> Result<Self, TufError> {
        DateTime::new(year, month, day, hour, minutes, seconds)
            .and_then(UtcTime::from_date_time)
            .map(FixedClock)
            .map_err(|_| TufError::InvalidUtcTimestamp)
    }
}

impl ReferenceClock for FixedClock {
    fn now(&self) -> Result<UtcTime, TufError> {
        Ok(self.0)
    }
}

impl<C: ReferenceClock + ?Sized> ReferenceClock for &C {
    fn now(&self) -> Result<UtcTime, TufError> {
        (**self).now()
    }
}

// libs/appointment-cell/src/services/clock.rs
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::{AppointmentError, LocalDateTime};

/// Source of "now". Swapped for a fixed instant in tests.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedTimeSource(pub DateTime<Utc>);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Converts between clinic wall-clock values and absolute instants. The clinic
/// runs on a fixed offset with no daylight-saving rules, so every local value
/// maps to exactly one instant.
#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(utc_offset_minutes: i32) -> Result<Self, AppointmentError> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                AppointmentError::Misconfigured(format!(
                    "UTC offset of {} minutes is out of range",
                    utc_offset_minutes
                ))
            })?;
        Ok(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Clinic-local date and time to an absolute instant.
    pub fn to_absolute(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, AppointmentError> {
        self.offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| {
                AppointmentError::InvalidLocalDateTime(format!("{} {} is out of range", date, time))
            })
    }

    /// Absolute instant to clinic-local date and time.
    pub fn to_local(&self, instant: DateTime<Utc>) -> LocalDateTime {
        let local = instant.with_timezone(&self.offset).naive_local();
        LocalDateTime {
            date: local.date(),
            time: local.time(),
        }
    }

    /// Parse booking-form input (`YYYY-MM-DD`, `HH:MM` or `HH:MM:SS`) into an
    /// absolute instant.
    pub fn parse_local(&self, date: &str, time: &str) -> Result<DateTime<Utc>, AppointmentError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
            AppointmentError::InvalidLocalDateTime(format!("'{}' is not a YYYY-MM-DD date", date))
        })?;

        let time = time.trim();
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .map_err(|_| {
                AppointmentError::InvalidLocalDateTime(format!("'{}' is not an HH:MM time", time))
            })?;

        self.to_absolute(date, time)
    }
}

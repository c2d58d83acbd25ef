//! SkyBitz timestamp format
//!
//! SkyBitz reports times in UTC as `dd/mon/yyyy-HH:MM:SS` with a lowercase
//! three-letter month (`05/jan/2024-13:45:10`). Older accounts send
//! `yyyy/MM/dd HH:MM:SS`, which is accepted on input only.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use thiserror::Error;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const LEGACY_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid SkyBitz timestamp: {0:?}")]
pub struct InvalidTime(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SkyBitzTime(DateTime<Utc>);

impl SkyBitzTime {
    #[must_use]
    pub fn into_utc(self) -> DateTime<Utc> {
        self.0
    }

    fn parse_compact(s: &str) -> Option<DateTime<Utc>> {
        let (date, time) = s.split_once('-')?;

        let mut date_parts = date.split('/');
        let day: u32 = date_parts.next()?.parse().ok()?;
        let month = date_parts.next()?.to_ascii_lowercase();
        let year: i32 = date_parts.next()?.parse().ok()?;
        if date_parts.next().is_some() {
            return None;
        }
        let month = MONTHS.iter().position(|m| *m == month)? as u32 + 1;

        let mut time_parts = time.split(':');
        let hour: u32 = time_parts.next()?.parse().ok()?;
        let minute: u32 = time_parts.next()?.parse().ok()?;
        let second: u32 = time_parts.next()?.parse().ok()?;
        if time_parts.next().is_some() {
            return None;
        }

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;
        Some(NaiveDateTime::new(date, time).and_utc())
    }

    fn parse_legacy(s: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(s, LEGACY_FORMAT)
            .ok()
            .map(|dt| dt.and_utc())
    }
}

impl FromStr for SkyBitzTime {
    type Err = InvalidTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::parse_compact(s)
            .or_else(|| Self::parse_legacy(s))
            .map(Self)
            .ok_or_else(|| InvalidTime(s.to_string()))
    }
}

impl fmt::Display for SkyBitzTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = &self.0;
        write!(
            f,
            "{:02}/{}/{}-{:02}:{:02}:{:02}",
            at.day(),
            MONTHS[at.month0() as usize],
            at.year(),
            at.hour(),
            at.minute(),
            at.second()
        )
    }
}

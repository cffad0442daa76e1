//! Time resolutions and date tokens
//!
//! Every bucket is addressed by a date token rendered at one resolution:
//!
//! - year:  `2010`
//! - month: `201005`
//! - day:   `20100514`
//! - hour:  `2010051413`
//! - min:   `201005141343`
//! - sec:   `20100514134300`
//! - usec:  `20100514134300.000000`
//!
//! All calendar arithmetic is done in UTC.

use crate::error::RankError;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity level, ordered coarsest to finest
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Year,
    Month,
    Day,
    #[default]
    Hour,
    Min,
    Sec,
    Usec,
}

impl Resolution {
    /// All resolutions, coarsest first
    pub const ALL: [Resolution; 7] = [
        Resolution::Year,
        Resolution::Month,
        Resolution::Day,
        Resolution::Hour,
        Resolution::Min,
        Resolution::Sec,
        Resolution::Usec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Year => "year",
            Resolution::Month => "month",
            Resolution::Day => "day",
            Resolution::Hour => "hour",
            Resolution::Min => "min",
            Resolution::Sec => "sec",
            Resolution::Usec => "usec",
        }
    }

    /// Position in [`Resolution::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Next coarser resolution, `None` for year
    pub fn coarser(self) -> Option<Resolution> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Next finer resolution, `None` for usec
    pub fn finer(self) -> Option<Resolution> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Resolutions from year down to `self` inclusive
    pub fn up_to(self) -> &'static [Resolution] {
        &Self::ALL[..=self.index()]
    }

    /// Start of the bucket containing `time`
    pub fn truncate(self, time: DateTime<Utc>) -> DateTime<Utc> {
        let date = time.date_naive();
        let (hour, min, sec) = (time.hour(), time.minute(), time.second());
        let naive = match self {
            Resolution::Year => {
                NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            Resolution::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            Resolution::Day => date.and_hms_opt(0, 0, 0),
            Resolution::Hour => date.and_hms_opt(hour, 0, 0),
            Resolution::Min => date.and_hms_opt(hour, min, 0),
            Resolution::Sec => date.and_hms_opt(hour, min, sec),
            Resolution::Usec => date.and_hms_micro_opt(hour, min, sec, time.nanosecond() / 1_000),
        };
        naive.map(|n| Utc.from_utc_datetime(&n)).unwrap_or(time)
    }

    /// Start of the bucket following the one that starts at `start`.
    ///
    /// `start` must already be aligned to this resolution.
    pub fn advance(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Resolution::Year => start.checked_add_months(Months::new(12)),
            Resolution::Month => start.checked_add_months(Months::new(1)),
            Resolution::Day => start.checked_add_signed(Duration::days(1)),
            Resolution::Hour => start.checked_add_signed(Duration::hours(1)),
            Resolution::Min => start.checked_add_signed(Duration::minutes(1)),
            Resolution::Sec => start.checked_add_signed(Duration::seconds(1)),
            Resolution::Usec => start.checked_add_signed(Duration::microseconds(1)),
        }
    }

    /// Smallest bucket boundary at or after `time`
    pub fn ceil(self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = self.truncate(time);
        if start == time {
            Some(start)
        } else {
            self.advance(start)
        }
    }

    /// Number of whole buckets between two aligned boundaries
    pub fn slots_between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        if end <= start {
            return 0;
        }
        let span = end - start;
        let count = match self {
            Resolution::Year => i64::from(end.year() - start.year()),
            Resolution::Month => {
                i64::from(end.year() * 12 + end.month() as i32)
                    - i64::from(start.year() * 12 + start.month() as i32)
            }
            Resolution::Day => span.num_days(),
            Resolution::Hour => span.num_hours(),
            Resolution::Min => span.num_minutes(),
            Resolution::Sec => span.num_seconds(),
            Resolution::Usec => span.num_microseconds().unwrap_or(i64::MAX),
        };
        count.max(0) as u64
    }

    /// Date token for `time` rendered at this resolution
    pub fn token(self, time: DateTime<Utc>) -> String {
        let mut out = format!("{:04}", time.year());
        for res in &Self::ALL[1..=self.index()] {
            let part = match res {
                Resolution::Month => format!("{:02}", time.month()),
                Resolution::Day => format!("{:02}", time.day()),
                Resolution::Hour => format!("{:02}", time.hour()),
                Resolution::Min => format!("{:02}", time.minute()),
                Resolution::Sec => format!("{:02}", time.second()),
                Resolution::Usec => format!(".{:06}", (time.nanosecond() / 1_000) % 1_000_000),
                Resolution::Year => String::new(),
            };
            out.push_str(&part);
        }
        out
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "year" => Ok(Resolution::Year),
            "month" => Ok(Resolution::Month),
            "day" => Ok(Resolution::Day),
            "hour" => Ok(Resolution::Hour),
            "min" | "minute" => Ok(Resolution::Min),
            "sec" | "second" => Ok(Resolution::Sec),
            "usec" => Ok(Resolution::Usec),
            other => Err(RankError::InvalidConfiguration(format!(
                "unknown resolution '{}'",
                other
            ))),
        }
    }
}

/// A point in time paired with the resolution it is addressed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankDate {
    time: DateTime<Utc>,
    depth: Resolution,
}

impl RankDate {
    pub fn new(time: DateTime<Utc>, depth: Resolution) -> Self {
        RankDate { time, depth }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn depth(&self) -> Resolution {
        self.depth
    }

    /// Token at the date's own depth
    pub fn token(&self) -> String {
        self.depth.token(self.time)
    }

    /// Token at an arbitrary resolution
    pub fn token_at(&self, depth: Resolution) -> String {
        depth.token(self.time)
    }

    /// Start of the bucket at the date's own depth
    pub fn truncated(&self) -> DateTime<Utc> {
        self.depth.truncate(self.time)
    }
}

impl fmt::Display for RankDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_tokens_per_resolution() {
        let t = at(2010, 5, 14, 13, 43, 7) + Duration::microseconds(42);
        assert_eq!(Resolution::Year.token(t), "2010");
        assert_eq!(Resolution::Month.token(t), "201005");
        assert_eq!(Resolution::Day.token(t), "20100514");
        assert_eq!(Resolution::Hour.token(t), "2010051413");
        assert_eq!(Resolution::Min.token(t), "201005141343");
        assert_eq!(Resolution::Sec.token(t), "20100514134307");
        assert_eq!(Resolution::Usec.token(t), "20100514134307.000042");
    }

    #[test]
    fn test_truncate_and_advance() {
        let t = at(2012, 1, 31, 22, 15, 0);
        assert_eq!(Resolution::Month.truncate(t), at(2012, 1, 1, 0, 0, 0));
        assert_eq!(Resolution::Hour.truncate(t), at(2012, 1, 31, 22, 0, 0));
        assert_eq!(
            Resolution::Month.advance(at(2012, 1, 1, 0, 0, 0)),
            Some(at(2012, 2, 1, 0, 0, 0))
        );
        assert_eq!(
            Resolution::Year.advance(at(2012, 1, 1, 0, 0, 0)),
            Some(at(2013, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            Resolution::Day.advance(at(2012, 2, 28, 0, 0, 0)),
            Some(at(2012, 2, 29, 0, 0, 0))
        );
    }

    #[test]
    fn test_ceil() {
        let aligned = at(2010, 5, 14, 13, 0, 0);
        assert_eq!(Resolution::Hour.ceil(aligned), Some(aligned));
        assert_eq!(
            Resolution::Hour.ceil(at(2010, 5, 14, 13, 0, 1)),
            Some(at(2010, 5, 14, 14, 0, 0))
        );
        assert_eq!(
            Resolution::Year.ceil(at(2010, 5, 14, 13, 0, 0)),
            Some(at(2011, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_slots_between() {
        let feb = at(2012, 2, 1, 0, 0, 0);
        let mar = at(2012, 3, 1, 0, 0, 0);
        assert_eq!(Resolution::Day.slots_between(feb, mar), 29);
        assert_eq!(Resolution::Hour.slots_between(feb, mar), 29 * 24);
        assert_eq!(
            Resolution::Month.slots_between(at(2011, 11, 1, 0, 0, 0), mar),
            4
        );
        assert_eq!(Resolution::Min.slots_between(mar, feb), 0);
    }

    #[test]
    fn test_ordering_and_navigation() {
        assert!(Resolution::Year < Resolution::Usec);
        assert_eq!(Resolution::Year.coarser(), None);
        assert_eq!(Resolution::Hour.coarser(), Some(Resolution::Day));
        assert_eq!(Resolution::Usec.finer(), None);
        assert_eq!(Resolution::Day.up_to().len(), 3);
        assert_eq!(Resolution::default(), Resolution::Hour);
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!("hour".parse::<Resolution>().unwrap(), Resolution::Hour);
        assert_eq!("MINUTE".parse::<Resolution>().unwrap(), Resolution::Min);
        assert!("fortnight".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_rank_date_token() {
        let date = RankDate::new(at(2010, 5, 14, 13, 43, 0), Resolution::Day);
        assert_eq!(date.token(), "20100514");
        assert_eq!(date.token_at(Resolution::Hour), "2010051413");
        assert_eq!(date.truncated(), at(2010, 5, 14, 0, 0, 0));
    }
}

//! Month arithmetic for availability loading.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct InvalidMonth(pub String);

/// A calendar month, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

/// Weekdays of `month` from `today` (or the first of the month, whichever
/// is later) through the end of the month.
pub fn bookable_days(month: YearMonth, today: NaiveDate) -> Vec<NaiveDate> {
    let start = today.max(month.first_day());
    let end = month.last_day();
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Date in the scheduling API's `dd-Mon-yyyy` form, e.g. `04-Mar-2025`.
pub fn api_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Appointment start in the scheduling API's `dd-Mon-yyyy HH:mm:ss` form.
pub fn api_date_time(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} {}", api_date(date), time.format("%H:%M:%S"))
}

/// Parse a `HH:MM` slot label.
pub fn parse_slot(slot: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(slot.trim(), "%H:%M").ok()
}

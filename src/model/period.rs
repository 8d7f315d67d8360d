use crate::Result;
use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A calendar month of a given year; the unit of ingestion and conversion.
///
/// Periods order chronologically:
/// ```
/// # use statsync::model::Period;
/// let jan = Period::new(2024, 1).unwrap();
/// let dec = Period::new(2023, 12).unwrap();
/// assert!(dec < jan);
/// assert_eq!(dec.next(), jan);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("Invalid month {month}, expected 1 through 12");
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
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

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.day(1)
    }

    /// The given day of this period, clamped to the last day of the month.
    pub fn day(&self, day: u32) -> NaiveDate {
        let last = self.next().first_day_unchecked().pred_opt();
        let wanted = NaiveDate::from_ymd_opt(self.year, self.month, day.max(1));
        match (wanted, last) {
            (Some(date), _) => date,
            (None, Some(last)) => last,
            (None, None) => NaiveDate::MIN,
        }
    }

    fn first_day_unchecked(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The key SQLite produces for this period with `strftime('%m-%Y', date)`.
    pub fn sql_key(&self) -> String {
        format!("{:02}-{}", self.month, self.year)
    }

    /// Number of periods from `self` through `end`, both included. Zero when `end` is earlier.
    pub fn count_through(&self, end: Period) -> u32 {
        let months = (end.year - self.year) * 12 + end.month as i32 - self.month as i32 + 1;
        months.max(0) as u32
    }

    /// Iterates from `self` through `end`, both included.
    pub fn through(self, end: Period) -> impl Iterator<Item = Period> {
        std::iter::successors(Some(self), |p| Some(p.next())).take_while(move |p| *p <= end)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .with_context(|| format!("Invalid period '{s}', expected YYYY-MM"))?;
        let year = year
            .parse::<i32>()
            .with_context(|| format!("Invalid year in period '{s}'"))?;
        let month = month
            .parse::<u32>()
            .with_context(|| format!("Invalid month in period '{s}'"))?;
        Period::new(year, month)
    }
}

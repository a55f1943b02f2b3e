//! Time periods to process and the enumerators that produce them.

use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};

/// Temporal granularity of the source assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Monthly,
    Daily,
}

/// One unit of work: a calendar month or a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Period {
    Month { year: i32, month: u32 },
    Day(NaiveDate),
}

impl Period {
    pub fn cadence(&self) -> Cadence {
        match self {
            Period::Month { .. } => Cadence::Monthly,
            Period::Day(_) => Cadence::Daily,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Period::Month { year, .. } => *year,
            Period::Day(date) => date.year(),
        }
    }

    /// First day covered by the period.
    pub fn first_day(&self) -> Option<NaiveDate> {
        match self {
            Period::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1),
            Period::Day(date) => Some(*date),
        }
    }

    /// Last day covered by the period (month ends follow the calendar).
    pub fn last_day(&self) -> Option<NaiveDate> {
        match self {
            Period::Month { .. } => self
                .first_day()?
                .checked_add_months(Months::new(1))?
                .checked_sub_days(Days::new(1)),
            Period::Day(date) => Some(*date),
        }
    }

    pub fn first_instant(&self) -> Option<NaiveDateTime> {
        self.first_day()?.and_hms_opt(0, 0, 0)
    }

    pub fn last_instant(&self) -> Option<NaiveDateTime> {
        self.last_day()?.and_hms_opt(23, 59, 59)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{}.{:02}", year, month),
            Period::Day(date) => write!(f, "{}", date.format("%Y.%m.%d")),
        }
    }
}

/// All (year, month) pairs of an inclusive year range, year-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyEnumerator {
    start_year: i32,
    end_year: i32,
}

impl MonthlyEnumerator {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
        }
    }

    /// A fresh lazy sequence; calling again restarts from the first month.
    pub fn periods(&self) -> impl Iterator<Item = Period> {
        (self.start_year..=self.end_year)
            .flat_map(|year| (1..=12).map(move |month| Period::Month { year, month }))
    }

    pub fn len(&self) -> usize {
        if self.end_year < self.start_year {
            0
        } else {
            (self.end_year - self.start_year + 1) as usize * 12
        }
    }
}

/// Every calendar date of an inclusive date range, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyEnumerator {
    start: NaiveDate,
    end: NaiveDate,
}

impl DailyEnumerator {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> {
        let end = self.end;
        self.start
            .iter_days()
            .take_while(move |date| *date <= end)
            .map(Period::Day)
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1).max(0) as usize
    }
}

/// The enumerator selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEnumerator {
    Monthly(MonthlyEnumerator),
    Daily(DailyEnumerator),
}

impl PeriodEnumerator {
    pub fn periods(&self) -> Box<dyn Iterator<Item = Period> + Send> {
        match self {
            PeriodEnumerator::Monthly(e) => Box::new(e.periods()),
            PeriodEnumerator::Daily(e) => Box::new(e.periods()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PeriodEnumerator::Monthly(e) => e.len(),
            PeriodEnumerator::Daily(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cadence(&self) -> Cadence {
        match self {
            PeriodEnumerator::Monthly(_) => Cadence::Monthly,
            PeriodEnumerator::Daily(_) => Cadence::Daily,
        }
    }
}

// -- Tests -------------------------------------------------------------------

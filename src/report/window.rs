use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::date_util::{ceil_days, end_of_day, local_date, start_of_day};
use crate::model::Sprint;

/// The resolved reporting window of a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Calendar days covered, both boundary days included. Always >= 2.
    pub days: u32,
    pub offset: FixedOffset,
}

impl ReportWindow {
    /// Resolve the window of `sprint`.
    ///
    /// - start: the sprint start date, else the earliest task creation, else `now`
    /// - end: the sprint end date, else `now`
    /// - days: `max(1, ceil((end - start) / 1 day)) + 1`
    pub fn resolve(sprint: &Sprint, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let start = sprint
            .start_date
            .or_else(|| sprint.tasks.iter().map(|t| t.created_at).min())
            .unwrap_or(now);
        let end = sprint.end_date.unwrap_or(now);
        let days = ceil_days(start, end).max(1) + 1;

        Self {
            start,
            end,
            days: u32::try_from(days).unwrap_or(u32::MAX),
            offset,
        }
    }

    /// Whether `ts` falls inside `[start, end]`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// The calendar dates of the window, starting at the start instant's day.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let first = local_date(self.start, self.offset);
        (0..self.days)
            .map(|i| first + Duration::days(i64::from(i)))
            .collect()
    }

    /// `[midnight, next midnight)` of `date` as UTC instants.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = start_of_day(date, self.offset);
        (start, start + Duration::days(1))
    }

    /// 23:59:59.999 of `date`.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        end_of_day(date, self.offset)
    }
}

//! Service calendar for determining when trips run.
//!
//! Implements GTFS calendar.txt and calendar_dates.txt logic.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::HashSet;
use std::sync::Arc;

use crate::identifiers::ServiceIdentifier;
use crate::models::types::{Result, TransitError};

/// Determines which days a transit service operates
#[derive(Clone, Debug)]
pub struct ServiceCalendar {
    service_id: ServiceIdentifier,

    // Regular schedule
    start_date: NaiveDate,
    end_date: NaiveDate,
    weekdays: WeekdayFlags,

    // Exception dates
    added_dates: Arc<HashSet<NaiveDate>>,   // Service runs on these dates
    removed_dates: Arc<HashSet<NaiveDate>>, // Service does not run on these dates

    // Last date on which the service can possibly run
    horizon: NaiveDate,
}

/// Seven-bit day-of-week mask, Monday in bit 0
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeekdayFlags {
    pub(crate) flags: u8,
}

impl WeekdayFlags {
    pub const ALL: Self = Self { flags: 0x7f };

    pub fn new() -> Self {
        Self { flags: 0 }
    }

    /// Builds flags from a raw mask; bits above the seventh are ignored
    pub fn from_mask(mask: u8) -> Self {
        Self { flags: mask & 0x7f }
    }

    pub fn bits(&self) -> u8 {
        self.flags
    }

    pub fn set(&mut self, weekday: Weekday) {
        self.flags |= 1 << weekday.num_days_from_monday();
    }

    pub fn unset(&mut self, weekday: Weekday) {
        self.flags &= !(1 << weekday.num_days_from_monday());
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.flags & (1 << weekday.num_days_from_monday())) != 0
    }

    pub fn from_bools(mon: bool, tue: bool, wed: bool, thu: bool, fri: bool, sat: bool, sun: bool) -> Self {
        let mut flags = Self::new();
        if mon { flags.set(Weekday::Mon); }
        if tue { flags.set(Weekday::Tue); }
        if wed { flags.set(Weekday::Wed); }
        if thu { flags.set(Weekday::Thu); }
        if fri { flags.set(Weekday::Fri); }
        if sat { flags.set(Weekday::Sat); }
        if sun { flags.set(Weekday::Sun); }
        flags
    }
}

impl ServiceCalendar {
    /// Creates a calendar for the inclusive range `[start_date, end_date]`
    pub fn new(
        service_id: ServiceIdentifier,
        start_date: NaiveDate,
        end_date: NaiveDate,
        weekdays: WeekdayFlags,
    ) -> Result<Self> {
        if start_date > end_date {
            return Err(TransitError::InvalidData(format!(
                "service {} starts on {} after it ends on {}",
                service_id, start_date, end_date
            )));
        }

        Ok(Self {
            service_id,
            start_date,
            end_date,
            weekdays,
            added_dates: Arc::new(HashSet::new()),
            removed_dates: Arc::new(HashSet::new()),
            horizon: end_date,
        })
    }

    /// Calendar for a service that only exists through added dates
    pub fn from_added_dates(service_id: ServiceIdentifier, added: HashSet<NaiveDate>) -> Option<Self> {
        let start = added.iter().min().copied()?;
        let end = added.iter().max().copied()?;
        let calendar = Self::new(service_id, start, end, WeekdayFlags::new()).ok()?;
        Some(calendar.with_exceptions(added, HashSet::new()))
    }

    /// Attaches calendar_dates-style exceptions
    pub fn with_exceptions(mut self, added: HashSet<NaiveDate>, removed: HashSet<NaiveDate>) -> Self {
        self.horizon = added
            .iter()
            .copied()
            .fold(self.end_date, std::cmp::max);
        self.added_dates = Arc::new(added);
        self.removed_dates = Arc::new(removed);
        self
    }

    pub fn service_id(&self) -> &ServiceIdentifier {
        &self.service_id
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn weekdays(&self) -> WeekdayFlags {
        self.weekdays
    }

    pub fn added_dates(&self) -> &HashSet<NaiveDate> {
        &self.added_dates
    }

    pub fn removed_dates(&self) -> &HashSet<NaiveDate> {
        &self.removed_dates
    }

    /// Check if the service runs on a given date
    pub fn contains(&self, date: NaiveDate) -> bool {
        // Check explicit additions first
        if self.added_dates.contains(&date) {
            return true;
        }

        // Check explicit removals
        if self.removed_dates.contains(&date) {
            return false;
        }

        // Check regular schedule
        if date < self.start_date || date > self.end_date {
            return false;
        }

        self.weekdays.contains(date.weekday())
    }

    /// Next instant at or after `at` on which the service runs.
    ///
    /// Returns `at` unchanged if the service runs on its date. Otherwise days
    /// are advanced one at a time, with the time reset to midnight, until an
    /// active day is found. `None` means there is no further service.
    pub fn next_date(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut date = at.date();
        if self.contains(date) {
            return Some(at);
        }

        loop {
            date = date.succ_opt()?;
            if date > self.horizon {
                return None;
            }
            if self.contains(date) {
                return Some(date.and_time(NaiveTime::MIN));
            }
        }
    }
}

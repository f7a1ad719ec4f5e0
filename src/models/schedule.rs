use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Local time-of-day at which the daily digest fires, and the zone that
/// defines both that time and the calendar day of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestSchedule {
    pub time: NaiveTime,
    pub timezone: Tz,
}

impl DigestSchedule {
    pub fn new(time: NaiveTime, timezone: Tz) -> Self {
        Self { time, timezone }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone).date_naive()
    }

    /// Trigger instant on the given local date. A time falling into a DST gap
    /// moves forward by an hour.
    pub fn trigger_on(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.time);

        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(local + TimeDelta::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| local.and_utc())
    }

    /// First trigger instant strictly after `now`.
    pub fn next_trigger_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let candidate = self.trigger_on(today);

        if candidate > now {
            return candidate;
        }

        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        self.trigger_on(tomorrow)
    }

    pub fn has_fired_today(&self, now: DateTime<Utc>) -> bool {
        self.trigger_on(self.local_date(now)) <= now
    }
}

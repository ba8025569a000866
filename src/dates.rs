use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};

/// Day and week boundaries around one "now", as UTC instants.
///
/// All `*_end` values are the last millisecond of their window, so every
/// range check below is inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchors {
    pub today_start: DateTime<Utc>,
    pub today_end: DateTime<Utc>,
    pub tomorrow_start: DateTime<Utc>,
    pub tomorrow_end: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
}

impl TimeAnchors {
    /// Compute the anchors for the local calendar day of `now`.
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>, week_starts_on: Weekday) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();
        let tomorrow = add_days(today, 1);
        let day_after = add_days(today, 2);

        let into_week = days_into_week(today.weekday(), week_starts_on);
        let week_first_day = today.checked_sub_days(Days::new(into_week)).unwrap_or(NaiveDate::MIN);
        let next_week_first_day = add_days(week_first_day, 7);

        let last_millisecond = TimeDelta::milliseconds(1);
        Self {
            today_start: start_of_day(&tz, today),
            today_end: start_of_day(&tz, tomorrow) - last_millisecond,
            tomorrow_start: start_of_day(&tz, tomorrow),
            tomorrow_end: start_of_day(&tz, day_after) - last_millisecond,
            week_start: start_of_day(&tz, week_first_day),
            week_end: start_of_day(&tz, next_week_first_day) - last_millisecond,
        }
    }

    pub fn is_overdue(&self, due: Option<DateTime<Utc>>) -> bool {
        due.is_some_and(|due| due < self.today_start)
    }

    pub fn is_today(&self, due: Option<DateTime<Utc>>) -> bool {
        due.is_some_and(|due| (self.today_start..=self.today_end).contains(&due))
    }

    pub fn is_tomorrow(&self, due: Option<DateTime<Utc>>) -> bool {
        due.is_some_and(|due| (self.tomorrow_start..=self.tomorrow_end).contains(&due))
    }

    /// Anything from the start of today up to the end of the week, today and
    /// tomorrow included. Callers wanting disjoint buckets test those first.
    pub fn is_this_week(&self, due: Option<DateTime<Utc>>) -> bool {
        due.is_some_and(|due| (self.today_start..=self.week_end).contains(&due))
    }
}

/// Number of days `day` lies after the configured first day of the week.
pub fn days_into_week(day: Weekday, week_starts_on: Weekday) -> u64 {
    let offset = 7 + day.num_days_from_monday() - week_starts_on.num_days_from_monday();
    u64::from(offset % 7)
}

/// The first instant of `date` in `tz`.
///
/// Midnight can be skipped by a DST jump (first existing instant after it is
/// used) or occur twice (the earlier one is used).
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=8)
        .find_map(|quarter_hours| {
            tz.from_local_datetime(&(midnight + TimeDelta::minutes(15 * quarter_hours)))
                .earliest()
        })
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// Milliseconds since the Unix epoch, the on-disk form of every instant.
pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc, Weekday};

/// Source of "now" and of the week-start convention.
///
/// The time zone of the returned instant decides where local midnight falls,
/// so categorization follows whatever zone the clock reports in.
pub trait Clock: Send + Sync + 'static {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;

    fn week_starts_on(&self) -> Weekday;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Wall clock in the machine's local time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    week_starts_on: Weekday,
}

impl SystemClock {
    pub fn new(week_starts_on: Weekday) -> Self {
        Self { week_starts_on }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Weekday::Mon)
    }
}

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn week_starts_on(&self) -> Weekday {
        self.week_starts_on
    }
}

/// A clock frozen at one instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<FixedOffset>,
    week_starts_on: Weekday,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>, week_starts_on: Weekday) -> Self {
        Self { now, week_starts_on }
    }
}

impl Clock for FixedClock {
    type Tz = FixedOffset;

    fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    fn week_starts_on(&self) -> Weekday {
        self.week_starts_on
    }
}

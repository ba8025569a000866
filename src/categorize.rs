use chrono::{DateTime, TimeZone, Weekday};
use serde::Serialize;

use crate::dates::TimeAnchors;
use crate::models::TaskRecord;

/// Tasks grouped by when they are due. Rebuilt from scratch on every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorizedView {
    pub overdue: Vec<TaskRecord>,
    pub today: Vec<TaskRecord>,
    pub tomorrow: Vec<TaskRecord>,
    pub this_week: Vec<TaskRecord>,
    pub upcoming: Vec<TaskRecord>,
    pub completed: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Overdue,
    Today,
    Tomorrow,
    ThisWeek,
    Upcoming,
    Completed,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Overdue,
        Bucket::Today,
        Bucket::Tomorrow,
        Bucket::ThisWeek,
        Bucket::Upcoming,
        Bucket::Completed,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Bucket::Overdue => "Overdue",
            Bucket::Today => "Today",
            Bucket::Tomorrow => "Tomorrow",
            Bucket::ThisWeek => "This Week",
            Bucket::Upcoming => "Upcoming",
            Bucket::Completed => "Completed",
        }
    }
}

impl CategorizedView {
    pub fn bucket(&self, bucket: Bucket) -> &[TaskRecord] {
        match bucket {
            Bucket::Overdue => &self.overdue,
            Bucket::Today => &self.today,
            Bucket::Tomorrow => &self.tomorrow,
            Bucket::ThisWeek => &self.this_week,
            Bucket::Upcoming => &self.upcoming,
            Bucket::Completed => &self.completed,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<TaskRecord> {
        match bucket {
            Bucket::Overdue => &mut self.overdue,
            Bucket::Today => &mut self.today,
            Bucket::Tomorrow => &mut self.tomorrow,
            Bucket::ThisWeek => &mut self.this_week,
            Bucket::Upcoming => &mut self.upcoming,
            Bucket::Completed => &mut self.completed,
        }
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|bucket| self.bucket(*bucket).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn active_len(&self) -> usize {
        self.len() - self.completed.len()
    }
}

/// Pick the bucket for one record. The order of the checks is what keeps the
/// buckets disjoint: "this week" also covers today and tomorrow.
pub fn classify(record: &TaskRecord, anchors: &TimeAnchors) -> Bucket {
    if record.is_completed {
        Bucket::Completed
    } else if anchors.is_overdue(record.due_date) {
        Bucket::Overdue
    } else if anchors.is_today(record.due_date) {
        Bucket::Today
    } else if anchors.is_tomorrow(record.due_date) {
        Bucket::Tomorrow
    } else if anchors.is_this_week(record.due_date) {
        Bucket::ThisWeek
    } else {
        Bucket::Upcoming
    }
}

/// Sort a full record set into buckets relative to `now`.
///
/// Active buckets are ordered by due date with undated tasks last; completed
/// tasks come most recently updated first. Equal keys keep input order.
pub fn categorize<Tz: TimeZone>(
    records: &[TaskRecord],
    now: &DateTime<Tz>,
    week_starts_on: Weekday,
) -> CategorizedView {
    let anchors = TimeAnchors::at(now, week_starts_on);
    let mut view = CategorizedView::default();

    for record in records {
        debug_assert!(
            record.creation_date <= record.update_date,
            "task {} was updated before it was created",
            record.id
        );
        debug_assert!(!record.text.trim().is_empty(), "task {} has blank text", record.id);

        view.bucket_mut(classify(record, &anchors)).push(record.clone());
    }

    for bucket in [Bucket::Overdue, Bucket::Today, Bucket::Tomorrow, Bucket::ThisWeek, Bucket::Upcoming] {
        view.bucket_mut(bucket)
            .sort_by_key(|task| (task.due_date.is_none(), task.due_date));
    }
    view.completed.sort_by(|a, b| b.update_date.cmp(&a.update_date));

    debug_assert_eq!(
        view.active_len(),
        records.iter().filter(|record| !record.is_completed).count()
    );
    view
}

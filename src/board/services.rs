//! Board projections. Everything here is a pure function of a task list and
//! a calendar date; the handler reads a fresh list per request.

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::tasks::repo_types::{Task, TaskStatus};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buckets {
    pub open: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl Buckets {
    fn bucket_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        match status {
            TaskStatus::Open => &mut self.open,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Done => &mut self.done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub open: usize,
    pub in_progress: usize,
    pub done: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub overdue: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub next_deadline: Option<Task>,
    pub buckets: Buckets,
    pub counts: Counts,
}

/// Current calendar date in the server's local offset, UTC when that is unknown.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

fn by_due_date(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (t.due_date, t.id));
}

fn pending_with_due(tasks: &[Task]) -> impl Iterator<Item = (&Task, Date)> {
    tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Done)
        .filter_map(|t| t.due_date.map(|d| (t, d)))
}

/// Not done and due before `today`.
pub fn overdue(tasks: &[Task], today: Date) -> Vec<Task> {
    let mut out: Vec<Task> = pending_with_due(tasks)
        .filter(|(_, due)| *due < today)
        .map(|(t, _)| t.clone())
        .collect();
    by_due_date(&mut out);
    out
}

/// Not done and due in `[today, today + window_days + 1)`.
pub fn upcoming(tasks: &[Task], today: Date, window_days: i64) -> Vec<Task> {
    let end = today.checked_add(Duration::days(window_days + 1));
    let mut out: Vec<Task> = pending_with_due(tasks)
        .filter(|(_, due)| *due >= today && end.map_or(true, |end| *due < end))
        .map(|(t, _)| t.clone())
        .collect();
    by_due_date(&mut out);
    out
}

/// Earliest due date among pending tasks; ties go to the smaller id.
pub fn next_deadline(tasks: &[Task]) -> Option<Task> {
    pending_with_due(tasks)
        .min_by_key(|(t, due)| (*due, t.id))
        .map(|(t, _)| t.clone())
}

/// Partitions by status after a case-insensitive title filter. Each bucket is
/// ordered by creation time.
pub fn buckets(tasks: &[Task], search: &str) -> Buckets {
    let needle = search.trim().to_lowercase();
    let mut out = Buckets::default();
    for task in tasks.iter().filter(|t| t.title_contains(&needle)) {
        out.bucket_mut(task.status).push(task.clone());
    }
    for bucket in [&mut out.open, &mut out.in_progress, &mut out.done] {
        bucket.sort_by_key(|t| (t.created_at, t.id));
    }
    out
}

pub fn counts(buckets: &Buckets) -> Counts {
    Counts {
        open: buckets.open.len(),
        in_progress: buckets.in_progress.len(),
        done: buckets.done.len(),
    }
}

pub fn project(tasks: &[Task], today: Date, window_days: i64, search: &str) -> Board {
    let buckets = buckets(tasks, search);
    Board {
        overdue: overdue(tasks, today),
        upcoming: upcoming(tasks, today, window_days),
        next_deadline: next_deadline(tasks),
        counts: counts(&buckets),
        buckets,
    }
}

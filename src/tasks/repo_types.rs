use std::{fmt, str::FromStr};

use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

time::serde::format_description!(pub(crate) iso_date, Date, "[year]-[month]-[day]");

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 4000;
pub const DURATION_MAX: usize = 64;

/// Board column of a task. Any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaskStatus {
    #[serde(rename = "Offen")]
    Open,
    #[serde(rename = "In Bearbeitung")]
    InProgress,
    #[serde(rename = "Erledigt")]
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Open, TaskStatus::InProgress, TaskStatus::Done];

    /// Label exchanged with the UI.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Open => "Offen",
            TaskStatus::InProgress => "In Bearbeitung",
            TaskStatus::Done => "Erledigt",
        }
    }

    /// Code stored in the `tasks.status` column.
    pub fn code(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Offen" | "Open" => Ok(TaskStatus::Open),
            "In Bearbeitung" | "InProgress" => Ok(TaskStatus::InProgress),
            "Erledigt" | "Done" => Ok(TaskStatus::Done),
            other => Err(AppError::DomainViolation(format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaskPriority {
    #[serde(rename = "Niedrig")]
    Low,
    #[serde(rename = "Mittel")]
    Medium,
    #[serde(rename = "Hoch")]
    High,
    #[serde(rename = "Sehr hoch")]
    VeryHigh,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::VeryHigh,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskPriority::Low => "Niedrig",
            TaskPriority::Medium => "Mittel",
            TaskPriority::High => "Hoch",
            TaskPriority::VeryHigh => "Sehr hoch",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::VeryHigh => "very_high",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl FromStr for TaskPriority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Niedrig" | "Low" => Ok(TaskPriority::Low),
            "Mittel" | "Medium" => Ok(TaskPriority::Medium),
            "Hoch" | "High" => Ok(TaskPriority::High),
            "Sehr hoch" | "VeryHigh" => Ok(TaskPriority::VeryHigh),
            other => Err(AppError::DomainViolation(format!("unknown priority '{other}'"))),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(with = "iso_date::option")]
    pub due_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub owner_id: Uuid,
}

impl Task {
    /// Case-insensitive title search; `needle_lower` must already be lowercase.
    /// An empty needle matches everything.
    pub fn title_contains(&self, needle_lower: &str) -> bool {
        needle_lower.is_empty() || self.title.to_lowercase().contains(needle_lower)
    }

    /// Applies a validated patch in place; returns whether anything differed.
    pub fn apply(&mut self, patch: &TaskPatch) -> bool {
        let before = self.clone();
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(duration) = &patch.duration {
            self.duration.clone_from(duration);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        *self != before
    }
}

/// Raw `tasks` row; status and priority are stored as codes.
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<Date>,
    pub created_at: OffsetDateTime,
    pub owner_id: Uuid,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_code(&r.status).ok_or_else(|| {
            AppError::Transient(anyhow::anyhow!("task {} has unknown status code {}", r.id, r.status))
        })?;
        let priority = TaskPriority::from_code(&r.priority).ok_or_else(|| {
            AppError::Transient(anyhow::anyhow!(
                "task {} has unknown priority code {}",
                r.id,
                r.priority
            ))
        })?;
        Ok(Self {
            id: r.id,
            title: r.title,
            description: r.description,
            duration: r.duration,
            status,
            priority,
            due_date: r.due_date,
            created_at: r.created_at,
            owner_id: r.owner_id,
        })
    }
}

/// Validated input for inserting a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub duration: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<Date>,
    pub owner_id: Uuid,
}

/// Validated partial update. Outer `None` keeps a field; `due_date: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<Date>>,
}

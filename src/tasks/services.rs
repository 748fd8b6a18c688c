use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    error::AppError,
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, UpdateTaskRequest},
        repo_types::{
            NewTask, Task, TaskPatch, TaskPriority, TaskStatus, DESCRIPTION_MAX, DURATION_MAX,
            TITLE_MAX,
        },
    },
};

fn normalize_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::DomainViolation("title must not be empty".into()));
    }
    bounded("title", title.to_owned(), TITLE_MAX)
}

// Postgres text columns cannot hold NUL.
fn bounded(field: &str, value: String, max: usize) -> Result<String, AppError> {
    if value.contains('\0') {
        return Err(AppError::DomainViolation(format!(
            "{field} must not contain NUL characters"
        )));
    }
    if value.chars().count() > max {
        return Err(AppError::DomainViolation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

fn parse_status(raw: Option<&str>) -> Result<Option<TaskStatus>, AppError> {
    raw.map(str::parse).transpose()
}

fn parse_priority(raw: Option<&str>) -> Result<Option<TaskPriority>, AppError> {
    raw.map(str::parse).transpose()
}

pub async fn create(
    st: &AppState,
    owner_id: Uuid,
    req: CreateTaskRequest,
) -> Result<Task, AppError> {
    let new = NewTask {
        title: normalize_title(&req.title)?,
        description: bounded("description", req.description.unwrap_or_default(), DESCRIPTION_MAX)?,
        duration: bounded(
            "duration",
            req.duration.unwrap_or_default().trim().to_owned(),
            DURATION_MAX,
        )?,
        status: parse_status(req.status.as_deref())?.unwrap_or(TaskStatus::Open),
        priority: parse_priority(req.priority.as_deref())?.unwrap_or(TaskPriority::Medium),
        due_date: req.due_date,
        owner_id,
    };
    let task = st.repo.insert_task(new).await?;
    info!(task_id = %task.id, %owner_id, status = %task.status, "task created");
    Ok(task)
}

/// All tasks of the owner, in no particular order.
pub async fn list_by_owner(st: &AppState, owner_id: Uuid) -> Result<Vec<Task>, AppError> {
    st.repo.list_tasks_by_owner(owner_id).await
}

/// Owner tasks narrowed by an optional title search and status.
pub async fn list_filtered(
    st: &AppState,
    owner_id: Uuid,
    q: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Task>, AppError> {
    let status = parse_status(status.filter(|s| !s.is_empty()))?;
    let needle = q.unwrap_or_default().trim().to_lowercase();
    let tasks = list_by_owner(st, owner_id).await?;
    Ok(tasks
        .into_iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .filter(|t| t.title_contains(&needle))
        .collect())
}

/// Another owner's task is reported as missing, never forbidden.
pub async fn get(st: &AppState, owner_id: Uuid, id: Uuid) -> Result<Task, AppError> {
    st.repo
        .find_task(owner_id, id)
        .await?
        .ok_or(AppError::NotFound("task"))
}

pub async fn update(
    st: &AppState,
    owner_id: Uuid,
    id: Uuid,
    req: UpdateTaskRequest,
) -> Result<Task, AppError> {
    let patch = TaskPatch {
        title: req.title.as_deref().map(normalize_title).transpose()?,
        description: req
            .description
            .map(|d| bounded("description", d, DESCRIPTION_MAX))
            .transpose()?,
        duration: req
            .duration
            .map(|d| bounded("duration", d.trim().to_owned(), DURATION_MAX))
            .transpose()?,
        status: parse_status(req.status.as_deref())?,
        priority: parse_priority(req.priority.as_deref())?,
        due_date: req.due_date,
    };
    let task = st
        .repo
        .update_task(owner_id, id, patch)
        .await?
        .ok_or(AppError::NotFound("task"))?;
    info!(task_id = %task.id, %owner_id, "task updated");
    Ok(task)
}

pub async fn delete(st: &AppState, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
    if !st.repo.delete_task(owner_id, id).await? {
        return Err(AppError::NotFound("task"));
    }
    info!(task_id = %id, %owner_id, "task deleted");
    Ok(())
}

/// Board drag-and-drop. Idempotent; the returned status is what storage now holds.
pub async fn move_to_status(
    st: &AppState,
    owner_id: Uuid,
    id: Uuid,
    raw_status: &str,
) -> Result<TaskStatus, AppError> {
    let status: TaskStatus = raw_status.parse()?;
    let (task, changed) = st
        .repo
        .set_task_status(owner_id, id, status)
        .await?
        .ok_or(AppError::NotFound("task"))?;
    if changed {
        info!(task_id = %id, %owner_id, status = %task.status, "task moved");
    } else {
        debug!(task_id = %id, status = %task.status, "task already in requested status");
    }
    Ok(task.status)
}

/// Deletes any user's task; only the bootstrap admin may do this.
pub async fn admin_delete(st: &AppState, principal: &User, id: Uuid) -> Result<(), AppError> {
    if principal.username != st.config.admin.username {
        warn!(user_id = %principal.id, task_id = %id, "non-admin attempted admin delete");
        return Err(AppError::Forbidden);
    }
    if !st.repo.delete_task_by_id(id).await? {
        return Err(AppError::NotFound("task"));
    }
    info!(task_id = %id, admin = %principal.username, "task deleted by admin");
    Ok(())
}

use serde::{Deserialize, Deserializer, Serialize};
use time::Date;
use uuid::Uuid;

use super::repo_types::{iso_date, TaskStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub due_date: Option<Date>,
}

/// Partial update. Omitted or null fields are kept, except `dueDate: null`
/// which clears the due date.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "present_date")]
    pub due_date: Option<Option<Date>>,
}

// Only called when the key is present, so null becomes Some(None).
fn present_date<'de, D>(d: D) -> Result<Option<Option<Date>>, D::Error>
where
    D: Deserializer<'de>,
{
    iso_date::option::deserialize(d).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct MoveStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: TaskStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub q: Option<String>,
    pub status: Option<String>,
}

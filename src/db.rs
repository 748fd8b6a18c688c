use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, ProfileChanges, User},
    config::DatabaseConfig,
    error::AppError,
    tasks::repo_types::{NewTask, Task, TaskPatch, TaskStatus},
};

#[cfg(test)]
pub mod memory;

/// Typed access to the `users` and `tasks` collections.
///
/// Uniqueness of `username`/`email` is enforced here, not by callers, and
/// surfaces as `UsernameTaken`/`EmailTaken`. Every task method except
/// `delete_task_by_id` is scoped to an owner.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn insert_user(&self, new: NewUser) -> Result<User, AppError>;
    /// Read-modify-write in one transaction; `updated_at` moves only when a field changed.
    async fn update_user(&self, id: Uuid, changes: ProfileChanges)
        -> Result<Option<User>, AppError>;
    /// Removes the user's tasks and then the user, atomically.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError>;
    async fn list_tasks_by_owner(&self, owner_id: Uuid) -> Result<Vec<Task>, AppError>;
    async fn insert_task(&self, new: NewTask) -> Result<Task, AppError>;
    async fn update_task(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<Option<Task>, AppError>;
    /// Conditional status write. The flag is false when the task already had `status`.
    async fn set_task_status(
        &self,
        owner_id: Uuid,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<(Task, bool)>, AppError>;
    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<bool, AppError>;
    async fn delete_task_by_id(&self, id: Uuid) -> Result<bool, AppError>;
}

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let mut options: PgConnectOptions = cfg.url.parse().context("parse DATABASE_URL")?;
    if let Some(user) = &cfg.user {
        options = options.username(user);
    }
    if let Some(password) = &cfg.password {
        options = options.password(password);
    }
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("connect to database")?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run database migrations")?;
    Ok(())
}

/// Translates constraint violations into domain errors; anything else is transient.
pub(crate) fn map_constraint(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("users_username_key") => return AppError::UsernameTaken,
                Some("users_email_key") => return AppError::EmailTaken,
                _ => {}
            }
        }
        if db.is_foreign_key_violation() && db.constraint() == Some("tasks_owner_id_fkey") {
            // owner vanished between session resolve and insert
            return AppError::Unauthenticated;
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct PgRepository {
    db: PgPool,
}

impl PgRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        User::find_by_id(&self.db, id).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        User::find_by_username(&self.db, username).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        User::find_by_email(&self.db, email).await
    }

    async fn insert_user(&self, new: NewUser) -> Result<User, AppError> {
        User::create(&self.db, &new).await
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<User>, AppError> {
        User::update(&self.db, id, &changes).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        User::delete_cascade(&self.db, id).await
    }

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        Task::find_for_owner(&self.db, owner_id, id).await
    }

    async fn list_tasks_by_owner(&self, owner_id: Uuid) -> Result<Vec<Task>, AppError> {
        Task::list_by_owner(&self.db, owner_id).await
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, AppError> {
        Task::create(&self.db, &new).await
    }

    async fn update_task(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<Option<Task>, AppError> {
        Task::update(&self.db, owner_id, id, &patch).await
    }

    async fn set_task_status(
        &self,
        owner_id: Uuid,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<(Task, bool)>, AppError> {
        Task::set_status(&self.db, owner_id, id, status).await
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        Task::delete_for_owner(&self.db, owner_id, id).await
    }

    async fn delete_task_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        Task::delete_by_id(&self.db, id).await
    }
}

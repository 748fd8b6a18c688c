use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::map_constraint;
use crate::error::AppError;
use crate::tasks::repo_types::{NewTask, Task, TaskPatch, TaskRow, TaskStatus};

impl Task {
    pub async fn find_for_owner(
        db: &PgPool,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, duration, status, priority,
                   due_date, created_at, owner_id
              FROM tasks
             WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    pub async fn list_by_owner(db: &PgPool, owner_id: Uuid) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, duration, status, priority,
                   due_date, created_at, owner_id
              FROM tasks
             WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_all(db)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn create(db: &PgPool, new: &NewTask) -> Result<Task, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks (id, title, description, duration, status, priority, due_date, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, title, description, duration, status, priority,
                      due_date, created_at, owner_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.duration)
        .bind(new.status.code())
        .bind(new.priority.code())
        .bind(new.due_date)
        .bind(new.owner_id)
        .fetch_one(db)
        .await
        .map_err(map_constraint)?;
        Task::try_from(row)
    }

    /// Row-locked read-modify-write so concurrent patches linearize.
    pub async fn update(
        db: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, AppError> {
        let mut tx = db.begin().await?;
        let Some(mut task) = lock_for_owner(&mut tx, owner_id, id).await? else {
            return Ok(None);
        };
        if !task.apply(patch) {
            return Ok(Some(task));
        }
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
               SET title = $3, description = $4, duration = $5,
                   status = $6, priority = $7, due_date = $8
             WHERE id = $1 AND owner_id = $2
            RETURNING id, title, description, duration, status, priority,
                      due_date, created_at, owner_id
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.duration)
        .bind(task.status.code())
        .bind(task.priority.code())
        .bind(task.due_date)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Task::try_from(row).map(Some)
    }

    /// Writes `status` only when it differs; an equal status leaves the row untouched.
    pub async fn set_status(
        db: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<(Task, bool)>, AppError> {
        let moved = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
               SET status = $3
             WHERE id = $1 AND owner_id = $2 AND status <> $3
            RETURNING id, title, description, duration, status, priority,
                      due_date, created_at, owner_id
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(status.code())
        .fetch_optional(db)
        .await?;
        if let Some(row) = moved {
            return Ok(Some((Task::try_from(row)?, true)));
        }
        let current = Task::find_for_owner(db, owner_id, id).await?;
        Ok(current.map(|t| (t, false)))
    }

    pub async fn delete_for_owner(db: &PgPool, owner_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_by_id(db: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

async fn lock_for_owner(
    conn: &mut PgConnection,
    owner_id: Uuid,
    id: Uuid,
) -> Result<Option<Task>, AppError> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, title, description, duration, status, priority,
               due_date, created_at, owner_id
          FROM tasks
         WHERE id = $1 AND owner_id = $2
         FOR UPDATE
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(conn)
    .await?;
    row.map(Task::try_from).transpose()
}

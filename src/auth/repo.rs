use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, ProfileChanges, User};
use crate::db::map_constraint;
use crate::error::AppError;

impl User {
    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, first_name, last_name,
                   active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by username (case-sensitive).
    pub async fn find_by_username(db: &PgPool, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, first_name, last_name,
                   active, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, first_name, last_name,
                   active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a user; unique-index conflicts come back as `UsernameTaken`/`EmailTaken`.
    pub async fn create(db: &PgPool, new: &NewUser) -> Result<User, AppError> {
        let mut tx = db.begin().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, username, email, password_hash, first_name, last_name,
                      active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint)?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<User>, AppError> {
        let mut tx = db.begin().await?;
        let Some(mut user) = lock_by_id(&mut tx, id).await? else {
            return Ok(None);
        };
        if !user.apply(changes) {
            return Ok(Some(user));
        }
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET username = $2, email = $3, password_hash = $4,
                   first_name = $5, last_name = $6, updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, password_hash, first_name, last_name,
                      active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint)?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Delete the user's tasks and then the user in one transaction.
    pub async fn delete_cascade(db: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let mut tx = db.begin().await?;
        sqlx::query("DELETE FROM tasks WHERE owner_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }
}

async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password_hash, first_name, last_name,
               active, created_at, updated_at
        FROM users
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

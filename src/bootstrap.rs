use tracing::info;

use crate::{
    auth::{
        repo_types::{NewUser, User},
        services::{normalize_email, normalize_name},
    },
    error::AppError,
    state::AppState,
};

/// Creates the configured admin account unless a user with that username exists.
/// Safe to run on every start and from racing instances.
pub async fn ensure_admin(st: &AppState) -> Result<User, AppError> {
    let cfg = &st.config.admin;
    if let Some(existing) = st.repo.find_user_by_username(&cfg.username).await? {
        info!(username = %existing.username, "admin account already exists");
        return Ok(existing);
    }

    let password_hash = st.hasher.hash_async(&cfg.password).await?;
    let new = NewUser {
        username: normalize_name("username", &cfg.username)?,
        email: normalize_email(&cfg.email)?,
        password_hash,
        first_name: "Admin".into(),
        last_name: "User".into(),
        active: true,
    };
    match st.repo.insert_user(new).await {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, email = %user.email, "admin account created");
            Ok(user)
        }
        // another instance won the race, or the email belongs to someone else
        Err(AppError::UsernameTaken | AppError::EmailTaken) => {
            if let Some(admin) = st.repo.find_user_by_username(&cfg.username).await? {
                info!(user_id = %admin.id, "admin account created concurrently");
                return Ok(admin);
            }
            let owner = st
                .repo
                .find_user_by_email(&cfg.email.trim().to_lowercase())
                .await?
                .map(|u| u.username)
                .unwrap_or_default();
            Err(AppError::Fatal(anyhow::anyhow!(
                "admin email {} is used by account {:?}",
                cfg.email,
                owner
            )))
        }
        Err(e) => Err(e),
    }
}

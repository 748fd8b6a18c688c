use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{RegisterRequest, UpdateProfileRequest},
        password::check_policy,
        repo_types::{NewUser, ProfileChanges, User},
    },
    error::AppError,
    state::AppState,
};

pub const NAME_MAX: usize = 64;
const EMAIL_MAX: usize = 254;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[A-Za-z0-9_.\-]+@([A-Za-z0-9_\-]+\.)+[A-Za-z0-9_\-]{2,}$").expect("email regex compiles");
    }
    email.len() <= EMAIL_MAX && EMAIL_RE.is_match(email)
}

/// Trims and bounds a username or personal name.
pub(crate) fn normalize_name(field: &'static str, value: &str) -> Result<String, AppError> {
    let v = value.trim();
    if v.is_empty() || v.contains('\0') || v.chars().count() > NAME_MAX {
        return Err(AppError::InvalidName(field));
    }
    Ok(v.to_owned())
}

pub(crate) fn normalize_email(value: &str) -> Result<String, AppError> {
    let email = value.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::InvalidEmail);
    }
    Ok(email)
}

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<User, AppError> {
    let username = normalize_name("username", &req.username)?;
    let first_name = normalize_name("firstName", &req.first_name)?;
    let last_name = normalize_name("lastName", &req.last_name)?;
    let email = normalize_email(&req.email)?;
    if let Err(e) = check_policy(&req.password, st.config.password_policy.as_ref()) {
        warn!(%username, "registration rejected: weak password");
        return Err(e);
    }

    let password_hash = st.hasher.hash_async(&req.password).await?;
    let user = st
        .repo
        .insert_user(NewUser {
            username,
            email,
            password_hash,
            first_name,
            last_name,
            active: true,
        })
        .await
        .map_err(|e| {
            if matches!(e, AppError::UsernameTaken | AppError::EmailTaken) {
                warn!(reason = e.reason(), "registration rejected");
            }
            e
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Checks credentials. The distinct failures are collapsed at the HTTP edge.
pub async fn authenticate(st: &AppState, username: &str, password: &str) -> Result<User, AppError> {
    let Some(user) = st.repo.find_user_by_username(username).await? else {
        st.hasher.verify_decoy_async(password).await?;
        warn!(%username, "login unknown username");
        return Err(AppError::UnknownUser);
    };
    if !user.active {
        st.hasher.verify_decoy_async(password).await?;
        warn!(user_id = %user.id, "login to inactive account");
        return Err(AppError::InactiveAccount);
    }
    if !st.hasher.verify_async(password, &user.password_hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::BadCredentials);
    }
    Ok(user)
}

pub async fn profile(st: &AppState, user_id: Uuid) -> Result<User, AppError> {
    st.repo
        .find_user_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))
}

pub async fn update_profile(
    st: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<User, AppError> {
    let changes = ProfileChanges {
        username: req
            .username
            .as_deref()
            .map(|v| normalize_name("username", v))
            .transpose()?,
        email: req.email.as_deref().map(normalize_email).transpose()?,
        first_name: req
            .first_name
            .as_deref()
            .map(|v| normalize_name("firstName", v))
            .transpose()?,
        last_name: req
            .last_name
            .as_deref()
            .map(|v| normalize_name("lastName", v))
            .transpose()?,
        password_hash: None,
    };
    if changes.is_empty() {
        return profile(st, user_id).await;
    }
    let user = st
        .repo
        .update_user(user_id, changes)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

/// Replaces the password hash and closes the user's other sessions.
pub async fn change_password(
    st: &AppState,
    user_id: Uuid,
    new_password: &str,
    keep_session: Option<Uuid>,
) -> Result<(), AppError> {
    check_policy(new_password, st.config.password_policy.as_ref())?;
    let password_hash = st.hasher.hash_async(new_password).await?;
    let changes = ProfileChanges {
        password_hash: Some(password_hash),
        ..Default::default()
    };
    st.repo
        .update_user(user_id, changes)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let closed = st.sessions.close_all_for(user_id, keep_session);
    info!(%user_id, closed_sessions = closed, "password changed");
    Ok(())
}

/// Removes the user and all owned tasks, then drops every session of theirs.
pub async fn delete_account(st: &AppState, user_id: Uuid) -> Result<(), AppError> {
    if !st.repo.delete_user(user_id).await? {
        return Err(AppError::NotFound("user"));
    }
    let closed = st.sessions.close_all_for(user_id, None);
    info!(%user_id, closed_sessions = closed, "account deleted");
    Ok(())
}

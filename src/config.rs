use anyhow::Context;
use rand::RngCore;
use regex::Regex;

use crate::auth::services::is_valid_email;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct SessionConfig {
    pub secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub idle_timeout_minutes: i64,
    pub ttl_minutes: i64,
}

// Keeps the signing key out of Debug output.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("idle_timeout_minutes", &self.idle_timeout_minutes)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub admin: AdminConfig,
    /// Extra rule every new password must match on top of the built-in policy.
    pub password_policy: Option<Regex>,
    pub upcoming_window_days: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            user: std::env::var("DATABASE_USER").ok(),
            password: std::env::var("DATABASE_PASSWORD").ok(),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
        };

        let secret = match std::env::var("SESSION_SECRET") {
            Ok(s) if !s.is_empty() => s.into_bytes(),
            _ => {
                tracing::warn!("SESSION_SECRET not set; using a random per-process signing key");
                let mut key = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut key);
                key
            }
        };
        let session = SessionConfig {
            secret,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "taskboard".into()),
            audience: std::env::var("SESSION_AUDIENCE")
                .unwrap_or_else(|_| "taskboard-users".into()),
            idle_timeout_minutes: parse_var("SESSION_IDLE_TIMEOUT_MINUTES", 30)?,
            ttl_minutes: parse_var("SESSION_TTL_MINUTES", 12 * 60)?,
        };
        check_session_bounds(&session)?;

        let admin = AdminConfig {
            username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            email: std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".into()),
            password: std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "password123!".into()),
        };
        anyhow::ensure!(
            is_valid_email(&admin.email),
            "ADMIN_EMAIL is not a valid email address"
        );

        let password_policy = match std::env::var("PASSWORD_POLICY") {
            Ok(p) if !p.is_empty() => {
                Some(Regex::new(&p).context("PASSWORD_POLICY is not a valid regex")?)
            }
            _ => None,
        };

        let upcoming_window_days = parse_var("BOARD_UPCOMING_DAYS", 3)?;
        check_window_bounds(upcoming_window_days)?;

        Ok(Self {
            database,
            session,
            admin,
            password_policy,
            upcoming_window_days,
        })
    }
}

/// One year, in minutes.
const MAX_SESSION_MINUTES: i64 = 525_600;
const MAX_UPCOMING_DAYS: i64 = 366;

fn check_session_bounds(session: &SessionConfig) -> anyhow::Result<()> {
    for (name, value) in [
        ("SESSION_IDLE_TIMEOUT_MINUTES", session.idle_timeout_minutes),
        ("SESSION_TTL_MINUTES", session.ttl_minutes),
    ] {
        anyhow::ensure!(
            (1..=MAX_SESSION_MINUTES).contains(&value),
            "{name} must be between 1 and {MAX_SESSION_MINUTES}, got {value}"
        );
    }
    Ok(())
}

fn check_window_bounds(days: i64) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0..=MAX_UPCOMING_DAYS).contains(&days),
        "BOARD_UPCOMING_DAYS must be between 0 and {MAX_UPCOMING_DAYS}, got {days}"
    );
    Ok(())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value")),
        Err(_) => Ok(default),
    }
}

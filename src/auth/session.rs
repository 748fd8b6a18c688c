use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{claims::Claims, extractors::AuthUser, repo_types::User, services},
    config::SessionConfig,
    error::AppError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// Token signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.session)
    }
}

impl From<&SessionConfig> for JwtKeys {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&cfg.secret),
            decoding: DecodingKey::from_secret(&cfg.secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: Uuid, session_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, session_id = %session_id, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

struct SessionEntry {
    user_id: Uuid,
    last_seen: OffsetDateTime,
}

/// Process-wide table of live sessions with an idle timeout.
pub struct SessionStore {
    sessions: DashMap<Uuid, SessionEntry>,
    idle_timeout: TimeDuration,
}

impl SessionStore {
    pub fn new(idle_timeout: TimeDuration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    pub fn open(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                user_id,
                last_seen: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    /// True when the session exists, belongs to `user_id` and has not idled out.
    /// A live session gets its last-seen refreshed; an idle one is dropped.
    pub fn touch(&self, session_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> bool {
        let mut idle = false;
        let alive = match self.sessions.get_mut(&session_id) {
            Some(mut entry) if entry.user_id == user_id => {
                if now - entry.last_seen > self.idle_timeout {
                    idle = true;
                    false
                } else {
                    entry.last_seen = now;
                    true
                }
            }
            _ => false,
        };
        if idle {
            self.sessions.remove(&session_id);
        }
        alive
    }

    pub fn close(&self, session_id: Uuid) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Closes every session of `user_id` except `keep`.
    pub fn close_all_for(&self, user_id: Uuid, keep: Option<Uuid>) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|sid, e| e.user_id != user_id || Some(*sid) == keep);
        before.saturating_sub(self.sessions.len())
    }

    pub fn purge_idle(&self, now: OffsetDateTime) -> usize {
        let before = self.sessions.len();
        let timeout = self.idle_timeout;
        self.sessions.retain(|_, e| now - e.last_seen <= timeout);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

pub fn spawn_purger(sessions: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            let purged = sessions.purge_idle(OffsetDateTime::now_utc());
            if purged > 0 {
                debug!(purged, live = sessions.len(), "idle sessions purged");
            }
        }
    })
}

/// Authenticates and opens a session; returns the user and a signed token.
pub async fn login(
    st: &AppState,
    username: &str,
    password: &str,
) -> Result<(User, String), AppError> {
    let user = services::authenticate(st, username, password).await?;
    let session_id = st.sessions.open(user.id);
    let keys = JwtKeys::from_ref(st);
    let token = keys.sign(user.id, session_id).map_err(|e| {
        st.sessions.close(session_id);
        AppError::Fatal(e)
    })?;
    info!(user_id = %user.id, session_id = %session_id, "session opened");
    Ok((user, token))
}

/// Resolves a presented token to its principal, or `Unauthenticated`.
pub async fn resolve(st: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let keys = JwtKeys::from_ref(st);
    let claims = keys.verify(token).map_err(|e| {
        debug!(error = %e, "session token rejected");
        AppError::Unauthenticated
    })?;
    if !st
        .sessions
        .touch(claims.sid, claims.sub, OffsetDateTime::now_utc())
    {
        debug!(session_id = %claims.sid, "session closed or idle");
        return Err(AppError::Unauthenticated);
    }
    let user = match st.repo.find_user_by_id(claims.sub).await? {
        Some(u) if u.active => u,
        _ => {
            warn!(user_id = %claims.sub, "session for missing or inactive user");
            st.sessions.close(claims.sid);
            return Err(AppError::Unauthenticated);
        }
    };
    Ok(AuthUser {
        user,
        session_id: claims.sid,
    })
}

pub fn logout(st: &AppState, principal: &AuthUser) {
    if st.sessions.close(principal.session_id) {
        info!(user_id = %principal.user.id, session_id = %principal.session_id, "session closed");
    }
}

pub fn session_cookie(token: &str, max_age: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    )
}

pub fn cleared_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

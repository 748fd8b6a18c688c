use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{error, warn};

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*";

const DECOY_PASSWORD: &str = "decoy-password-0!";

/// Argon2id hasher. Clones share the cost parameters and the decoy digest.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    decoy: Arc<OnceLock<String>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::with_params(Params::default())
    }
}

impl Hasher {
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            decoy: Arc::new(OnceLock::new()),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Cost parameters are read from the digest itself. A digest that does not
    /// parse verifies as false.
    pub fn verify(&self, plain: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password digest is malformed");
                return false;
            }
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hashes on the blocking pool; Argon2 is deliberately slow.
    pub async fn hash_async(&self, plain: &str) -> Result<String, AppError> {
        let hasher = self.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AppError::Fatal(e.into()))?
            .map_err(AppError::Fatal)
    }

    pub async fn verify_async(&self, plain: &str, digest: &str) -> Result<bool, AppError> {
        let hasher = self.clone();
        let plain = plain.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
            .await
            .map_err(|e| AppError::Fatal(e.into()))
    }

    /// Digest of a fixed password, built once with this hasher's parameters.
    fn decoy_digest(&self) -> &str {
        self.decoy.get_or_init(|| {
            self.hash(DECOY_PASSWORD).unwrap_or_else(|e| {
                error!(error = %e, "failed to build decoy digest");
                String::new()
            })
        })
    }

    /// Spends one verification on the decoy digest, so logins for unknown or
    /// inactive accounts take as long as a wrong password.
    pub async fn verify_decoy_async(&self, plain: &str) -> Result<(), AppError> {
        let hasher = self.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || {
            let digest = hasher.decoy_digest().to_owned();
            hasher.verify(&plain, &digest)
        })
        .await
        .map_err(|e| AppError::Fatal(e.into()))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn decoy_built(&self) -> bool {
        self.decoy.get().is_some()
    }
}

/// Fixed rules: at least 8 chars, one ASCII digit, one of `!@#$%^&*`.
/// `extra` is an optional configured regex that must match as well.
pub fn check_policy(plain: &str, extra: Option<&Regex>) -> Result<(), AppError> {
    let long_enough = plain.chars().count() >= MIN_PASSWORD_LEN;
    let has_digit = plain.chars().any(|c| c.is_ascii_digit());
    let has_special = plain.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    let extra_ok = extra.map_or(true, |re| re.is_match(plain));
    if long_enough && has_digit && has_special && extra_ok {
        Ok(())
    } else {
        Err(AppError::WeakPassword)
    }
}

#[cfg(test)]
pub fn cheap_hasher() -> Hasher {
    Hasher::with_params(Params::new(Params::MIN_M_COST, 1, 1, None).expect("valid argon2 params"))
}

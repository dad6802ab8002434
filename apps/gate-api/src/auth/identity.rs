//! Identity resolution: credentials in, `(user_id, role)` out.
//!
//! The rest of the service never inspects a credential itself; it asks the
//! resolver and acts on the typed result.

use std::fmt;
use std::sync::Arc;

use crate::db::kv::KeyValueStore;
use crate::db::store::Store;
use crate::models::user::{Role, User};

use super::password;
use super::tokens::{self, SessionData};

/// Something a client presents to prove who it is.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Password { email: &'a str, password: &'a str },
    SessionToken(&'a str),
}

/// A resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    /// What this identity is allowed to do. One variant per dashboard.
    pub fn capability(&self) -> Capability {
        match self.role {
            Role::Admin => Capability::Admin(AdminUser {
                user_id: self.user_id,
            }),
            Role::Resident => Capability::Resident(ResidentUser {
                resident_id: self.user_id,
            }),
            Role::Gatekeeper => Capability::Gatekeeper(GatekeeperUser {
                user_id: self.user_id,
            }),
        }
    }
}

impl From<SessionData> for Identity {
    fn from(data: SessionData) -> Self {
        Self {
            user_id: data.user_id,
            role: data.role,
        }
    }
}

impl From<Identity> for SessionData {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.user_id,
            role: identity.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser {
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentUser {
    pub resident_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatekeeperUser {
    pub user_id: i64,
}

/// Session capabilities as a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Admin(AdminUser),
    Resident(ResidentUser),
    Gatekeeper(GatekeeperUser),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately indistinguishable.
    InvalidCredentials,
    /// Session token unknown, expired or revoked.
    InvalidToken,
    /// The backing stores failed.
    Unavailable(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => f.write_str("Invalid credentials"),
            AuthError::InvalidToken => f.write_str("Invalid or expired token"),
            AuthError::Unavailable(reason) => write!(f, "identity lookup failed: {reason}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
    kv: Arc<dyn KeyValueStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { store, kv }
    }

    pub async fn resolve(&self, credential: Credential<'_>) -> Result<Identity, AuthError> {
        match credential {
            Credential::Password { email, password } => self
                .authenticate(email, password)
                .await
                .map(|user| Identity {
                    user_id: user.id,
                    role: user.role,
                }),
            Credential::SessionToken(token) => tokens::lookup_session(self.kv.as_ref(), token)
                .await
                .map_err(|e| AuthError::Unavailable(e.message))?
                .map(Identity::from)
                .ok_or(AuthError::InvalidToken),
        }
    }

    /// Check an email/password pair and return the full user record.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim().to_lowercase();
        let user = self
            .store
            .user_by_email(&email)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)?;

        // Argon2 is CPU-bound; keep it off the async workers.
        let hash = user.password_hash.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if verified {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

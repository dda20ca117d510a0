use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};

const TOKEN_PREFIX: &str = "ink";
const MIN_SECRET_LEN: usize = 32;

/// The signed-in user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl From<&UserRecord> for CurrentUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("session lifetime exceeds supported range")]
    InvalidLifetime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionAuthError {
    #[error("invalid session token")]
    Invalid,
    #[error("expired session")]
    Expired,
    #[error("revoked session")]
    Revoked,
    #[error("session lookup failed")]
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct SessionIssued {
    pub record: SessionRecord,
    pub token: String,
}

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionsRepo>,
    users: Arc<dyn UsersRepo>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionsRepo>, users: Arc<dyn UsersRepo>, ttl: Duration) -> Self {
        Self {
            sessions,
            users,
            ttl,
        }
    }

    pub async fn issue(&self, user: &UserRecord) -> Result<SessionIssued, SessionError> {
        let lifetime =
            time::Duration::try_from(self.ttl).map_err(|_| SessionError::InvalidLifetime)?;
        let expires_at = OffsetDateTime::now_utc()
            .checked_add(lifetime)
            .ok_or(SessionError::InvalidLifetime)?;

        let prefix = Self::generate_prefix();
        let secret = Self::generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");

        let record = self
            .sessions
            .create_session(CreateSessionParams {
                user_id: user.id,
                prefix,
                secret_hash: Self::hash_secret(&secret),
                expires_at: Some(expires_at),
            })
            .await?;

        Ok(SessionIssued { record, token })
    }

    pub async fn authenticate(&self, token: &str) -> Result<CurrentUser, SessionAuthError> {
        let parsed = Self::parse_token(token).ok_or(SessionAuthError::Invalid)?;
        let record = self
            .sessions
            .find_session_by_prefix(&parsed.prefix)
            .await
            .map_err(|_| SessionAuthError::Unavailable)?
            .ok_or(SessionAuthError::Invalid)?;

        let now = OffsetDateTime::now_utc();
        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= now
        {
            return Err(SessionAuthError::Revoked);
        }
        if let Some(expires_at) = record.expires_at
            && expires_at <= now
        {
            return Err(SessionAuthError::Expired);
        }

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.secret_hash.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(SessionAuthError::Invalid);
        }

        let user = self
            .users
            .find_user_by_id(record.user_id)
            .await
            .map_err(|_| SessionAuthError::Unavailable)?
            .ok_or(SessionAuthError::Invalid)?;

        Ok(CurrentUser::from(&user))
    }

    /// Revoke the session behind `token`. Unknown tokens and tokens whose
    /// secret does not match are ignored.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let Some(parsed) = Self::parse_token(token) else {
            return Ok(());
        };
        let Some(record) = self.sessions.find_session_by_prefix(&parsed.prefix).await? else {
            return Ok(());
        };

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.secret_hash.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(());
        }

        self.sessions
            .revoke_session(record.id, OffsetDateTime::now_utc())
            .await?;
        Ok(())
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_prefix() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken> {
        let mut parts = token.trim().splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
            return None;
        }
        Some(ParsedToken {
            prefix: prefix.to_string(),
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

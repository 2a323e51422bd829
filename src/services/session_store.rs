use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entities::{admin_sessions, prelude::*};
use crate::utils::auth::{
    create_session_token, decode_session_token_unchecked, validate_session_token,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Value carried by the session cookie
    pub token: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

/// Server-side record of authenticated admin sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, subject: &str, ttl: Duration) -> Result<Session>;
    /// `None` for unknown, revoked or expired tokens
    async fn validate(&self, token: &str) -> Result<Option<Session>>;
    /// Returns whether a live session was removed
    async fn invalidate(&self, token: &str) -> Result<bool>;
    /// Drops expired sessions, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// Signed tokens whose ids are tracked in the `admin_sessions` table
pub struct DbSessionStore {
    db: DatabaseConnection,
    secret: String,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection, secret: String) -> Self {
        Self { db, secret }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn create(&self, subject: &str, ttl: Duration) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + ttl;
        let token = create_session_token(subject, &id, expires_at, &self.secret)?;

        admin_sessions::ActiveModel {
            id: Set(id),
            subject: Set(subject.to_string()),
            created_at: Set(now),
            expires_at: Set(expires_at),
        }
        .insert(&self.db)
        .await?;

        Ok(Session {
            token,
            subject: subject.to_string(),
            expires_at,
        })
    }

    async fn validate(&self, token: &str) -> Result<Option<Session>> {
        let claims = match validate_session_token(token, &self.secret) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected session token: {}", e);
                return Ok(None);
            }
        };

        let row = AdminSessions::find_by_id(claims.jti)
            .filter(admin_sessions::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await?;

        Ok(row.map(|row| Session {
            token: token.to_string(),
            subject: row.subject,
            expires_at: row.expires_at,
        }))
    }

    async fn invalidate(&self, token: &str) -> Result<bool> {
        let Ok(claims) = decode_session_token_unchecked(token, &self.secret) else {
            return Ok(false);
        };

        let res = AdminSessions::delete_by_id(claims.jti)
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let res = AdminSessions::delete_many()
            .filter(admin_sessions::Column::ExpiresAt.lte(Utc::now()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

/// Process-local sessions keyed by opaque random tokens; lost on restart
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, subject: &str, ttl: Duration) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            subject: subject.to_string(),
            expires_at: Utc::now() + ttl,
        };
        self.sessions
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn validate(&self, token: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        let live = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .filter(|session| session.expires_at > now);

        if live.is_none() {
            self.sessions.remove_if(token, |_, s| s.expires_at <= now);
        }
        Ok(live)
    }

    async fn invalidate(&self, token: &str) -> Result<bool> {
        Ok(self
            .sessions
            .remove(token)
            .is_some_and(|(_, s)| s.expires_at > Utc::now()))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut removed = 0u64;
        self.sessions.retain(|_, s| {
            let live = s.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }
}

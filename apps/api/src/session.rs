//! In-memory sessions. Each session owns one wine library and its pending
//! merge suggestions; both are dropped when the session ends or expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::wine::dedup::PendingSuggestions;
use crate::wine::library::WineLibrary;

pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub library: WineLibrary,
    pub pending: PendingSuggestions,
    pub created_at: DateTime<Utc>,
    last_seen: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub token: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub idle_timeout_secs: u64,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn create(&self, username: &str) -> SessionInfo {
        let session = Session {
            id: Uuid::new_v4(),
            username: username.to_string(),
            library: WineLibrary::new(),
            pending: PendingSuggestions::default(),
            created_at: Utc::now(),
            last_seen: Instant::now(),
        };
        let info = SessionInfo {
            token: session.id,
            username: session.username.clone(),
            created_at: session.created_at,
            idle_timeout_secs: self.ttl.as_secs(),
        };

        let mut sessions = self.sessions.lock().await;
        self.evict_expired(&mut sessions);
        sessions.insert(session.id, session);
        info
    }

    /// Ends a session. Returns false if it did not exist.
    pub async fn end(&self, token: Uuid) -> bool {
        self.sessions.lock().await.remove(&token).is_some()
    }

    /// Runs `f` against a live session, refreshing its idle timer.
    /// Returns `None` for unknown or expired tokens.
    pub async fn with_session<R>(&self, token: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.lock().await;
        self.evict_expired(&mut sessions);
        let session = sessions.get_mut(&token)?;
        session.last_seen = Instant::now();
        Some(f(session))
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn evict_expired(&self, sessions: &mut HashMap<Uuid, Session>) {
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_seen) < self.ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, "expired sessions evicted");
        }
    }
}

/// Authenticated caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: Uuid,
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|t| Uuid::parse_str(t.trim()).ok())
            .ok_or(AppError::Unauthorized)?;

        let state = AppState::from_ref(state);
        let username = state
            .sessions
            .with_session(token, |s| s.username.clone())
            .await
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentSession { token, username })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_use_and_end() {
        let store = SessionStore::new(Duration::from_secs(60));
        let info = store.create("sommelier").await;
        assert_eq!(info.idle_timeout_secs, 60);

        let name = store.with_session(info.token, |s| s.username.clone()).await;
        assert_eq!(name.as_deref(), Some("sommelier"));

        assert!(store.end(info.token).await);
        assert!(!store.end(info.token).await);
        assert!(store.with_session(info.token, |_| ()).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_have_separate_libraries() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create("a").await.token;
        let b = store.create("b").await.token;

        store
            .with_session(a, |s| {
                s.library
                    .commit(crate::wine::WineRecord::new("Barolo", crate::wine::RecordSource::Manual))
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.with_session(a, |s| s.library.records().len()).await, Some(1));
        assert_eq!(store.with_session(b, |s| s.library.records().len()).await, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(60));
        let stale = store.create("stale").await.token;
        let active = store.create("active").await.token;

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(store.with_session(active, |_| ()).await.is_some());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.with_session(stale, |_| ()).await.is_none());
        assert!(store.with_session(active, |_| ()).await.is_some());
        assert_eq!(store.active_count().await, 1);
    }
}

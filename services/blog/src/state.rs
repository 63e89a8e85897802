//! Application state shared across handlers

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use tracing::info;
use uuid::Uuid;

use crate::{
    app::{App, AppOptions, Backend},
    blob::BlobStore,
    identity::IdentityProvider,
    repositories::BlogRepository,
};

/// Builds the identity provider of a new session
pub type IdentityFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

/// A live session and when a client last touched it
struct SessionEntry {
    app: Arc<App>,
    last_seen: Instant,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BlogRepository>,
    pub blob: Arc<dyn BlobStore>,
    pub identity_factory: IdentityFactory,
    pub options: AppOptions,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn BlogRepository>,
        blob: Arc<dyn BlobStore>,
        identity_factory: IdentityFactory,
        options: AppOptions,
    ) -> Self {
        Self {
            repository,
            blob,
            identity_factory,
            options,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Adapters for a new session: shared store and blobs, fresh identity
    pub fn backend(&self) -> Backend {
        Backend {
            identity: (self.identity_factory)(),
            repository: self.repository.clone(),
            blob: self.blob.clone(),
        }
    }

    /// Register a started session and return its id
    pub async fn insert_session(&self, app: Arc<App>) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                app,
                last_seen: Instant::now(),
            },
        );
        id
    }

    /// Look up a session and mark it as used
    pub async fn session(&self, id: &Uuid) -> Option<Arc<App>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.app.clone())
    }

    /// Remove a session and stop its identity listener
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(entry) => {
                entry.app.shutdown();
                true
            }
            None => false,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session untouched for at least `idle`; returns how many went
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let expired: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_seen.elapsed() >= idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for entry in &expired {
            entry.app.shutdown();
        }
        if !expired.is_empty() {
            info!("Evicted {} idle sessions", expired.len());
        }
        expired.len()
    }

    /// Periodically evict sessions idle for `idle`, checking every `every`
    pub fn spawn_session_sweeper(&self, idle: Duration, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                state.evict_idle(idle).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::MemoryBlobStore, identity::MemoryIdentityProvider,
        repositories::MemoryBlogRepository,
    };

    fn state() -> AppState {
        let identity_factory: IdentityFactory =
            Arc::new(|| Arc::new(MemoryIdentityProvider::new()) as Arc<dyn IdentityProvider>);
        AppState::new(
            Arc::new(MemoryBlogRepository::new()),
            Arc::new(MemoryBlobStore::default()),
            identity_factory,
            AppOptions::default(),
        )
    }

    async fn open(state: &AppState) -> Uuid {
        let app = App::start(state.backend(), state.options.clone()).await;
        state.insert_session(app).await
    }

    #[tokio::test]
    async fn test_recently_used_sessions_survive_eviction() {
        let state = state();
        let id = open(&state).await;

        assert_eq!(state.evict_idle(Duration::from_secs(60)).await, 0);
        assert!(state.session(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let state = state();
        let stale = open(&state).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = open(&state).await;

        assert_eq!(state.evict_idle(Duration::from_millis(30)).await, 1);
        assert!(state.session(&stale).await.is_none());
        assert!(state.session(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn test_sweeper_empties_abandoned_sessions() {
        let state = state();
        open(&state).await;
        open(&state).await;

        let sweeper =
            state.spawn_session_sweeper(Duration::from_millis(20), Duration::from_millis(10));
        let mut remaining = state.session_count().await;
        for _ in 0..50 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = state.session_count().await;
        }
        sweeper.abort();

        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_remove_session_reports_absence() {
        let state = state();
        let id = open(&state).await;

        assert!(state.remove_session(&id).await);
        assert!(!state.remove_session(&id).await);
        assert_eq!(state.session_count().await, 0);
    }
}

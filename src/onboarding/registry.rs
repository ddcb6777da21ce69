//! Live onboarding sessions keyed by id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{OnboardingSession, SessionDeps};
use super::state::OnboardingStep;
use crate::config::OnboardingConfig;
use crate::error::OnboardingError;

pub struct SessionRegistry {
    config: OnboardingConfig,
    deps: SessionDeps,
    sessions: RwLock<HashMap<Uuid, Arc<OnboardingSession>>>,
}

impl SessionRegistry {
    pub fn new(config: OnboardingConfig, deps: SessionDeps) -> Arc<Self> {
        Arc::new(Self {
            config,
            deps,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Open a fresh session with its own state and event channel.
    pub async fn create(&self) -> Arc<OnboardingSession> {
        let session = OnboardingSession::new(self.config.clone(), self.deps.clone());
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id(), Arc::clone(&session));
        info!(session_id = %session.id(), active = sessions.len(), "Session created");
        session
    }

    /// Look up a session and mark it active.
    pub async fn get(&self, id: Uuid) -> Result<Arc<OnboardingSession>, OnboardingError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OnboardingError::SessionNotFound { id })?;
        session.touch();
        Ok(session)
    }

    /// Close and forget a session.
    pub async fn remove(&self, id: Uuid) -> Result<(), OnboardingError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(OnboardingError::SessionNotFound { id })?;
        session.close().await;
        info!(session_id = %id, "Session removed");
        Ok(())
    }

    /// Close and forget every completed session and every session idle for
    /// longer than the configured TTL. Returns how many were removed.
    pub async fn expire_idle(&self) -> usize {
        let ttl = self.config.session_ttl;
        let candidates: Vec<Arc<OnboardingSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for session in candidates {
            if session.idle_for() >= ttl || session.step().await == OnboardingStep::Complete {
                expired.push(session.id());
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<OnboardingSession>> = {
            let mut sessions = self.sessions.write().await;
            expired.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &removed {
            session.close().await;
            debug!(session_id = %session.id(), "Session expired");
        }
        info!(expired = removed.len(), "Expired onboarding sessions");
        removed.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Sweep expired sessions every `session_sweep_interval`.
pub fn spawn_expiry_task(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(registry.config.session_sweep_interval);
        loop {
            interval.tick().await;
            registry.expire_idle().await;
        }
    })
}

//! Integration detection engine: checks whether the embed snippet is live.
//!
//! The check is simulated: after a fixed delay it succeeds with a configured
//! probability drawn from the injected [`RandomSource`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::events::SessionEvent;
use crate::clock::Clock;
use crate::error::OnboardingError;
use crate::random::RandomSource;

/// State of the integration check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationState {
    #[default]
    NotStarted,
    Detecting,
    Success,
    Failed,
}

impl IntegrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Detecting => "detecting",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Observable detection state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionState {
    pub state: IntegrationState,
    /// Number of detection attempts started in this session.
    pub attempts: u32,
    #[serde(skip)]
    run: u64,
}

/// Simulated integration detection for one session.
pub struct DetectionEngine {
    delay: Duration,
    success_probability: f64,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    state: Arc<RwLock<DetectionState>>,
    events: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<CancellationToken>>,
}

impl DetectionEngine {
    pub fn new(
        delay: Duration,
        success_probability: f64,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            delay,
            success_probability,
            clock,
            random,
            state: Arc::new(RwLock::new(DetectionState::default())),
            events,
            active: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> DetectionState {
        self.state.read().await.clone()
    }

    pub async fn state(&self) -> IntegrationState {
        self.state.read().await.state
    }

    /// Start a detection attempt. Rejected while one is already running.
    pub async fn start_detection(&self) -> Result<(), OnboardingError> {
        let token = CancellationToken::new();
        let run = {
            let mut state = self.state.write().await;
            if state.state == IntegrationState::Detecting {
                return Err(OnboardingError::DetectionInProgress);
            }
            state.run += 1;
            state.attempts += 1;
            state.state = IntegrationState::Detecting;
            let _ = self.events.send(SessionEvent::IntegrationStateChanged {
                state: IntegrationState::Detecting,
            });
            info!(attempt = state.attempts, "Integration detection started");
            state.run
        };

        {
            let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }

        self.spawn_resolution(run, token);
        Ok(())
    }

    /// Same as [`DetectionEngine::start_detection`]; offered after a failure.
    pub async fn retry_detection(&self) -> Result<(), OnboardingError> {
        self.start_detection().await
    }

    /// Abandon an in-flight attempt. Returns `true` if one was running.
    pub async fn cancel(&self) -> bool {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(token) = active {
            token.cancel();
        }

        let mut state = self.state.write().await;
        if state.state != IntegrationState::Detecting {
            return false;
        }
        state.run += 1;
        state.state = IntegrationState::NotStarted;
        let _ = self.events.send(SessionEvent::IntegrationStateChanged {
            state: IntegrationState::NotStarted,
        });
        debug!("Integration detection cancelled");
        true
    }

    /// Drop any attempt and the attempt count.
    pub async fn reset(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(token) = active {
            token.cancel();
        }

        let mut state = self.state.write().await;
        let previous = state.state;
        *state = DetectionState {
            run: state.run + 1,
            ..DetectionState::default()
        };
        if previous != IntegrationState::NotStarted {
            let _ = self.events.send(SessionEvent::IntegrationStateChanged {
                state: IntegrationState::NotStarted,
            });
        }
    }

    fn spawn_resolution(&self, run: u64, token: CancellationToken) {
        let clock = Arc::clone(&self.clock);
        let random = Arc::clone(&self.random);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let delay = self.delay;
        let probability = self.success_probability;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = clock.sleep(delay) => {}
            }

            let mut guard = state.write().await;
            if guard.run != run {
                return;
            }
            let outcome = if random.next_bool(probability) {
                IntegrationState::Success
            } else {
                IntegrationState::Failed
            };
            guard.state = outcome;
            let _ = events.send(SessionEvent::IntegrationStateChanged { state: outcome });
            info!(attempt = guard.attempts, %outcome, "Integration detection resolved");
        });
    }
}

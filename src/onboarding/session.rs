//! OnboardingSession: one user's pass through the onboarding flow.
//!
//! A session owns everything the flow touches: the cached user, the
//! organization profile, both simulated engines and the current step. Every
//! observable change goes out on the session's broadcast channel.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detection::{DetectionEngine, DetectionState, IntegrationState};
use super::events::{EVENT_CHANNEL_CAPACITY, SessionEvent};
use super::insight::{InsightProvider, StaticInsights, WebsiteInsight};
use super::model::{OrganizationProfile, PageScanRecord, ProfileUpdate, WebsiteAnalysisSummary};
use super::state::{FlowState, OnboardingStep};
use super::training::{
    PageSource, SimulatedCrawl, TrainingEngine, TrainingState, TrainingStatus, TrainingTiming,
    emit_validation, validate_website_url,
};
use crate::clock::{Clock, TokioClock};
use crate::config::OnboardingConfig;
use crate::error::{Error, IdentityError, OnboardingError, Result};
use crate::identity::{IdentityGateway, User};
use crate::random::{RandomSource, StdRandom};

/// Collaborators injected into every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub identity: Arc<dyn IdentityGateway>,
    pub insights: Arc<dyn InsightProvider>,
    pub pages: Arc<dyn PageSource>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

impl SessionDeps {
    /// Real timers, the static insight table and the simulated crawler.
    pub fn simulated(config: &OnboardingConfig, identity: Arc<dyn IdentityGateway>) -> Self {
        let random: Arc<dyn RandomSource> = match config.random_seed {
            Some(seed) => Arc::new(StdRandom::seeded(seed)),
            None => Arc::new(StdRandom::from_entropy()),
        };
        Self {
            identity,
            insights: Arc::new(StaticInsights::default()),
            pages: Arc::new(SimulatedCrawl),
            clock: Arc::new(TokioClock),
            random,
        }
    }
}

/// Serializable view of a whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user: Option<User>,
    pub step: OnboardingStep,
    pub profile: OrganizationProfile,
    pub training: TrainingState,
    pub integration: DetectionState,
    pub embed_snippet: String,
}

/// What the organization step hands to the integration steps.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationSubmission {
    pub profile: OrganizationProfile,
    pub pages: Vec<PageScanRecord>,
}

/// Analysis baseline derived from the last insight lookup.
struct InsightSeed {
    url: String,
    analysis: WebsiteAnalysisSummary,
}

pub struct OnboardingSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: OnboardingConfig,
    identity: Arc<dyn IdentityGateway>,
    insights: Arc<dyn InsightProvider>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    user: RwLock<Option<User>>,
    profile: RwLock<OrganizationProfile>,
    seed: RwLock<Option<InsightSeed>>,
    flow: RwLock<FlowState>,
    training: TrainingEngine,
    detection: DetectionEngine,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    poller: Mutex<Option<CancellationToken>>,
    last_active: Mutex<Instant>,
}

impl OnboardingSession {
    pub fn new(config: OnboardingConfig, deps: SessionDeps) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let timing = TrainingTiming {
            page_delay: config.page_delay,
            training_delay: config.training_delay,
            aggregation: config.aggregation,
        };
        let training =
            TrainingEngine::new(timing, Arc::clone(&deps.clock), deps.pages, events.clone());
        let detection = DetectionEngine::new(
            config.detection_delay,
            config.detection_success_probability,
            Arc::clone(&deps.clock),
            Arc::clone(&deps.random),
            events.clone(),
        );

        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config,
            identity: deps.identity,
            insights: deps.insights,
            clock: deps.clock,
            random: deps.random,
            user: RwLock::new(None),
            profile: RwLock::new(OrganizationProfile::default()),
            seed: RwLock::new(None),
            flow: RwLock::new(FlowState::default()),
            training,
            detection,
            events,
            shutdown: CancellationToken::new(),
            poller: Mutex::new(None),
            last_active: Mutex::new(Instant::now()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cancelled once the session is closed.
    pub fn closed(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            created_at: self.created_at,
            user: self.user.read().await.clone(),
            step: self.flow.read().await.step,
            profile: self.profile.read().await.clone(),
            training: self.training.snapshot().await,
            integration: self.detection.snapshot().await,
            embed_snippet: self.embed_snippet(),
        }
    }

    pub async fn step(&self) -> OnboardingStep {
        self.flow.read().await.step
    }

    /// Record client activity; the registry expires idle sessions.
    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
    }

    // ── Identity ────────────────────────────────────────────────────────

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    /// Create an account. The user lands on the verify-email step.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> Result<User> {
        let user = self
            .identity
            .sign_up(email, password, display_name)
            .await
            .map_err(|e| self.identity_failed(e))?;
        info!(session_id = %self.id, user_id = %user.id, "User signed up");
        *self.user.write().await = Some(user.clone());
        self.advance_after_auth(OnboardingStep::VerifyEmail).await;
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<User> {
        let user = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|e| self.identity_failed(e))?;
        self.accept_user(user).await
    }

    pub async fn sign_in_with_google(&self) -> Result<User> {
        let user = self
            .identity
            .sign_in_with_google()
            .await
            .map_err(|e| self.identity_failed(e))?;
        self.accept_user(user).await
    }

    /// Sign out and start over from the register step.
    pub async fn sign_out(&self) -> Result<()> {
        let user = self.require_user().await?;
        self.identity
            .sign_out(&user.id)
            .await
            .map_err(|e| self.identity_failed(e))?;

        self.stop_poller();
        self.training.reset().await;
        self.detection.reset().await;
        *self.user.write().await = None;
        *self.seed.write().await = None;
        {
            let mut profile = self.profile.write().await;
            *profile = OrganizationProfile::default();
            let _ = self.events.send(SessionEvent::ProfileUpdated {
                profile: profile.clone(),
            });
        }
        {
            let mut flow = self.flow.write().await;
            flow.reset();
            let _ = self.events.send(SessionEvent::StepChanged { step: flow.step });
        }
        info!(session_id = %self.id, user_id = %user.id, "User signed out");
        Ok(())
    }

    pub async fn resend_verification(&self) -> Result<()> {
        let user = self.require_user().await?;
        self.identity
            .send_verification_email(&user.id)
            .await
            .map_err(|e| self.identity_failed(e))?;
        info!(session_id = %self.id, user_id = %user.id, "Verification email re-sent");
        Ok(())
    }

    /// Reload the user; once verified, leave the verify-email step.
    pub async fn check_verification(&self) -> Result<bool> {
        let current = self.require_user().await?;
        let fresh = self
            .identity
            .reload_user(&current.id)
            .await
            .map_err(|e| self.identity_failed(e))?;
        let verified = fresh.email_verified;
        {
            let mut user = self.user.write().await;
            match user.as_mut() {
                Some(u) if u.id == fresh.id => *u = fresh,
                // Signed out while the reload was in flight.
                _ => return Ok(false),
            }
        }
        if verified {
            self.advance_after_auth(OnboardingStep::SetupOrganization)
                .await;
        }
        Ok(verified)
    }

    /// Poll [`OnboardingSession::check_verification`] every poll interval
    /// until the email is verified, the user signs out or the session closes.
    pub fn watch_verification(self: &Arc<Self>) -> JoinHandle<()> {
        let token = self.shutdown.child_token();
        if let Some(previous) = self
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(token.clone())
        {
            previous.cancel();
        }

        let session = Arc::downgrade(self);
        let clock = Arc::clone(&self.clock);
        let interval = self.config.verification_poll_interval;
        let id = self.id;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = clock.sleep(interval) => {}
                }
                let Some(session) = session.upgrade() else {
                    break;
                };
                match session.check_verification().await {
                    Ok(true) => {
                        info!(session_id = %id, "Email verified");
                        break;
                    }
                    Ok(false) => {}
                    Err(Error::Identity(IdentityError::NotSignedIn)) => break,
                    Err(e) => debug!(session_id = %id, error = %e, "Verification check failed"),
                }
            }
            debug!(session_id = %id, "Verification watcher stopped");
        })
    }

    // ── Organization ────────────────────────────────────────────────────

    pub async fn profile(&self) -> OrganizationProfile {
        self.profile.read().await.clone()
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> OrganizationProfile {
        let mut profile = self.profile.write().await;
        profile.merge(update);
        let _ = self.events.send(SessionEvent::ProfileUpdated {
            profile: profile.clone(),
        });
        profile.clone()
    }

    /// Look up the site and merge its metadata into the profile.
    pub async fn fetch_insights(
        &self,
        website_url: &str,
    ) -> std::result::Result<WebsiteInsight, OnboardingError> {
        let url = self.validated_url(website_url)?;
        Ok(self.load_insights(url).await.0)
    }

    /// Scan the site, fetching insights first if this URL has none yet.
    pub async fn start_scan(&self, website_url: &str) -> Result<()> {
        self.require_user().await?;
        let url = self.validated_url(website_url)?;
        let cached = self
            .seed
            .read()
            .await
            .as_ref()
            .filter(|seed| seed.url == url)
            .map(|seed| seed.analysis.clone());
        let seed = match cached {
            Some(analysis) => analysis,
            None => self.load_insights(url).await.1,
        };
        self.training.start_scan(url, Some(seed)).await?;
        Ok(())
    }

    pub async fn retry_training(&self) -> Result<()> {
        self.require_user().await?;
        self.training.retry_training().await?;
        Ok(())
    }

    pub async fn cancel_scan(&self) -> bool {
        self.training.cancel().await
    }

    /// Hand the organization over to the integration steps.
    pub async fn submit_organization(
        &self,
    ) -> std::result::Result<OrganizationSubmission, OnboardingError> {
        let training = self.training.snapshot().await;
        if training.status != TrainingStatus::Completed {
            warn!(session_id = %self.id, status = %training.status, "Submit before training completed");
            return Err(OnboardingError::TrainingIncomplete);
        }
        self.transition(OnboardingStep::IntegrationOptions).await?;
        let profile = self.profile.read().await.clone();
        info!(
            session_id = %self.id,
            organization = %profile.name,
            pages = training.pages.len(),
            "Organization submitted"
        );
        Ok(OrganizationSubmission {
            profile,
            pages: training.pages,
        })
    }

    // ── Flow ────────────────────────────────────────────────────────────

    /// Move to `target`. Steps with their own preconditions route through
    /// the operation that checks them.
    pub async fn navigate(&self, target: OnboardingStep) -> Result<OnboardingStep> {
        let user = self.user.read().await.clone();
        if target.requires_user() && user.is_none() {
            return Err(IdentityError::NotSignedIn.into());
        }

        let from = self.step().await;
        match (from, target) {
            (_, OnboardingStep::Complete) => {
                self.complete().await?;
            }
            (OnboardingStep::SetupOrganization, OnboardingStep::IntegrationOptions) => {
                self.submit_organization().await?;
            }
            (
                OnboardingStep::Register | OnboardingStep::VerifyEmail,
                OnboardingStep::SetupOrganization,
            ) if !user.as_ref().is_some_and(|u| u.email_verified) => {
                return Err(OnboardingError::EmailNotVerified.into());
            }
            _ => {
                self.transition(target).await?;
            }
        }
        Ok(target)
    }

    pub fn embed_snippet(&self) -> String {
        self.config.embed.render()
    }

    /// Start checking for the installed widget. From the test-website step
    /// this also moves the flow onto the detection step.
    pub async fn start_detection(&self) -> Result<()> {
        self.require_user().await?;
        self.detection.start_detection().await?;
        if self.step().await == OnboardingStep::TestWebsite {
            self.transition(OnboardingStep::IntegrationDetection).await?;
        }
        Ok(())
    }

    pub async fn retry_detection(&self) -> Result<()> {
        self.require_user().await?;
        self.detection.retry_detection().await?;
        Ok(())
    }

    /// Mail the integration instructions to a developer; the signed-in
    /// user's own address when `recipient` is empty.
    pub async fn send_developer_instructions(&self, recipient: Option<&str>) -> Result<String> {
        let user = self.require_user().await?;
        if matches!(
            self.step().await,
            OnboardingStep::Register | OnboardingStep::VerifyEmail | OnboardingStep::SetupOrganization
        ) {
            return Err(OnboardingError::IntegrationNotReady.into());
        }

        let recipient = match recipient.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) if !r.contains('@') => {
                let err = OnboardingError::required(
                    "developer_email",
                    "Please enter a valid email address",
                );
                emit_validation(&self.events, &err);
                return Err(err.into());
            }
            Some(r) => r.to_string(),
            None => user.email,
        };

        let _ = self.events.send(SessionEvent::DeveloperInstructionsSent {
            recipient: recipient.clone(),
        });
        info!(session_id = %self.id, %recipient, "Integration instructions sent to developer");
        Ok(recipient)
    }

    pub async fn cancel_detection(&self) -> bool {
        self.detection.cancel().await
    }

    /// Finish onboarding. Only a detected integration can complete it.
    pub async fn complete(&self) -> std::result::Result<(), OnboardingError> {
        if self.detection.state().await != IntegrationState::Success {
            return Err(OnboardingError::IntegrationNotDetected);
        }
        self.transition(OnboardingStep::Complete).await?;
        self.stop_poller();
        info!(session_id = %self.id, "Onboarding complete");
        Ok(())
    }

    /// Stop every background task. The session stays readable.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.training.cancel().await;
        self.detection.cancel().await;
        *self.user.write().await = None;
        debug!(session_id = %self.id, "Session closed");
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn accept_user(&self, user: User) -> Result<User> {
        info!(session_id = %self.id, user_id = %user.id, verified = user.email_verified, "User signed in");
        let next = if user.email_verified {
            OnboardingStep::SetupOrganization
        } else {
            OnboardingStep::VerifyEmail
        };
        *self.user.write().await = Some(user.clone());
        self.advance_after_auth(next).await;
        Ok(user)
    }

    /// Identity results only move the flow while it is still on the
    /// account steps.
    async fn advance_after_auth(&self, target: OnboardingStep) {
        let mut flow = self.flow.write().await;
        if !matches!(
            flow.step,
            OnboardingStep::Register | OnboardingStep::VerifyEmail
        ) {
            return;
        }
        let from = flow.step;
        if flow.advance_to(target).is_ok() {
            let _ = self.events.send(SessionEvent::StepChanged { step: target });
            info!(session_id = %self.id, %from, to = %target, "Onboarding step changed");
        }
    }

    async fn transition(
        &self,
        target: OnboardingStep,
    ) -> std::result::Result<OnboardingStep, OnboardingError> {
        let mut flow = self.flow.write().await;
        let from = flow.step;
        flow.advance_to(target)
            .map_err(|_| OnboardingError::InvalidTransition {
                from: from.to_string(),
                to: target.to_string(),
            })?;
        let _ = self.events.send(SessionEvent::StepChanged { step: target });
        info!(session_id = %self.id, %from, to = %target, "Onboarding step changed");
        Ok(target)
    }

    async fn load_insights(&self, url: &str) -> (WebsiteInsight, WebsiteAnalysisSummary) {
        let insight = self.insights.lookup(url);
        let analysis = insight.seed_analysis(
            self.config.estimated_total_pages,
            self.config.keyword_frequency_ceiling,
            self.random.as_ref(),
        );
        {
            let mut profile = self.profile.write().await;
            profile.website_url = url.to_string();
            insight.apply_to(&mut profile);
            let _ = self.events.send(SessionEvent::ProfileUpdated {
                profile: profile.clone(),
            });
        }
        *self.seed.write().await = Some(InsightSeed {
            url: url.to_string(),
            analysis: analysis.clone(),
        });
        info!(session_id = %self.id, url, industry = %insight.industry, "Website insights fetched");
        (insight, analysis)
    }

    fn validated_url<'a>(&self, url: &'a str) -> std::result::Result<&'a str, OnboardingError> {
        validate_website_url(url).inspect_err(|e| emit_validation(&self.events, e))
    }

    async fn require_user(&self) -> Result<User> {
        Ok(self
            .user
            .read()
            .await
            .clone()
            .ok_or(IdentityError::NotSignedIn)?)
    }

    fn identity_failed(&self, err: IdentityError) -> Error {
        warn!(session_id = %self.id, error = %err, "Identity operation failed");
        let _ = self.events.send(SessionEvent::IdentityFailed {
            message: err.user_message(),
        });
        err.into()
    }

    fn stop_poller(&self) {
        if let Some(token) = self
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            token.cancel();
        }
    }
}

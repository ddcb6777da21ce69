//! Session events: every observable state change, fanned out to subscribers.

use serde::Serialize;

use super::detection::IntegrationState;
use super::model::{OrganizationProfile, PageScanRecord, WebsiteAnalysisSummary};
use super::session::SessionSnapshot;
use super::state::OnboardingStep;
use super::training::TrainingStatus;

/// Default broadcast channel capacity.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One discrete state change within a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full state, sent on connect and after a lagged receiver.
    SessionSync {
        #[serde(flatten)]
        snapshot: Box<SessionSnapshot>,
    },
    TrainingStatusChanged {
        status: TrainingStatus,
    },
    PageArrived {
        index: usize,
        page: PageScanRecord,
    },
    AnalysisUpdated {
        analysis: WebsiteAnalysisSummary,
    },
    IntegrationStateChanged {
        state: IntegrationState,
    },
    StepChanged {
        step: OnboardingStep,
    },
    ProfileUpdated {
        profile: OrganizationProfile,
    },
    ValidationFailed {
        field: String,
        message: String,
    },
    IdentityFailed {
        message: String,
    },
    /// Integration instructions mailed to the customer's developer.
    DeveloperInstructionsSent {
        recipient: String,
    },
}

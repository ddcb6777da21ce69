//! Onboarding flow state machine: tracks which screen the user is on.

use serde::{Deserialize, Serialize};

/// The steps of the onboarding flow.
///
/// Register → (VerifyEmail) → SetupOrganization → IntegrationOptions, then
/// the integration screens, ending in Complete once detection succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    Register,
    VerifyEmail,
    SetupOrganization,
    IntegrationOptions,
    IntegrationCode,
    TestWebsite,
    IntegrationDetection,
    Complete,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        matches!(
            (self, target),
            (Register, VerifyEmail)
                | (Register, SetupOrganization)
                | (VerifyEmail, SetupOrganization)
                | (SetupOrganization, IntegrationOptions)
                | (IntegrationOptions, IntegrationCode)
                | (IntegrationOptions, TestWebsite)
                | (IntegrationCode, IntegrationOptions)
                | (TestWebsite, IntegrationOptions)
                | (TestWebsite, IntegrationDetection)
                | (IntegrationDetection, IntegrationCode)
                | (IntegrationDetection, Complete)
        )
    }

    /// Whether this step is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Steps reachable only by an authenticated user.
    pub fn requires_user(&self) -> bool {
        !matches!(self, Self::Register)
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Register => "register",
            Self::VerifyEmail => "verify_email",
            Self::SetupOrganization => "setup_organization",
            Self::IntegrationOptions => "integration_options",
            Self::IntegrationCode => "integration_code",
            Self::TestWebsite => "test_website",
            Self::IntegrationDetection => "integration_detection",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Current step plus how many times it has been entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowState {
    pub step: OnboardingStep,
    /// Number of successful transitions since the flow started.
    pub transitions: u32,
}

impl FlowState {
    /// Move to `target` if the transition is legal.
    pub fn advance_to(&mut self, target: OnboardingStep) -> Result<OnboardingStep, String> {
        if !self.step.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.step, target));
        }
        self.step = target;
        self.transitions += 1;
        Ok(target)
    }

    /// Back to the first step, e.g. after sign-out.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//! Error types for the onboarding service.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the identity gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Sign-up failed: {0}")]
    SignUpFailed(String),

    #[error("Google sign-in failed: {0}")]
    GoogleSignInFailed(String),

    #[error("User {user_id} not found")]
    UserNotFound { user_id: String },

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Failed to send verification email: {0}")]
    VerificationSendFailed(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the onboarding flow and its simulated engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Cannot move from step {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Integration detection is already running")]
    DetectionInProgress,

    #[error("Please complete website training")]
    TrainingIncomplete,

    #[error("Integration has not been detected yet")]
    IntegrationNotDetected,

    #[error("Please verify your email address first")]
    EmailNotVerified,

    #[error("Finish setting up your organization first")]
    IntegrationNotReady,

    #[error("No previous scan to retry")]
    NothingToRetry,

    #[error("Session {id} not found")]
    SessionNotFound { id: Uuid },
}

impl IdentityError {
    /// Text shown to the user. Provider details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::SignUpFailed(_) => "Something went wrong. Please try again.".to_string(),
            Self::GoogleSignInFailed(_) => "Failed to sign in with Google".to_string(),
            Self::VerificationSendFailed(_) => "Failed to send verification email".to_string(),
            other => other.to_string(),
        }
    }
}

impl OnboardingError {
    /// Build a validation error for a required field.
    pub fn required(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_displays_user_message_only() {
        let err = OnboardingError::required("website_url", "Please enter a website URL");
        assert_eq!(err.to_string(), "Please enter a website URL");
    }

    #[test]
    fn identity_user_messages_hide_provider_detail() {
        let err = IdentityError::SignUpFailed("auth/email-already-in-use".to_string());
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
        assert!(err.to_string().contains("email-already-in-use"));
        assert_eq!(
            IdentityError::GoogleSignInFailed("popup closed".to_string()).user_message(),
            "Failed to sign in with Google"
        );
        assert_eq!(IdentityError::NotSignedIn.user_message(), "No user is signed in");
    }

    #[test]
    fn top_level_wraps_domain_errors() {
        let err: Error = IdentityError::InvalidCredentials.into();
        assert!(matches!(err, Error::Identity(IdentityError::InvalidCredentials)));
        assert_eq!(err.to_string(), "Identity error: Invalid credentials");

        let err: Error = OnboardingError::TrainingIncomplete.into();
        assert_eq!(
            err.to_string(),
            "Onboarding error: Please complete website training"
        );
    }
}

//! Identity provider trait and user record.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// A signed-in account as the onboarding flow sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub email_verified: bool,
}

/// Authentication backend.
///
/// Implementations talk to a hosted identity service; the onboarding flow
/// only ever goes through this trait.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Create an account, set its display name and send the verification
    /// email. The returned user is signed in but unverified.
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> Result<User, IdentityError>;

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<User, IdentityError>;

    /// Federated sign-in. Google accounts arrive verified.
    async fn sign_in_with_google(&self) -> Result<User, IdentityError>;

    async fn sign_out(&self, user_id: &str) -> Result<(), IdentityError>;

    async fn send_verification_email(&self, user_id: &str) -> Result<(), IdentityError>;

    /// Fetch the latest state of the account, including verification.
    async fn reload_user(&self, user_id: &str) -> Result<User, IdentityError>;
}

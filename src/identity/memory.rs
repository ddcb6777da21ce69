//! In-process identity provider for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::gateway::{IdentityGateway, User};
use crate::config::IdentityConfig;
use crate::error::IdentityError;

/// Shortest password accepted on sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user: User,
    password: SecretString,
    verification_emails: u32,
}

/// Accounts held in memory, keyed by lower-cased email.
///
/// Nobody clicks verification links here. Either call
/// [`InMemoryIdentity::confirm_email`] or enable auto-verify, which confirms
/// the address as soon as a verification email goes out.
#[derive(Default)]
pub struct InMemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    google: Option<User>,
    auto_verify: bool,
    fail_verification_sends: AtomicBool,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow Google sign-in, which returns this (verified) account.
    pub fn with_google_account(mut self, email: &str, display_name: &str) -> Self {
        self.google = Some(User {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            email_verified: true,
        });
        self
    }

    /// Build the provider the server binary runs with.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let mut identity = Self::new().with_auto_verify(config.auto_verify);
        if let Some(email) = config.google_email.as_deref() {
            let name = config.google_name.as_deref().unwrap_or(email);
            identity = identity.with_google_account(email, name);
        }
        identity
    }

    pub fn with_auto_verify(mut self, enabled: bool) -> Self {
        self.auto_verify = enabled;
        self
    }

    /// Mark the account's email as verified, as if the link was clicked.
    pub async fn confirm_email(&self, email: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&email.to_lowercase()) {
            Some(account) => {
                account.user.email_verified = true;
                true
            }
            None => false,
        }
    }

    /// Verification emails sent to this address so far.
    pub async fn verification_emails_sent(&self, email: &str) -> u32 {
        self.accounts
            .read()
            .await
            .get(&email.to_lowercase())
            .map(|a| a.verification_emails)
            .unwrap_or(0)
    }

    /// Make every subsequent verification send fail.
    pub fn set_verification_failures(&self, fail: bool) {
        self.fail_verification_sends.store(fail, Ordering::SeqCst);
    }

    fn send_to(&self, account: &mut Account) -> Result<(), IdentityError> {
        if self.fail_verification_sends.load(Ordering::SeqCst) {
            return Err(IdentityError::VerificationSendFailed(
                "mail transport unavailable".to_string(),
            ));
        }
        account.verification_emails += 1;
        debug!(user_id = %account.user.id, "Verification email queued");
        if self.auto_verify {
            account.user.email_verified = true;
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityGateway for InMemoryIdentity {
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> Result<User, IdentityError> {
        let key = email.trim().to_lowercase();
        if !key.contains('@') {
            return Err(IdentityError::SignUpFailed("invalid email".to_string()));
        }
        if password.expose_secret().len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::SignUpFailed("weak password".to_string()));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(IdentityError::SignUpFailed("email already in use".to_string()));
        }

        let mut account = Account {
            user: User {
                id: Uuid::new_v4().to_string(),
                display_name: display_name.to_string(),
                email: key.clone(),
                email_verified: false,
            },
            password: SecretString::from(password.expose_secret().to_string()),
            verification_emails: 0,
        };
        // The caller sees the account as it was before any link was clicked.
        let user = account.user.clone();
        self.send_to(&mut account)?;
        accounts.insert(key, account);
        info!(user_id = %user.id, "Account created");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<User, IdentityError> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email.trim().to_lowercase())
            .ok_or(IdentityError::InvalidCredentials)?;
        if account.password.expose_secret() != password.expose_secret() {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(account.user.clone())
    }

    async fn sign_in_with_google(&self) -> Result<User, IdentityError> {
        self.google
            .clone()
            .ok_or_else(|| IdentityError::GoogleSignInFailed("no Google account available".into()))
    }

    async fn sign_out(&self, user_id: &str) -> Result<(), IdentityError> {
        debug!(user_id, "Signed out");
        Ok(())
    }

    async fn send_verification_email(&self, user_id: &str) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|a| a.user.id == user_id)
            .ok_or_else(|| IdentityError::UserNotFound {
                user_id: user_id.to_string(),
            })?;
        self.send_to(account)
    }

    async fn reload_user(&self, user_id: &str) -> Result<User, IdentityError> {
        if let Some(google) = self.google.as_ref().filter(|g| g.id == user_id) {
            return Ok(google.clone());
        }
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| IdentityError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }
}

//! Identity provider adapter
//!
//! The provider owns the `User` record: it signs users in and out, updates
//! their display name and publishes auth-state changes on a `watch` channel.
//! Subscribers hold an [`AuthSubscription`]; dropping it unsubscribes.

use async_trait::async_trait;
use common::error::DatabaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::User;

pub mod memory;
pub mod token;

pub use memory::MemoryIdentityProvider;
pub use token::{IdentityClaims, IdentityConfig, TokenIdentityProvider, TokenVerifier};

/// Receiver side of the auth-state channel
pub type AuthSubscription = watch::Receiver<Option<User>>;

/// Opaque proof of identity handed to `sign_in` (an ID token, an account key)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Custom error type for identity operations
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The operation needs a signed-in user
    #[error("No authenticated user")]
    NotSignedIn,

    /// The credential was rejected
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The credential is valid but names no known account
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// Sign-in is switched off for this provider
    #[error("Sign in is not enabled")]
    Disabled,

    /// The provider could not be reached
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl IdentityError {
    /// Message suitable for showing to the person signing in
    pub fn user_message(&self) -> String {
        let detail = match self {
            IdentityError::NotSignedIn => "Please sign in first.".to_string(),
            IdentityError::InvalidCredential(_) => {
                "Your sign in could not be verified. Please try again.".to_string()
            }
            IdentityError::UnknownAccount(_) => "This account is not authorized.".to_string(),
            IdentityError::Disabled => "Sign in is not enabled.".to_string(),
            IdentityError::Unavailable(_) | IdentityError::Database(_) => {
                format!("Error: {}", self)
            }
        };
        format!("Failed to sign in. {}", detail)
    }
}

impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        IdentityError::Database(DatabaseError::from(err))
    }
}

/// Type alias for identity results
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Operations offered by the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with `credential` and publish the signed-in user
    async fn sign_in(&self, credential: &Credential) -> IdentityResult<User>;

    /// End the session and publish the signed-out state
    async fn sign_out(&self) -> IdentityResult<()>;

    /// Rename the signed-in user; subscribers are not notified
    async fn update_display_name(&self, display_name: &str) -> IdentityResult<User>;

    /// The user of the current session, if any
    fn current_user(&self) -> Option<User>;

    /// Subscribe to sign-in and sign-out events
    fn subscribe(&self) -> AuthSubscription;
}

/// Auth-state cell shared by the provider implementations
#[derive(Debug)]
pub(crate) struct AuthState {
    sender: watch::Sender<Option<User>>,
}

impl Default for AuthState {
    fn default() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }
}

impl AuthState {
    pub(crate) fn current(&self) -> Option<User> {
        self.sender.borrow().clone()
    }

    /// Replace the user and wake subscribers
    pub(crate) fn publish(&self, user: Option<User>) {
        self.sender.send_replace(user);
    }

    /// Replace the user without waking subscribers
    pub(crate) fn replace_quietly(&self, user: User) {
        self.sender.send_if_modified(|current| {
            *current = Some(user);
            false
        });
    }

    pub(crate) fn subscribe(&self) -> AuthSubscription {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert_eq!(credential.expose(), "secret-token");
    }

    #[test]
    fn test_user_message_prefix() {
        let message = IdentityError::Disabled.user_message();
        assert_eq!(message, "Failed to sign in. Sign in is not enabled.");
    }

    #[tokio::test]
    async fn test_quiet_replace_does_not_wake_subscribers() {
        let state = AuthState::default();
        let mut rx = state.subscribe();

        state.publish(Some(alice()));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        state.replace_quietly(alice().with_display_name("Alicia"));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(state.current().unwrap().display_name, "Alicia");
    }
}

//! In-process identity provider

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use super::{AuthState, AuthSubscription, Credential, IdentityError, IdentityProvider, IdentityResult};
use crate::models::User;

/// Identity provider backed by an in-memory account directory.
///
/// The credential is the account's user id.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, User>>,
    state: AuthState,
    unavailable: AtomicBool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with `users`
    pub fn with_accounts(users: impl IntoIterator<Item = User>) -> Self {
        let accounts = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            accounts: Mutex::new(accounts),
            ..Self::default()
        }
    }

    /// Simulate a provider outage for every operation
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> IdentityResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable(
                "identity provider is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, credential: &Credential) -> IdentityResult<User> {
        self.ensure_available()?;

        let user = self
            .accounts
            .lock()
            .await
            .get(credential.expose())
            .cloned()
            .ok_or_else(|| IdentityError::UnknownAccount(credential.expose().to_string()))?;

        info!("User signed in: {}", user.id);
        self.state.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.ensure_available()?;

        info!("User signed out");
        self.state.publish(None);
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> IdentityResult<User> {
        self.ensure_available()?;

        let current = self.state.current().ok_or(IdentityError::NotSignedIn)?;
        let updated = current.with_display_name(display_name);

        self.accounts
            .lock()
            .await
            .insert(updated.id.clone(), updated.clone());
        self.state.replace_quietly(updated.clone());

        info!("Display name updated for user: {}", updated.id);
        Ok(updated)
    }

    fn current_user(&self) -> Option<User> {
        self.state.current()
    }

    fn subscribe(&self) -> AuthSubscription {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: Some("https://example.com/alice.png".to_string()),
            email: "alice@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_publishes_user() {
        let provider = MemoryIdentityProvider::with_accounts([alice()]);
        let mut rx = provider.subscribe();

        let user = provider.sign_in(&Credential::new("u1")).await.unwrap();

        assert_eq!(user, alice());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().clone(), Some(alice()));
    }

    #[tokio::test]
    async fn test_unknown_account_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        let result = provider.sign_in(&Credential::new("ghost")).await;
        assert!(matches!(result, Err(IdentityError::UnknownAccount(_))));
        assert!(provider.current_user().is_none());
    }

    #[tokio::test]
    async fn test_rename_requires_session_and_persists() {
        let provider = MemoryIdentityProvider::with_accounts([alice()]);
        assert!(matches!(
            provider.update_display_name("Alicia").await,
            Err(IdentityError::NotSignedIn)
        ));

        provider.sign_in(&Credential::new("u1")).await.unwrap();
        let renamed = provider.update_display_name("Alicia").await.unwrap();
        assert_eq!(renamed.display_name, "Alicia");
        assert_eq!(renamed.avatar_url, alice().avatar_url);

        provider.sign_out().await.unwrap();
        let again = provider.sign_in(&Credential::new("u1")).await.unwrap();
        assert_eq!(again.display_name, "Alicia");
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let provider = MemoryIdentityProvider::with_accounts([alice()]);
        provider.set_unavailable(true);
        assert!(matches!(
            provider.sign_in(&Credential::new("u1")).await,
            Err(IdentityError::Unavailable(_))
        ));
    }
}

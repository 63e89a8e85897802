//! Display-name propagation
//!
//! Post records embed a copy of their author's display name. Renaming a user
//! therefore runs three ordered steps:
//!
//! 1. rename the identity record,
//! 2. merge the new name into the user's profile,
//! 3. rewrite `author.name` on every post of the user in one atomic batch.
//!
//! A failure stops the sequence. Earlier steps are not rolled back, so a
//! failed batch leaves the identity and profile renamed while every post
//! still carries the old name. The caller gets [`PropagationError::Posts`]
//! and may retry the whole rename.

use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info};

use crate::{
    identity::{IdentityError, IdentityProvider},
    models::{ProfileData, User},
    repositories::{BlogRepository, RepositoryError},
    validation::validate_display_name,
};

/// Steps of a rename, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStep {
    Identity,
    Profile,
    Posts,
}

impl std::fmt::Display for PropagationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropagationStep::Identity => "identity",
            PropagationStep::Profile => "profile",
            PropagationStep::Posts => "posts",
        };
        f.write_str(name)
    }
}

/// Error type for display-name propagation
#[derive(Error, Debug)]
pub enum PropagationError {
    /// The new name is empty or malformed; nothing was applied
    #[error("Invalid display name: {0}")]
    InvalidName(String),

    /// `user_id` is not the signed-in user; nothing was applied
    #[error("User {0} is not the signed-in user")]
    NotCurrentUser(String),

    /// Step 1 failed; nothing was applied
    #[error("Failed to update identity record: {0}")]
    Identity(#[source] IdentityError),

    /// Step 2 failed after the identity record was renamed
    #[error("Failed to update profile: {0}")]
    Profile(#[source] RepositoryError),

    /// The batch failed after identity and profile were renamed; no post changed
    #[error("Failed to update posts with new display name: {0}")]
    Posts(#[source] RepositoryError),

    /// A step did not finish in time
    #[error("Timed out during {0} step")]
    Timeout(PropagationStep),
}

impl PropagationError {
    /// Steps that were applied before the failure
    pub fn completed_steps(&self) -> &'static [PropagationStep] {
        match self {
            PropagationError::InvalidName(_)
            | PropagationError::NotCurrentUser(_)
            | PropagationError::Identity(_)
            | PropagationError::Timeout(PropagationStep::Identity) => &[],
            PropagationError::Profile(_) | PropagationError::Timeout(PropagationStep::Profile) => {
                &[PropagationStep::Identity]
            }
            PropagationError::Posts(_) | PropagationError::Timeout(PropagationStep::Posts) => {
                &[PropagationStep::Identity, PropagationStep::Profile]
            }
        }
    }
}

/// Outcome of a successful rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// Identity record after the rename
    pub user: User,
    /// Number of posts rewritten; informational only
    pub posts_updated: usize,
}

/// Runs the rename steps against the identity provider and the blog store
#[derive(Clone)]
pub struct DisplayNamePropagator {
    identity: Arc<dyn IdentityProvider>,
    repository: Arc<dyn BlogRepository>,
    step_timeout: Duration,
}

impl DisplayNamePropagator {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        repository: Arc<dyn BlogRepository>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            repository,
            step_timeout,
        }
    }

    async fn step<T, E>(
        &self,
        step: PropagationStep,
        fut: impl Future<Output = Result<T, E>>,
        wrap: fn(E) -> PropagationError,
    ) -> Result<T, PropagationError> {
        match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(wrap(e)),
            Err(_) => Err(PropagationError::Timeout(step)),
        }
    }

    /// Rename `user_id` to `new_display_name` everywhere it is stored
    pub async fn propagate(
        &self,
        user_id: &str,
        new_display_name: &str,
    ) -> Result<PropagationReport, PropagationError> {
        let name = validate_display_name(new_display_name).map_err(PropagationError::InvalidName)?;

        match self.identity.current_user() {
            Some(current) if current.id == user_id => {}
            _ => return Err(PropagationError::NotCurrentUser(user_id.to_string())),
        }

        let result = self.run_steps(user_id, &name).await;
        match &result {
            Ok(report) => info!(
                "Propagated display name for user {} to {} posts",
                user_id, report.posts_updated
            ),
            Err(e) => error!(
                "Display name propagation for user {} stopped after {:?}: {}",
                user_id,
                e.completed_steps(),
                e
            ),
        }
        result
    }

    async fn run_steps(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<PropagationReport, PropagationError> {
        info!("Propagation step {} for user {}", PropagationStep::Identity, user_id);
        let user = self
            .step(
                PropagationStep::Identity,
                self.identity.update_display_name(name),
                PropagationError::Identity,
            )
            .await?;

        info!("Propagation step {} for user {}", PropagationStep::Profile, user_id);
        self.step(
            PropagationStep::Profile,
            self.repository
                .upsert_profile(user_id, &ProfileData::default(), name, None),
            PropagationError::Profile,
        )
        .await?;

        info!("Propagation step {} for user {}", PropagationStep::Posts, user_id);
        let posts_updated = self
            .step(
                PropagationStep::Posts,
                self.repository.batch_update_author_name(user_id, name),
                PropagationError::Posts,
            )
            .await?;

        Ok(PropagationReport {
            user,
            posts_updated,
        })
    }
}

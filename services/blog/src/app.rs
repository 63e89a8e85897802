//! Client-session application
//!
//! Each session runs one [`App`]: a [`ViewState`] changed only by the pure
//! [`reduce`] function, plus a shell that talks to the backend adapters and
//! turns their results into [`Event`]s.

use thiserror::Error;

use crate::{
    blob::BlobError, identity::IdentityError, propagation::PropagationError,
    repositories::RepositoryError,
};

pub mod reducer;
pub mod shell;
pub mod view;

pub use reducer::{Event, Navigation, POST_VANISHED_NOTICE, reduce};
pub use shell::{Action, App, AppOptions, Backend};
pub use view::{View, ViewState};

/// Failures surfaced by [`App::dispatch`]
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please sign in first")]
    NotSignedIn,

    #[error("{0}")]
    NotPermitted(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// Another change of this session is still in flight
    #[error("Another change is still being saved")]
    Busy,

    #[error("The request timed out")]
    Timeout,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::PostNotFound(id) => AppError::PostNotFound(id),
            other => AppError::Repository(other),
        }
    }
}

/// Type alias for app results
pub type AppResult<T> = Result<T, AppError>;

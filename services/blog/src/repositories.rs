//! Persistence adapter for posts and user profiles
//!
//! `BlogRepository` is the seam between the application and the document
//! store. `PgBlogRepository` backs it with PostgreSQL; `MemoryBlogRepository`
//! keeps everything in-process and can inject failures for tests.

use async_trait::async_trait;
use common::error::DatabaseError;
use thiserror::Error;

use crate::models::{Post, PostData, ProfileData, UserProfile};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBlogRepository, RepositoryOp};
pub use postgres::PgBlogRepository;

/// Error type for repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The targeted post does not exist
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// Database error
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The backend refused or could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(DatabaseError::from(err))
    }
}

/// Type alias for repository results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Operations against the `posts` and `user-profiles` collections
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Create a post authored by `author_id`; the store assigns id and timestamps
    async fn create_post(
        &self,
        data: &PostData,
        author_id: &str,
        author_name: &str,
    ) -> RepositoryResult<Post>;

    /// Replace the content fields of a post and refresh `updated_at`
    async fn update_post(&self, id: &str, data: &PostData) -> RepositoryResult<()>;

    /// Delete a post; deleting a missing post is not an error
    async fn delete_post(&self, id: &str) -> RepositoryResult<()>;

    /// Fetch a single post
    async fn get_post(&self, id: &str) -> RepositoryResult<Option<Post>>;

    /// Every post, newest first
    async fn list_all_posts(&self) -> RepositoryResult<Vec<Post>>;

    /// Posts whose `author.id` is `user_id`, newest first
    async fn list_user_posts(&self, user_id: &str) -> RepositoryResult<Vec<Post>>;

    /// Atomically add one to the view counter
    async fn increment_views(&self, id: &str) -> RepositoryResult<()>;

    /// Profile for `user_id`; absence and read failures yield the default profile
    async fn get_profile(&self, user_id: &str) -> UserProfile;

    /// Merge-write the profile, creating it if absent.
    ///
    /// `data.about_me` and `avatar_url` overwrite only when `Some`.
    async fn upsert_profile(
        &self,
        user_id: &str,
        data: &ProfileData,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> RepositoryResult<()>;

    /// Set `author.name` on every post of `user_id` in one atomic batch.
    ///
    /// Returns the number of posts updated. On failure no post is changed.
    async fn batch_update_author_name(&self, user_id: &str, new_name: &str)
    -> RepositoryResult<usize>;

    /// Check store connectivity
    async fn health_check(&self) -> RepositoryResult<bool>;
}

//! Post model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header image used when a post is saved without one
pub const DEFAULT_HEADER_IMAGE: &str = "https://images.unsplash.com/photo-1499750310107-5fef28a66643?ixlib=rb-4.0.3&ixid=M3wxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8fA%3D%3D&auto=format&fit=crop&w=1000&q=80";

/// Maximum title length, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum content length, in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Author snapshot embedded in every post.
///
/// `id` never changes; `name` is a cached copy of the author's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
}

/// Post entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub header_image: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub views: u64,
}

impl Post {
    /// Whether `user_id` wrote this post
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author.id == user_id
    }
}

/// Content fields persisted on create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostData {
    pub title: String,
    pub content: String,
    pub header_image_url: Option<String>,
}

impl PostData {
    /// The header image to store, falling back to the placeholder
    pub fn header_image(&self) -> &str {
        match self.header_image_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => DEFAULT_HEADER_IMAGE,
        }
    }
}

/// Image bytes picked by the user for upload to the blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Post form input as submitted by a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub header_image_url: Option<String>,
    /// Uploaded before the post is saved; its URL replaces `header_image_url`
    #[serde(skip)]
    pub header_image: Option<ImageUpload>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Persisted fields once the header image is resolved to `header_image_url`
    pub fn into_data(self, header_image_url: Option<String>) -> PostData {
        PostData {
            title: self.title,
            content: self.content,
            header_image_url,
        }
    }
}

//! Domain records mirrored from the identity provider and the blog store

pub mod post;
pub mod profile;
pub mod user;

// Re-export for convenience
pub use post::{
    Author, DEFAULT_HEADER_IMAGE, ImageUpload, MAX_CONTENT_CHARS, MAX_TITLE_CHARS, Post, PostData,
    PostDraft,
};
pub use profile::{ProfileData, UserProfile};
pub use user::User;

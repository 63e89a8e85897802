//! Inkwell blog service
//!
//! A multi-user blog where each post embeds a cached copy of its author's
//! display name. Clients drive a server-side session ([`app::App`]) over HTTP;
//! the session talks to three adapters:
//!
//! - [`identity::IdentityProvider`] signs users in and owns their display name
//! - [`repositories::BlogRepository`] stores posts and profiles
//! - [`blob::BlobStore`] stores uploaded header images
//!
//! Renaming a user goes through [`propagation::DisplayNamePropagator`], which
//! rewrites the cached name on every post of the user in one batch.

pub mod app;
pub mod blob;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod propagation;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

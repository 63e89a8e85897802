//! User profile model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile record keyed by user id.
///
/// An absent profile is never an error: callers get `UserProfile::default()`,
/// i.e. an empty "about me" and no denormalized identity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub about_me: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Profile fields written by a merge-write; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub about_me: Option<String>,
}

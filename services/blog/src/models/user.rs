//! User model owned by the identity provider

use serde::{Deserialize, Serialize};

/// Authenticated user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub email: String,
}

impl User {
    /// Copy of this user carrying a different display name
    pub fn with_display_name(&self, display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..self.clone()
        }
    }
}

//! ID-token identity provider
//!
//! Verifies ID tokens issued by an external identity provider with
//! `jsonwebtoken` and keeps the identity record in the `users` table.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::{env, path::Path, sync::Arc};
use tracing::{error, info};

use super::{AuthState, AuthSubscription, Credential, IdentityError, IdentityProvider, IdentityResult};
use crate::models::User;

/// Token verification configuration
#[derive(Clone)]
pub struct IdentityConfig {
    /// RSA public key (PEM), a path to one, or an HMAC secret
    pub token_key: String,
    /// Expected `iss` claim, if any
    pub issuer: Option<String>,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("token_key", &"***")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl IdentityConfig {
    /// Create a new IdentityConfig from environment variables
    ///
    /// # Environment Variables
    /// - `IDENTITY_TOKEN_KEY`: RSA public key (PEM), path to a PEM file, or HMAC secret
    /// - `IDENTITY_TOKEN_ISSUER`: Expected token issuer (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let token_key = env::var("IDENTITY_TOKEN_KEY")
            .map_err(|_| anyhow::anyhow!("IDENTITY_TOKEN_KEY environment variable not set"))?;
        let issuer = env::var("IDENTITY_TOKEN_ISSUER")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self { token_key, issuer })
    }
}

/// Claims carried by an ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Stable user id
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IdentityClaims {
    /// Display name to use when the account is first seen
    fn initial_display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string(),
        }
    }
}

/// Checks ID token signatures and expiry
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier from configuration.
    ///
    /// A PEM (inline or read from a file) selects RS256; any other value is
    /// used as an HS256 secret.
    pub fn from_config(config: &IdentityConfig) -> IdentityResult<Self> {
        let pem = if config.token_key.starts_with("-----BEGIN") {
            Some(config.token_key.clone())
        } else if Path::new(&config.token_key).is_file() {
            let pem = std::fs::read_to_string(&config.token_key).map_err(|e| {
                IdentityError::Unavailable(format!("Failed to read public key file: {}", e))
            })?;
            Some(pem.trim().to_string())
        } else {
            None
        };

        let (key, algorithm) = match pem {
            Some(pem) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    error!("Failed to create decoding key: {}", e);
                    IdentityError::Unavailable(format!("Invalid public key: {}", e))
                })?;
                (key, Algorithm::RS256)
            }
            None => (
                DecodingKey::from_secret(config.token_key.as_bytes()),
                Algorithm::HS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self { key, validation })
    }

    /// Validate `token` and return its claims
    pub fn verify(&self, token: &str) -> IdentityResult<IdentityClaims> {
        decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                error!("Failed to validate token: {}", e);
                IdentityError::InvalidCredential(e.to_string())
            })
    }
}

/// Identity provider for one client session.
///
/// Sessions share the verifier and the pool; the signed-in user is per
/// instance.
pub struct TokenIdentityProvider {
    verifier: Arc<TokenVerifier>,
    pool: PgPool,
    state: AuthState,
}

impl TokenIdentityProvider {
    pub fn new(verifier: Arc<TokenVerifier>, pool: PgPool) -> Self {
        Self {
            verifier,
            pool,
            state: AuthState::default(),
        }
    }

    fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            avatar_url: row.try_get("avatar_url")?,
            email: row.try_get("email")?,
        })
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn sign_in(&self, credential: &Credential) -> IdentityResult<User> {
        let claims = self.verifier.verify(credential.expose())?;
        info!("Signing in user: {}", claims.sub);

        // The display name is ours once the account exists.
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, avatar_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
            avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url),
            updated_at = NOW()
            RETURNING id, email, display_name, avatar_url
            "#,
        )
        .bind(&claims.sub)
        .bind(&claims.email)
        .bind(claims.initial_display_name())
        .bind(&claims.picture)
        .fetch_one(&self.pool)
        .await?;

        let user = Self::user_from_row(&row)?;
        self.state.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        info!("Signing out");
        self.state.publish(None);
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> IdentityResult<User> {
        let current = self.state.current().ok_or(IdentityError::NotSignedIn)?;
        info!("Updating display name for user: {}", current.id);

        let row = sqlx::query(
            r#"
            UPDATE users SET display_name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, display_name, avatar_url
            "#,
        )
        .bind(&current.id)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IdentityError::UnknownAccount(current.id.clone()))?;

        let user = Self::user_from_row(&row)?;
        self.state.replace_quietly(user.clone());
        Ok(user)
    }

    fn current_user(&self) -> Option<User> {
        self.state.current()
    }

    fn subscribe(&self) -> AuthSubscription {
        self.state.subscribe()
    }
}

//! Service configuration

use std::{env, time::Duration};

use crate::identity::IdentityConfig;

/// Blog service configuration
#[derive(Debug, Clone)]
pub struct BlogConfig {
    pub bind_address: String,
    pub request_timeout: Duration,
    pub media_bucket_name: String,
    /// Base of the public URLs handed out for uploaded images
    pub media_public_url: String,
    /// Sessions untouched this long are discarded
    pub session_idle_timeout: Duration,
    pub identity: IdentityConfig,
}

impl BlogConfig {
    /// Create a new BlogConfig from environment variables
    ///
    /// # Environment Variables
    /// - `BIND_ADDRESS`: Listen address (default: 0.0.0.0:3002)
    /// - `REQUEST_TIMEOUT_SECS`: Bound for every backend call (default: 10)
    /// - `MEDIA_BUCKET_NAME`: S3 bucket for header images (default: inkwell-media)
    /// - `MEDIA_PUBLIC_URL`: Public base URL of the bucket (default: the bucket's S3 URL)
    /// - `SESSION_IDLE_TIMEOUT_SECS`: Idle time before a session is evicted (default: 1800)
    /// - `IDENTITY_TOKEN_KEY` / `IDENTITY_TOKEN_ISSUER`: see [`IdentityConfig::from_env`]
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3002".to_string());

        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid REQUEST_TIMEOUT_SECS: {}", e))?;
        if request_timeout == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let session_idle_timeout = env::var("SESSION_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid SESSION_IDLE_TIMEOUT_SECS: {}", e))?;
        if session_idle_timeout == 0 {
            anyhow::bail!("SESSION_IDLE_TIMEOUT_SECS must be greater than zero");
        }

        let media_bucket_name =
            env::var("MEDIA_BUCKET_NAME").unwrap_or_else(|_| "inkwell-media".to_string());
        let media_public_url = env::var("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", media_bucket_name));

        Ok(Self {
            bind_address,
            request_timeout: Duration::from_secs(request_timeout),
            media_bucket_name,
            media_public_url,
            session_idle_timeout: Duration::from_secs(session_idle_timeout),
            identity: IdentityConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "BIND_ADDRESS",
        "REQUEST_TIMEOUT_SECS",
        "SESSION_IDLE_TIMEOUT_SECS",
        "MEDIA_BUCKET_NAME",
        "MEDIA_PUBLIC_URL",
        "IDENTITY_TOKEN_KEY",
        "IDENTITY_TOKEN_ISSUER",
    ];

    fn clear() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_blog_config_defaults() {
        clear();
        unsafe { env::set_var("IDENTITY_TOKEN_KEY", "secret") };

        let config = BlogConfig::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3002");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.media_bucket_name, "inkwell-media");
        assert_eq!(
            config.media_public_url,
            "https://inkwell-media.s3.amazonaws.com"
        );
        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert!(config.identity.issuer.is_none());

        clear();
    }

    #[test]
    #[serial]
    fn test_blog_config_requires_token_key() {
        clear();
        assert!(BlogConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_blog_config_rejects_zero_timeout() {
        clear();
        unsafe {
            env::set_var("IDENTITY_TOKEN_KEY", "secret");
            env::set_var("REQUEST_TIMEOUT_SECS", "0");
        }

        assert!(BlogConfig::from_env().is_err());

        clear();
    }

    #[test]
    #[serial]
    fn test_blog_config_reads_session_idle_timeout() {
        clear();
        unsafe {
            env::set_var("IDENTITY_TOKEN_KEY", "secret");
            env::set_var("SESSION_IDLE_TIMEOUT_SECS", "90");
        }

        let config = BlogConfig::from_env().unwrap();
        assert_eq!(config.session_idle_timeout, Duration::from_secs(90));

        unsafe { env::set_var("SESSION_IDLE_TIMEOUT_SECS", "0") };
        assert!(BlogConfig::from_env().is_err());

        clear();
    }
}

//! API credentials for the user channel
//!
//! Credential derivation (key signing against the venue's REST API) lives
//! outside this crate; anything able to hand back an API key triple can be
//! plugged in through [`CredentialProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use crate::error::{FeedError, Result};

/// API key triple sent in the user channel announce
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Source of API credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn derive_credential(&self) -> Result<ApiCredentials>;
}

/// Provider returning a fixed credential triple
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub ApiCredentials);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn derive_credential(&self) -> Result<ApiCredentials> {
        Ok(self.0.clone())
    }
}

/// Provider reading `CLOB_API_KEY`, `CLOB_SECRET` and `CLOB_PASSPHRASE`
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn var(name: &str) -> Result<String> {
        match env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(FeedError::Auth(format!("{name} is not set"))),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn derive_credential(&self) -> Result<ApiCredentials> {
        Ok(ApiCredentials {
            api_key: Self::var("CLOB_API_KEY")?,
            secret: Self::var("CLOB_SECRET")?,
            passphrase: Self::var("CLOB_PASSPHRASE")?,
        })
    }
}

//! Registration handshake.
//!
//! A prospective site presents a token sealed to the server key whose
//! plaintext is `url|secret` or `url|secret|type`. The two-segment form is
//! still accepted; its type stays unset until the first accepted report
//! assigns the default.
//!
//! Failures here are administrator-facing and reported as such; they are
//! not authentication rejections.

use crate::error::RegistrationError;
use crate::store::Stores;
use std::sync::Arc;
use tracing::{info, warn};
use warden_codec::PayloadCodec;
use warden_registry::{RegistryError, Site};

/// Separator between token segments.
pub const TOKEN_SEPARATOR: char = '|';

/// Decoded registration token.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationToken {
    /// Site URL.
    pub url: String,
    /// Shared secret for later reports.
    pub secret: String,
    /// Declared site type, if any.
    pub site_type: Option<String>,
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationToken")
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .field("site_type", &self.site_type)
            .finish()
    }
}

impl RegistrationToken {
    /// Parses `url|secret[|type]`.
    pub fn parse(plaintext: &str) -> Result<Self, RegistrationError> {
        let parts: Vec<&str> = plaintext.trim().split(TOKEN_SEPARATOR).collect();
        let (url, secret, site_type) = match parts.as_slice() {
            [url, secret] => (*url, *secret, None),
            [url, secret, kind] => (*url, *secret, Some(*kind)),
            _ => {
                return Err(RegistrationError::Malformed(format!(
                    "expected 2 or 3 segments, got {}",
                    parts.len()
                )))
            }
        };

        let url = url.trim();
        if url.is_empty() {
            return Err(RegistrationError::Malformed("empty url".into()));
        }
        if secret.is_empty() {
            return Err(RegistrationError::Malformed("empty secret".into()));
        }

        Ok(Self {
            url: url.to_string(),
            secret: secret.to_string(),
            site_type: site_type
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }
}

/// Handles registration requests.
#[derive(Debug, Clone)]
pub struct Registrar {
    codec: Arc<PayloadCodec>,
    stores: Stores,
}

impl Registrar {
    /// Creates a registrar.
    pub fn new(codec: Arc<PayloadCodec>, stores: Stores) -> Self {
        Self { codec, stores }
    }

    /// Decrypts and parses a sealed registration token.
    pub fn open(&self, sealed: &[u8]) -> Result<RegistrationToken, RegistrationError> {
        let plaintext = self
            .codec
            .decrypt(sealed)
            .map_err(|e| RegistrationError::Malformed(e.to_string()))?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| RegistrationError::Malformed("token is not UTF-8".into()))?;
        RegistrationToken::parse(&text)
    }

    /// Registers a new site from a sealed token.
    ///
    /// # Errors
    ///
    /// `Malformed` for undecryptable or badly formed tokens, `Conflict` if
    /// the URL is already registered.
    pub async fn register(&self, sealed: &[u8]) -> Result<Site, RegistrationError> {
        let token = self.open(sealed)?;
        let url = token.url.clone();
        let site = Site::new(token.url, token.secret, token.site_type);

        let stored = site.clone();
        let created = self
            .stores
            .sites("register", move |sites| {
                if sites.url_exists(&stored.url)? {
                    return Ok(false);
                }
                match sites.upsert(&stored) {
                    Ok(()) => Ok(true),
                    Err(RegistryError::UrlTaken(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await?;

        if !created {
            warn!(url = %url, "Registration for existing site");
            return Err(RegistrationError::Conflict { url });
        }
        info!(site = %site.id, url = %site.url, site_type = ?site.site_type, "Site registered");
        Ok(site)
    }
}

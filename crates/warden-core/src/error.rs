//! Error types for Warden core.
//!
//! Authentication failures stay distinct here so they can be logged with
//! their reason; the HTTP boundary collapses every [`IngestError`] into one
//! generic rejection.

use thiserror::Error;
use warden_registry::RegistryError;

/// Why an inbound report was rejected.
///
/// Messages carry the claimed URL where known and never a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The body could not be decrypted.
    #[error("Malformed ciphertext")]
    MalformedCiphertext,

    /// The plaintext is not a report or lacks `core`/`url`.
    #[error("Malformed report: {reason}")]
    MalformedReport {
        /// What was wrong with the payload.
        reason: String,
    },

    /// `time` missing or outside the freshness window.
    #[error("Replay suspected for {url}")]
    ReplaySuspected {
        /// Claimed site URL.
        url: String,
    },

    /// No site is registered under the claimed URL.
    #[error("Unknown site {url}")]
    UnknownSite {
        /// Claimed site URL.
        url: String,
    },

    /// `key` missing or not equal to the site's token.
    #[error("Token mismatch for {url}")]
    TokenMismatch {
        /// Claimed site URL.
        url: String,
    },
}

impl AuthError {
    /// Short label for structured logs.
    pub fn gate(&self) -> &'static str {
        match self {
            AuthError::MalformedCiphertext => "decrypt",
            AuthError::MalformedReport { .. } => "parse",
            AuthError::ReplaySuspected { .. } => "freshness",
            AuthError::UnknownSite { .. } => "identity",
            AuthError::TokenMismatch { .. } => "token",
        }
    }
}

/// Failure of a bounded registry call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The registry returned an error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The call did not finish before its deadline.
    #[error("Registry call '{operation}' timed out")]
    Timeout {
        /// Name of the registry operation.
        operation: &'static str,
    },

    /// The blocking worker panicked or was cancelled.
    #[error("Registry worker failed: {0}")]
    Worker(String),
}

/// Failure of one ingestion cycle.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The report failed an authentication gate.
    #[error("Rejected: {0}")]
    Auth(#[from] AuthError),

    /// A registry call failed or timed out.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True for rejections, false for server-side failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, IngestError::Auth(_))
    }
}

/// Failure of the registration handshake.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The token could not be decrypted or parsed.
    #[error("Malformed registration: {0}")]
    Malformed(String),

    /// A site with this URL already exists.
    #[error("Site already registered: {url}")]
    Conflict {
        /// The URL that is already taken.
        url: String,
    },

    /// A registry call failed or timed out.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

/// Failure fetching a site's report.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the body not read.
    #[error("HTTP error for {url}: {source}")]
    Http {
        /// Request URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The site answered with a non-success status.
    #[error("{url} answered {status}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure delivering a dashboard update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Delivery did not finish before its deadline.
    #[error("Notification timed out")]
    Timeout,

    /// The notification channel is gone.
    #[error("Notification channel closed")]
    Closed,
}

/// Errors from administrative and batch operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key or payload codec failure.
    #[error("Codec error: {0}")]
    Codec(#[from] warden_codec::CodecError),

    /// Registry failure.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Ingestion failure.
    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    /// The referenced site does not exist.
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// Invalid administrative input.
    #[error("Invalid input: {0}")]
    Invalid(String),
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        CoreError::Store(StoreError::Registry(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_messages_name_url_only() {
        let err = AuthError::TokenMismatch {
            url: "https://a.example".into(),
        };
        assert_eq!(err.to_string(), "Token mismatch for https://a.example");
        assert_eq!(err.gate(), "token");
    }

    #[test]
    fn test_ingest_rejection_classification() {
        assert!(IngestError::from(AuthError::MalformedCiphertext).is_rejection());
        assert!(!IngestError::from(StoreError::Timeout {
            operation: "find_by_url"
        })
        .is_rejection());
    }
}

//! Error types for the payload codec.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors produced while sealing, opening, or loading key material.
///
/// # Security Notes
///
/// Decryption failures deliberately carry no detail about which check
/// failed beyond the variant, and never include plaintext or key bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid base64 text.
    #[error("payload is not valid base64 text")]
    Encoding,

    /// The decoded payload is shorter than the envelope header plus tag.
    #[error("payload too short: {len} bytes, need at least {min}")]
    Truncated {
        /// Decoded length.
        len: usize,
        /// Minimum envelope length.
        min: usize,
    },

    /// The ephemeral key produced a non-contributory shared secret.
    #[error("ephemeral public key is a low-order point")]
    WeakKey,

    /// AEAD verification failed (wrong key, tampered ciphertext or nonce).
    #[error("payload authentication failed")]
    Authentication,

    /// AEAD sealing failed.
    #[error("payload encryption failed")]
    Encryption,

    /// Key material could not be parsed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Key file could not be read or written.
    #[error("key file {path}: {source}")]
    KeyFile {
        /// Path of the key file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = CodecError::Truncated { len: 3, min: 60 };
        assert!(err.to_string().contains("3 bytes"));
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_key_file_display_names_path() {
        let err = CodecError::KeyFile {
            path: PathBuf::from("/tmp/warden.key"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/warden.key"));
    }
}

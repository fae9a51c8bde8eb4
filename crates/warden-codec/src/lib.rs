//! # Warden Codec - Sealed Report Transport
//!
//! Application-level encryption for the report channel between monitored
//! sites and the collector. The collector owns one X25519 key pair for the
//! life of the process; sites seal each report to its public key and the
//! collector opens it before any other processing happens.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`KeyPair`] | Process-wide server key pair, persisted as base64 |
//! | [`PayloadCodec`] | Opens inbound envelopes, serves the public key |
//! | [`seal_for`] | Client-side sealing to a known public key |
//!
//! ## Usage
//!
//! ```rust
//! use warden_codec::{public_key_from_base64, seal_for, KeyPair, PayloadCodec};
//!
//! let codec = PayloadCodec::new(KeyPair::generate());
//!
//! // A site fetches the public key once...
//! let served = codec.public_key_base64();
//! let server_key = public_key_from_base64(&served).unwrap();
//!
//! // ...and seals every report to it.
//! let body = seal_for(&server_key, br#"{"url":"https://a.example"}"#).unwrap();
//! assert!(codec.decrypt(body.as_bytes()).is_ok());
//! ```
//!
//! ## Security Notes
//!
//! - The secret key never leaves the process except through [`KeyPair::save`].
//! - Decryption errors are typed but carry no key or plaintext material.
//!
//! ## References
//!
//! - RFC 7748 - Elliptic Curves for Security (X25519)
//! - RFC 8439 - ChaCha20 and Poly1305 for IETF Protocols

pub mod codec;
pub mod error;
pub mod keys;

pub use codec::{seal_for, PayloadCodec, MIN_ENVELOPE_LEN};
pub use error::{CodecError, Result};
pub use keys::{public_key_from_base64, KeyPair};
pub use x25519_dalek::PublicKey;

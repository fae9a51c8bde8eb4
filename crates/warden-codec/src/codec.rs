//! # Sealed Payload Envelope
//!
//! Sites seal each report to the server's public key; the server opens it
//! with its secret key. The envelope is an ECIES-style construction:
//!
//! ```text
//!  site                                         server
//!  ────                                         ──────
//!  e  = random X25519 secret
//!  E  = e·G
//!  s  = e·P_server                              s = d_server·E
//!  k  = SHA-256(s ‖ E ‖ P_server)               k = SHA-256(s ‖ E ‖ P_server)
//!  ct = ChaCha20-Poly1305(k, nonce, report)     report = open(k, nonce, ct)
//!
//!  wire = base64( E(32) ‖ nonce(12) ‖ ct‖tag )
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Eavesdropping on reports | AEAD encryption under a per-message key |
//! | Tampering in transit | Poly1305 tag, any bit flip fails to open |
//! | Low-order ephemeral keys | Non-contributory shared secrets are rejected |
//! | Key reuse across messages | Fresh ephemeral secret and nonce per seal |
//!
//! The envelope gives confidentiality and integrity, not sender identity:
//! anyone holding the public key can seal. Sender authentication is the
//! job of the shared-secret check that runs after decryption.

use crate::error::{CodecError, Result};
use crate::keys::{KeyPair, KEY_LEN};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Smallest decodable envelope: ephemeral key, nonce and an empty body's tag.
pub const MIN_ENVELOPE_LEN: usize = KEY_LEN + NONCE_LEN + TAG_LEN;

/// Server-side codec holding the process-wide key pair.
///
/// # Example
///
/// ```rust
/// use warden_codec::{seal_for, KeyPair, PayloadCodec};
///
/// let codec = PayloadCodec::new(KeyPair::generate());
/// let sealed = seal_for(codec.public_key(), b"{\"url\":\"https://a.example\"}").unwrap();
/// let opened = codec.decrypt(sealed.as_bytes()).unwrap();
/// assert_eq!(opened, b"{\"url\":\"https://a.example\"}");
/// ```
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    keys: KeyPair,
}

impl PayloadCodec {
    /// Wraps a key pair.
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    /// The server public key.
    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    /// The server public key encoded for transport.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.keys.public().as_bytes())
    }

    /// Seals `plaintext` to the server's own public key.
    ///
    /// Only used for the registration handshake, where the server hands a
    /// sealed token to an administrator.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        seal_for(self.keys.public(), plaintext)
    }

    /// Opens a base64 envelope addressed to this server.
    ///
    /// # Errors
    ///
    /// - [`CodecError::Encoding`] if the body is not base64 text
    /// - [`CodecError::Truncated`] if it is shorter than [`MIN_ENVELOPE_LEN`]
    /// - [`CodecError::WeakKey`] for a low-order ephemeral key
    /// - [`CodecError::Authentication`] if the AEAD tag does not verify
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(ciphertext).map_err(|_| CodecError::Encoding)?;
        let raw = STANDARD
            .decode(text.trim())
            .map_err(|_| CodecError::Encoding)?;

        if raw.len() < MIN_ENVELOPE_LEN {
            return Err(CodecError::Truncated {
                len: raw.len(),
                min: MIN_ENVELOPE_LEN,
            });
        }

        let (ephemeral, rest) = raw.split_at(KEY_LEN);
        let (nonce, body) = rest.split_at(NONCE_LEN);

        let ephemeral: [u8; KEY_LEN] = ephemeral.try_into().map_err(|_| CodecError::Truncated {
            len: raw.len(),
            min: MIN_ENVELOPE_LEN,
        })?;
        let ephemeral_public = PublicKey::from(ephemeral);

        let shared = self.keys.secret().diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(CodecError::WeakKey);
        }

        let key = derive_key(shared.as_bytes(), &ephemeral, self.keys.public().as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));

        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CodecError::Authentication)
    }
}

/// Seals `plaintext` to `recipient`, returning the base64 envelope.
///
/// This is what a monitored site does with the key it fetched from the
/// public-key endpoint.
pub fn seal_for(recipient: &PublicKey, plaintext: &[u8]) -> Result<String> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CodecError::WeakKey);
    }

    let key = derive_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.as_bytes(),
    );
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CodecError::Encryption)?;

    let mut envelope = Vec::with_capacity(KEY_LEN + NONCE_LEN + sealed.len());
    envelope.extend_from_slice(ephemeral_public.as_bytes());
    envelope.extend_from_slice(nonce.as_slice());
    envelope.extend_from_slice(&sealed);

    Ok(STANDARD.encode(envelope))
}

/// Binds the symmetric key to both public keys so an envelope cannot be
/// re-targeted at another recipient.
fn derive_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let digest = Sha256::new()
        .chain_update(shared)
        .chain_update(ephemeral)
        .chain_update(recipient)
        .finalize();
    Zeroizing::new(digest.into())
}

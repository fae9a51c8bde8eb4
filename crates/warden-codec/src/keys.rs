//! # Server Key Pair
//!
//! The collector holds one X25519 key pair for the lifetime of the process.
//! Sites fetch the public half over an unauthenticated endpoint and seal
//! their reports to it; the secret half never leaves the server.
//!
//! The secret is persisted as base64 text in a single file. Rotation is not
//! modeled: the file is created once and read on every start.

use crate::error::{CodecError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::OsRng;
use std::fs;
use std::io::Write;
use std::path::Path;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Length of an X25519 key in bytes.
pub const KEY_LEN: usize = 32;

/// The server's static X25519 key pair.
///
/// The secret scalar is zeroized on drop (`x25519-dalek` does this for
/// `StaticSecret`). `Debug` prints only the public key.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuilds a key pair from raw secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    /// Rebuilds a key pair from base64-encoded secret bytes.
    pub fn from_secret_base64(encoded: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CodecError::InvalidKey(e.to_string()))?,
        );
        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
            CodecError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", raw.len()))
        })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Loads the key pair from `path`, generating and saving one if the
    /// file does not exist.
    ///
    /// Returns the key pair and whether it was freshly generated.
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let encoded = Zeroizing::new(fs::read_to_string(path).map_err(|source| {
                CodecError::KeyFile {
                    path: path.to_path_buf(),
                    source,
                }
            })?);
            return Ok((Self::from_secret_base64(&encoded)?, false));
        }

        let keys = Self::generate();
        keys.save(path)?;
        Ok((keys, true))
    }

    /// Writes the secret to `path` as base64 text.
    ///
    /// On unix the file is created with mode 0600, and an existing file is
    /// narrowed to 0600 before the secret is written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let to_io_err = |source| CodecError::KeyFile {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_io_err)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(to_io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(to_io_err)?;
        }

        file.write_all(self.secret_base64().as_bytes())
            .map_err(to_io_err)?;
        file.sync_all().map_err(to_io_err)?;
        Ok(())
    }

    /// Base64 of the secret scalar. Wrapped so the copy is wiped on drop.
    pub fn secret_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.secret.as_bytes()))
    }

    /// The public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &STANDARD.encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Parses a base64 public key as served by the public-key endpoint.
pub fn public_key_from_base64(encoded: &str) -> Result<PublicKey> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
        CodecError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", raw.len()))
    })?;
    Ok(PublicKey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secret_base64_roundtrip_preserves_public_key() {
        let keys = KeyPair::generate();
        let restored = KeyPair::from_secret_base64(&keys.secret_base64()).unwrap();
        assert_eq!(keys.public().as_bytes(), restored.public().as_bytes());
    }

    #[test]
    fn test_from_secret_base64_rejects_wrong_length() {
        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            KeyPair::from_secret_base64(&short),
            Err(CodecError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_load_or_generate_creates_then_reuses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys").join("warden.key");

        let (first, created) = KeyPair::load_or_generate(&path).unwrap();
        assert!(created);
        assert!(path.exists());

        let (second, created_again) = KeyPair::load_or_generate(&path).unwrap();
        assert!(!created_again);
        assert_eq!(first.public().as_bytes(), second.public().as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.key");
        KeyPair::generate().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_narrows_existing_file_before_writing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.key");
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let keys = KeyPair::generate();
        keys.save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let (loaded, created) = KeyPair::load_or_generate(&path).unwrap();
        assert!(!created);
        assert_eq!(loaded.public().as_bytes(), keys.public().as_bytes());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keys = KeyPair::generate();
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains(keys.secret_base64().as_str()));
    }

    #[test]
    fn test_public_key_from_base64() {
        let keys = KeyPair::generate();
        let encoded = STANDARD.encode(keys.public().as_bytes());
        let parsed = public_key_from_base64(&encoded).unwrap();
        assert_eq!(parsed.as_bytes(), keys.public().as_bytes());
        assert!(public_key_from_base64("not base64!").is_err());
    }
}

//! Key derivation from the master password.
//!
//! A random salt persisted beside the data directory feeds PBKDF2-HMAC-SHA256
//! for both the database key and the per-domain blob keys. The salt file is
//! written and read in binary to avoid encoding artifacts (a UTF-8 BOM on
//! Windows changed the derived key between setup and unlock).

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// PBKDF2 iteration count used for every derived key.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// AES-GCM nonce length prepended to every blob ciphertext.
const NONCE_LEN: usize = 12;

/// Blob key domains; each gets its own derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDomain {
    Audio,
    Video,
    Document,
}

impl KeyDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDomain::Audio => "audio",
            KeyDomain::Video => "video",
            KeyDomain::Document => "document",
        }
    }
}

/// Read the persisted salt, or generate and persist a new one.
///
/// The salt is 16 random bytes hex-encoded to 32 ASCII characters.
pub fn get_or_create_salt(data_dir: &Path) -> Result<String> {
    let salt_path = data_dir.join(".salt");
    if salt_path.exists() {
        let bytes = std::fs::read(&salt_path)?;
        let salt = String::from_utf8_lossy(&bytes).trim().to_string();
        return Ok(salt);
    }

    std::fs::create_dir_all(data_dir)?;
    let mut raw = [0_u8; 16];
    OsRng.fill_bytes(&mut raw);
    let salt = hex::encode(raw);
    std::fs::write(&salt_path, salt.as_bytes())?;
    info!("Generated new salt at {}", salt_path.display());
    Ok(salt)
}

/// Derive the database encryption key as a 64-char hex string.
pub fn derive_db_key(password: &str, salt: &str) -> String {
    let mut key = [0_u8; 32];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key,
    );
    hex::encode(key)
}

/// Derive a 32-byte blob key for a domain, with the domain name mixed into
/// the password so no two domains share a key.
fn derive_blob_key(password: &str, salt: &str, domain: KeyDomain) -> [u8; 32] {
    let material = format!("{password}_{}", domain.as_str());
    let mut key = [0_u8; 32];
    pbkdf2_hmac::<Sha256>(
        material.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key,
    );
    key
}

/// In-memory key material derived at unlock and cleared at logout.
pub struct Keyring {
    db_key: String,
    audio_key: [u8; 32],
    video_key: [u8; 32],
    document_key: [u8; 32],
}

impl Keyring {
    /// Derive all keys from the master password and the persisted salt.
    pub fn unlock(data_dir: &Path, password: &str) -> Result<Self> {
        let salt = get_or_create_salt(data_dir)?;
        debug!("Deriving keys from master password");
        Ok(Keyring {
            db_key: derive_db_key(password, &salt),
            audio_key: derive_blob_key(password, &salt, KeyDomain::Audio),
            video_key: derive_blob_key(password, &salt, KeyDomain::Video),
            document_key: derive_blob_key(password, &salt, KeyDomain::Document),
        })
    }

    /// Hex key applied as the database encryption key.
    pub fn db_key(&self) -> &str {
        &self.db_key
    }

    fn domain_key(&self, domain: KeyDomain) -> &[u8; 32] {
        match domain {
            KeyDomain::Audio => &self.audio_key,
            KeyDomain::Video => &self.video_key,
            KeyDomain::Document => &self.document_key,
        }
    }

    /// Base64url form of a domain key, for transports that need text.
    pub fn blob_key_b64(&self, domain: KeyDomain) -> String {
        URL_SAFE.encode(self.domain_key(domain))
    }

    /// Encrypt a blob under the domain key; nonce is prepended.
    pub fn encrypt_blob(&self, domain: KeyDomain, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = Key::<Aes256Gcm>::from_slice(self.domain_key(domain));
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::Decrypt("Encryption failed".to_string()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a blob; authentication failure surfaces as [`Error::Decrypt`].
    pub fn decrypt_blob(&self, domain: KeyDomain, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(Error::Decrypt("Ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let key = Key::<Aes256Gcm>::from_slice(self.domain_key(domain));
        let cipher = Aes256Gcm::new(key);
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| {
            Error::Decrypt(
                "Failed to decrypt file. It may be corrupted or the key may have changed."
                    .to_string(),
            )
        })
    }

    /// Wipe key material. Called on logout.
    pub fn clear(&mut self) {
        self.db_key.clear();
        self.audio_key = [0; 32];
        self.video_key = [0; 32];
        self.document_key = [0; 32];
    }
}

impl Drop for Keyring {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Platform-canonical data directory (`<app-data>/Think`).
pub fn default_data_dir() -> PathBuf {
    dirs_data_dir().join("Think")
}

fn dirs_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn salt_is_stable_across_reads() {
        let dir = TempDir::new().unwrap();
        let first = get_or_create_salt(dir.path()).unwrap();
        let second = get_or_create_salt(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn db_key_is_deterministic_for_same_salt() {
        let dir = TempDir::new().unwrap();
        let salt = get_or_create_salt(dir.path()).unwrap();
        assert_eq!(
            derive_db_key("hunter2", &salt),
            derive_db_key("hunter2", &salt)
        );
        assert_ne!(
            derive_db_key("hunter2", &salt),
            derive_db_key("wrong", &salt)
        );
    }

    #[test]
    fn blob_round_trip_per_domain() {
        let dir = TempDir::new().unwrap();
        let keyring = Keyring::unlock(dir.path(), "hunter2").unwrap();
        let payload = b"some opaque media bytes".to_vec();
        for domain in [KeyDomain::Audio, KeyDomain::Video, KeyDomain::Document] {
            let encrypted = keyring.encrypt_blob(domain, &payload).unwrap();
            assert_ne!(encrypted, payload);
            let decrypted = keyring.decrypt_blob(domain, &encrypted).unwrap();
            assert_eq!(decrypted, payload);
        }
    }

    #[test]
    fn domains_do_not_share_keys() {
        let dir = TempDir::new().unwrap();
        let keyring = Keyring::unlock(dir.path(), "hunter2").unwrap();
        let encrypted = keyring.encrypt_blob(KeyDomain::Audio, b"voice memo").unwrap();
        assert!(keyring.decrypt_blob(KeyDomain::Video, &encrypted).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let dir = TempDir::new().unwrap();
        let keyring = Keyring::unlock(dir.path(), "hunter2").unwrap();
        let mut encrypted = keyring.encrypt_blob(KeyDomain::Document, b"pdf bytes").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;
        assert!(matches!(
            keyring.decrypt_blob(KeyDomain::Document, &encrypted),
            Err(Error::Decrypt(_))
        ));
    }
}

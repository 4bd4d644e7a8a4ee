//! Filesystem blob vault: per-domain directories of AEAD-encrypted files.
//!
//! Filenames are `<uuid>.<ext>.enc`. Reads and deletes resolve the path and
//! verify it stays under the domain root, so a crafted relative name can
//! never escape the vault.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

use think_core::crypto::Keyring;
use think_core::storage::{BlobDomain, BlobStore};
use think_core::{Error, Result};

/// Encrypted file store rooted at the data directory.
pub struct BlobVault {
    root: PathBuf,
    keyring: Keyring,
}

impl BlobVault {
    /// Create a vault over `data_dir` using keys derived at unlock.
    pub fn new(data_dir: impl Into<PathBuf>, keyring: Keyring) -> Self {
        BlobVault {
            root: data_dir.into(),
            keyring,
        }
    }

    fn domain_dir(&self, domain: BlobDomain) -> PathBuf {
        self.root.join(domain.dir_name())
    }

    /// Resolve a relative name inside a domain, rejecting traversal.
    fn resolve(&self, domain: BlobDomain, name: &str) -> Result<PathBuf> {
        let base = self.domain_dir(domain);
        let candidate = base.join(name);

        // Component check catches `..` and absolute names even before the
        // file exists (canonicalize needs an existing path)
        let suspicious = Path::new(name)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if suspicious {
            return Err(Error::Validation(format!(
                "Path traversal attempt detected: {name}"
            )));
        }

        if let (Ok(resolved), Ok(resolved_base)) = (candidate.canonicalize(), base.canonicalize()) {
            if !resolved.starts_with(&resolved_base) {
                return Err(Error::Validation(format!(
                    "Path traversal attempt detected: {name}"
                )));
            }
        }
        Ok(candidate)
    }
}

#[async_trait]
impl BlobStore for BlobVault {
    async fn save(&self, domain: BlobDomain, bytes: &[u8], ext: &str) -> Result<String> {
        let dir = self.domain_dir(domain);
        tokio::fs::create_dir_all(&dir).await?;

        let name = format!("{}.{}.enc", Uuid::new_v4(), ext.to_lowercase());
        let encrypted = self.keyring.encrypt_blob(domain.key_domain(), bytes)?;
        tokio::fs::write(dir.join(&name), encrypted).await?;

        info!("Saved encrypted {} file: {name}", domain.dir_name());
        Ok(name)
    }

    async fn read(&self, domain: BlobDomain, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(domain, name)?;
        if !path.exists() {
            return Err(Error::not_found("Blob", name));
        }
        let encrypted = tokio::fs::read(&path).await?;
        self.keyring
            .decrypt_blob(domain.key_domain(), &encrypted)
            .map_err(|e| {
                error!("Decryption failed for {}: {name}", domain.dir_name());
                e
            })
    }

    async fn delete(&self, domain: BlobDomain, name: &str) -> Result<bool> {
        let path = self.resolve(domain, name)?;
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(&path).await?;
        info!("Deleted {} file: {name}", domain.dir_name());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn vault() -> (TempDir, BlobVault) {
        let dir = TempDir::new().unwrap();
        let keyring = Keyring::unlock(dir.path(), "hunter2").unwrap();
        let vault = BlobVault::new(dir.path(), keyring);
        (dir, vault)
    }

    #[tokio::test]
    async fn save_read_delete_round_trip() {
        let (_dir, vault) = vault().await;
        let payload = b"raw audio bytes".to_vec();

        let name = vault
            .save(BlobDomain::Audio, &payload, "mp3")
            .await
            .unwrap();
        assert!(name.ends_with(".mp3.enc"));

        let read_back = vault.read(BlobDomain::Audio, &name).await.unwrap();
        assert_eq!(read_back, payload);

        assert!(vault.delete(BlobDomain::Audio, &name).await.unwrap());
        assert!(!vault.delete(BlobDomain::Audio, &name).await.unwrap());
        assert!(matches!(
            vault.read(BlobDomain::Audio, &name).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ciphertext_is_not_plaintext_on_disk() {
        let (dir, vault) = vault().await;
        let name = vault
            .save(BlobDomain::Document, b"%PDF-1.4 secret", "pdf")
            .await
            .unwrap();
        let on_disk = std::fs::read(dir.path().join("documents").join(&name)).unwrap();
        assert!(!on_disk.windows(6).any(|w| w == b"secret"));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_dir, vault) = vault().await;
        for name in ["../escape.enc", "/etc/passwd", "a/../../b.enc"] {
            assert!(matches!(
                vault.read(BlobDomain::Audio, name).await,
                Err(Error::Validation(_))
            ));
            assert!(matches!(
                vault.delete(BlobDomain::Audio, name).await,
                Err(Error::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn thumbnails_live_in_their_own_directory() {
        let (dir, vault) = vault().await;
        let name = vault
            .save(BlobDomain::Thumbnail, b"jpeg bytes", "jpg")
            .await
            .unwrap();
        assert!(dir.path().join("thumbnails").join(&name).exists());
    }
}

//! Signing seam and the in-process secp256k1 signer.
//!
//! A [`Signer`] offers two primitives over the same 32-byte digest:
//! typed-data signing (a wallet renders the structured payload before
//! approving) and raw-hash signing. The builder picks between them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use k256::ecdsa::SigningKey;
use warden_core::signature::address_of;
use warden_core::{sign_digest, Address, Bytes, SignatureError, TypedData, B256};

#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// Sign EIP-712 typed data (`eth_signTypedData_v4` semantics).
    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Bytes, SignatureError>;

    /// Sign a 32-byte hash as-is.
    async fn sign_hash(&self, hash: B256) -> Result<Bytes, SignatureError>;
}

/// A secp256k1 key held in memory.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Parse a base64-encoded 32-byte secret.
    pub fn from_base64(secret: &str) -> Result<Self, String> {
        let bytes = BASE64
            .decode(secret.trim())
            .map_err(|e| format!("error decoding secret key: {}", e))?;
        if bytes.len() != 32 {
            return Err(format!(
                "invalid secret key length: expected 32 bytes, got {}",
                bytes.len()
            ));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| format!("invalid secret key material: {}", e))?;
        Ok(Self::new(key))
    }

    /// Read a `<prefix>.secret` file.
    pub fn read_key_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading secret key '{}': {}", path.display(), e))?;
        Self::from_base64(&contents).map_err(|e| format!("'{}': {}", path.display(), e))
    }

    pub fn secret_base64(&self) -> String {
        BASE64.encode(self.key.to_bytes())
    }

    /// Write `<prefix>.secret` (base64 secret, mode 0600 on Unix) and
    /// `<prefix>.addr` (0x address). Returns both paths.
    pub fn write_key_files(&self, prefix: &str) -> Result<(PathBuf, PathBuf), String> {
        let secret_path = PathBuf::from(format!("{}.secret", prefix));
        std::fs::write(&secret_path, self.secret_base64()).map_err(|e| {
            format!(
                "error writing secret key to '{}': {}",
                secret_path.display(),
                e
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&secret_path, perms) {
                tracing::warn!(path = %secret_path.display(), error = %e, "could not restrict key file permissions");
            }
        }

        let addr_path = PathBuf::from(format!("{}.addr", prefix));
        std::fs::write(&addr_path, self.address.to_string()).map_err(|e| {
            format!(
                "error writing address to '{}': {}",
                addr_path.display(),
                e
            )
        })?;
        Ok((secret_path, addr_path))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Bytes, SignatureError> {
        sign_digest(&self.key, typed.digest())
    }

    async fn sign_hash(&self, hash: B256) -> Result<Bytes, SignatureError> {
        sign_digest(&self.key, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_core::recover_signer;

    #[test]
    fn base64_round_trip_keeps_address() {
        let signer = LocalSigner::random();
        let restored = LocalSigner::from_base64(&signer.secret_base64()).unwrap();
        assert_eq!(restored.address(), signer.address());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = BASE64.encode([7u8; 16]);
        let err = LocalSigner::from_base64(&short).unwrap_err();
        assert!(err.contains("expected 32 bytes"));
        assert!(LocalSigner::from_base64("not base64!").is_err());
    }

    #[test]
    fn key_files_are_written_and_readable() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("ops").display().to_string();
        let signer = LocalSigner::random();
        let (secret, addr) = signer.write_key_files(&prefix).unwrap();

        let restored = LocalSigner::read_key_file(&secret).unwrap();
        assert_eq!(restored.address(), signer.address());
        let written: Address = std::fs::read_to_string(addr)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(written, signer.address());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&secret).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn raw_hash_signature_recovers() {
        let signer = LocalSigner::random();
        let hash = B256::repeat_byte(0x5a);
        let sig = signer.sign_hash(hash).await.unwrap();
        assert_eq!(recover_signer(hash, &sig).unwrap(), signer.address());
    }
}

//! secp256k1 signatures over 32-byte digests.
//!
//! Signatures are 65 bytes, `r || s || v`, with `v = 27 + recovery id`,
//! which is what the verifier's `ecrecover` expects.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature must be {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery byte {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Ethereum address of a public key: the last 20 bytes of the keccak hash
/// of the uncompressed point without its prefix byte.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

pub fn sign_digest(key: &SigningKey, digest: B256) -> Result<Bytes, SignatureError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(SIGNATURE_LENGTH);
    out.extend_from_slice(&signature.to_bytes());
    out.push(27 + recovery_id.to_byte());
    Ok(Bytes::from(out))
}

/// Recover the address that produced `signature` over `digest`.
///
/// Accepts `v` as either `27/28` or the bare recovery id `0/1`.
pub fn recover_signer(digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(SignatureError::InvalidLength(signature.len()));
    }
    let v = signature[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(v))?;
    let signature = Signature::from_slice(&signature[..64])
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    Ok(address_of(&key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn signature_recovers_to_signing_address() {
        let key = SigningKey::random(&mut OsRng);
        let digest = keccak256(b"warden-signature-test");
        let signature = sign_digest(&key, digest).unwrap();

        assert_eq!(signature.len(), SIGNATURE_LENGTH);
        assert!(signature[64] == 27 || signature[64] == 28);
        assert_eq!(
            recover_signer(digest, &signature).unwrap(),
            address_of(key.verifying_key())
        );
    }

    #[test]
    fn bare_recovery_id_is_accepted() {
        let key = SigningKey::random(&mut OsRng);
        let digest = keccak256(b"bare-v");
        let mut signature = sign_digest(&key, digest).unwrap().to_vec();
        signature[64] -= 27;
        assert_eq!(
            recover_signer(digest, &signature).unwrap(),
            address_of(key.verifying_key())
        );
    }

    #[test]
    fn different_digest_recovers_different_address() {
        let key = SigningKey::random(&mut OsRng);
        let signature = sign_digest(&key, keccak256(b"one")).unwrap();
        let recovered = recover_signer(keccak256(b"two"), &signature);
        assert_ne!(recovered.ok(), Some(address_of(key.verifying_key())));
    }

    #[test]
    fn rejects_bad_shapes() {
        let digest = B256::ZERO;
        assert_eq!(
            recover_signer(digest, &[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
        let mut bad_v = [1u8; 65];
        bad_v[64] = 40;
        assert_eq!(
            recover_signer(digest, &bad_v),
            Err(SignatureError::InvalidRecoveryId(40))
        );
        assert!(matches!(
            recover_signer(digest, &[0u8; 65]),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn known_key_has_known_address() {
        // private key 1 -> generator point
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret).unwrap();
        let expected: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
            .parse()
            .unwrap();
        assert_eq!(address_of(key.verifying_key()), expected);
    }
}

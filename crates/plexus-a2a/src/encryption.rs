//! Push-notification authentication at rest (spec §3 `A2APushConfig`, §4.7
//! "Encryption key selection"). Ciphertext format: `enc:v1:<iv-b64>:<tag-b64>:<ct-b64>`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const PREFIX: &str = "enc:v1:";
const IV_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("no encryption key configured and no admin key to derive one from")]
    NoKeyAvailable,
    #[error("ciphertext is malformed")]
    MalformedCiphertext,
    #[error("decryption failed")]
    DecryptFailed,
}

/// Resolves the 32-byte AES key from `PUSH_AUTH_ENCRYPTION_KEY` (32-byte
/// base64, 32-byte hex, or UTF-8 >= 32 bytes hashed down) or, failing that,
/// derives one from the admin key by hashing it — logging a warning, per
/// spec §4.7. Returns `None` when neither source is available, in which
/// case callers must refuse to persist push configs carrying authentication.
pub struct EncryptionKeySource {
    key: Option<[u8; 32]>,
}

impl EncryptionKeySource {
    pub fn resolve(push_auth_encryption_key: Option<&str>, admin_key: Option<&str>) -> Self {
        if let Some(raw) = push_auth_encryption_key {
            if let Some(key) = decode_explicit_key(raw) {
                return Self { key: Some(key) };
            }
            tracing::warn!(
                event = "push_auth_encryption_key_unparseable",
                "falling back to admin-key derivation"
            );
        }
        if let Some(admin_key) = admin_key {
            tracing::warn!(
                event = "push_auth_key_derived_from_admin_key",
                "set PUSH_AUTH_ENCRYPTION_KEY to use a dedicated key"
            );
            let mut hasher = Sha256::new();
            hasher.update(admin_key.as_bytes());
            let digest = hasher.finalize();
            let mut key = [0u8; 32];
            key.copy_from_slice(&digest);
            return Self { key: Some(key) };
        }
        Self { key: None }
    }

    pub fn is_available(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let key_bytes = self.key.ok_or(EncryptionError::NoKeyAvailable)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let ct_and_tag = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &[],
                },
            )
            .map_err(|_| EncryptionError::DecryptFailed)?;
        // AES-GCM appends the 16-byte tag to the ciphertext; split it so
        // the stored format keeps tag and ciphertext separately labeled.
        let tag_start = ct_and_tag.len() - 16;
        let (ct, tag) = ct_and_tag.split_at(tag_start);
        Ok(format!(
            "{PREFIX}{}:{}:{}",
            BASE64.encode(iv),
            BASE64.encode(tag),
            BASE64.encode(ct)
        ))
    }

    /// Transparently decrypts `enc:v1:...` rows; non-prefixed legacy rows
    /// are returned unchanged (spec §4.7 "Reads transparently decrypt;
    /// non-prefixed legacy rows are returned as JSON").
    pub fn decrypt(&self, stored: &str) -> Result<String, EncryptionError> {
        let Some(rest) = stored.strip_prefix(PREFIX) else {
            return Ok(stored.to_string());
        };
        let key_bytes = self.key.ok_or(EncryptionError::NoKeyAvailable)?;
        let mut parts = rest.splitn(3, ':');
        let iv_b64 = parts.next().ok_or(EncryptionError::MalformedCiphertext)?;
        let tag_b64 = parts.next().ok_or(EncryptionError::MalformedCiphertext)?;
        let ct_b64 = parts.next().ok_or(EncryptionError::MalformedCiphertext)?;

        let iv = BASE64
            .decode(iv_b64)
            .map_err(|_| EncryptionError::MalformedCiphertext)?;
        let tag = BASE64
            .decode(tag_b64)
            .map_err(|_| EncryptionError::MalformedCiphertext)?;
        let ct = BASE64
            .decode(ct_b64)
            .map_err(|_| EncryptionError::MalformedCiphertext)?;
        if iv.len() != IV_LEN {
            return Err(EncryptionError::MalformedCiphertext);
        }

        let mut ct_and_tag = ct;
        ct_and_tag.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(&iv);
        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &ct_and_tag,
                    aad: &[],
                },
            )
            .map_err(|_| EncryptionError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| EncryptionError::DecryptFailed)
    }
}

fn decode_explicit_key(raw: &str) -> Option<[u8; 32]> {
    if let Ok(bytes) = BASE64.decode(raw) {
        if bytes.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            return Some(key);
        }
    }
    if let Ok(bytes) = hex::decode(raw) {
        if bytes.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            return Some(key);
        }
    }
    if raw.len() >= 32 {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        return Some(key);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_explicit_base64_key() {
        let key = BASE64.encode([7u8; 32]);
        let source = EncryptionKeySource::resolve(Some(&key), None);
        let ciphertext = source.encrypt(r#"{"token":"secret"}"#).unwrap();
        assert!(ciphertext.starts_with(PREFIX));
        let plaintext = source.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, r#"{"token":"secret"}"#);
    }

    #[test]
    fn derives_key_from_admin_key_when_no_explicit_key_set() {
        let source = EncryptionKeySource::resolve(None, Some("admin-secret"));
        assert!(source.is_available());
        let ciphertext = source.encrypt("hello").unwrap();
        assert_eq!(source.decrypt(&ciphertext).unwrap(), "hello");
    }

    #[test]
    fn no_key_available_refuses_to_encrypt() {
        let source = EncryptionKeySource::resolve(None, None);
        assert!(!source.is_available());
        assert!(matches!(
            source.encrypt("x"),
            Err(EncryptionError::NoKeyAvailable)
        ));
    }

    #[test]
    fn legacy_unprefixed_rows_pass_through_unchanged() {
        let source = EncryptionKeySource::resolve(None, Some("admin-secret"));
        assert_eq!(source.decrypt(r#"{"token":"legacy"}"#).unwrap(), r#"{"token":"legacy"}"#);
    }
}

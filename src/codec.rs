//! Codec: JSON serialization and AES-256-GCM at-rest encryption.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InitError, Result};

/// A 32-byte AES-256 key, validated at construction time.
#[derive(Clone)]
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    pub fn new(bytes: &[u8]) -> std::result::Result<Self, InitError> {
        if bytes.len() != 32 {
            return Err(InitError::BadKeyLength(bytes.len()));
        }
        Ok(EncryptionKey(*Key::<Aes256Gcm>::from_slice(bytes)))
    }
}

/// On-disk envelope for an encrypted snapshot, matching spec.md §6:
/// `{"iv": "<hex>", "tag": "<hex>", "content": "<hex>"}`.
#[derive(Serialize, Deserialize)]
pub struct Envelope {
    pub iv: String,
    pub tag: String,
    pub content: String,
}

/// Serializes a document to UTF-8 JSON, compact or two-space indented.
/// Object keys are emitted in insertion order because the document is built
/// on `serde_json::Value` with the `preserve_order` feature.
pub fn serialize(doc: &Value, indented: bool) -> Result<Vec<u8>> {
    if indented {
        Ok(serde_json::to_vec_pretty(doc)?)
    } else {
        Ok(serde_json::to_vec(doc)?)
    }
}

pub fn deserialize(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encrypts `plaintext` under `key`, returning the serialized envelope
/// bytes. AES-GCM's standard 12-byte nonce is used (the spec allows 12 or
/// 16 bytes; 12 is the construction's native size and the one every AEAD
/// consumer in the Rust ecosystem expects).
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| InitError::DecryptionFailed)?;
    // `aes_gcm::Aead::encrypt` appends the 16-byte authentication tag to the
    // ciphertext; split it back out so the envelope carries `tag` and
    // `content` separately, per spec.md §6.
    let tag = ciphertext.split_off(ciphertext.len() - 16);
    let envelope = Envelope {
        iv: hex::encode(nonce),
        tag: hex::encode(tag),
        content: hex::encode(ciphertext),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decrypts an envelope previously produced by `encrypt`. Any tag mismatch
/// or malformed envelope surfaces as `InitError::DecryptionFailed`; callers
/// must treat the store as unusable on this error (spec.md §4.3).
pub fn decrypt(envelope_bytes: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let envelope: Envelope =
        serde_json::from_slice(envelope_bytes).map_err(|_| InitError::DecryptionFailed)?;
    let iv = hex::decode(&envelope.iv).map_err(|_| InitError::DecryptionFailed)?;
    let tag = hex::decode(&envelope.tag).map_err(|_| InitError::DecryptionFailed)?;
    let content = hex::decode(&envelope.content).map_err(|_| InitError::DecryptionFailed)?;
    if iv.len() != 12 || tag.len() != 16 {
        return Err(InitError::DecryptionFailed.into());
    }
    let nonce = Nonce::from_slice(&iv);
    let mut combined = content;
    combined.extend_from_slice(&tag);
    let cipher = Aes256Gcm::new(&key.0);
    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| InitError::DecryptionFailed.into())
}

/// True iff `bytes` parses as an encryption envelope shape (used by
/// recovery to decide whether a snapshot file was written with a key).
pub fn looks_like_envelope(bytes: &[u8]) -> bool {
    serde_json::from_slice::<Envelope>(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> EncryptionKey {
        EncryptionKey::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn bad_key_length_is_rejected() {
        assert!(EncryptionKey::new(&[0u8; 31]).is_err());
    }

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let plaintext = serialize(&json!({"secret": "my secret"}), false).unwrap();
        let envelope = encrypt(&plaintext, &key()).unwrap();
        assert!(looks_like_envelope(&envelope));
        // the ciphertext must not contain the plaintext literal
        assert!(!String::from_utf8_lossy(&envelope).contains("my secret"));
        let decrypted = decrypt(&envelope, &key()).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_tag_fails_decryption() {
        let plaintext = serialize(&json!({"a": 1}), false).unwrap();
        let envelope_bytes = encrypt(&plaintext, &key()).unwrap();
        let mut envelope: Envelope = serde_json::from_slice(&envelope_bytes).unwrap();
        envelope.tag = "00".repeat(16);
        let tampered = serde_json::to_vec(&envelope).unwrap();
        assert!(decrypt(&tampered, &key()).is_err());
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let plaintext = serialize(&json!({"a": 1}), false).unwrap();
        let envelope = encrypt(&plaintext, &key()).unwrap();
        let other_key = EncryptionKey::new(&[9u8; 32]).unwrap();
        assert!(decrypt(&envelope, &other_key).is_err());
    }

    #[test]
    fn indented_output_has_two_space_indentation() {
        let bytes = serialize(&json!({"a": 1}), true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("  \"a\""));
    }
}

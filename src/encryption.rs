//! The encryption of title/description is opaque to the core. Persistent
//! columns remain ciphertext; the Classifier and the dispatch context
//! snapshot must see plaintext. This module models that boundary as a
//! collaborator trait so the core never needs to know which key-value store
//! or cipher backs it.

use crate::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_key(&self, tenant_id: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn decrypt(&self, ciphertext: &str, key: &[u8]) -> Result<String>;
    async fn encrypt(&self, plaintext: &str, key: &[u8]) -> Result<String>;
}

/// Decrypts a task's opaque fields for a tenant, fetching the key once.
pub struct Decryptor {
    keys: Box<dyn KeyStore>,
    cipher: Box<dyn Encryptor>,
}

impl Decryptor {
    pub fn new(keys: Box<dyn KeyStore>, cipher: Box<dyn Encryptor>) -> Self {
        Self { keys, cipher }
    }

    pub async fn decrypt_title(&self, tenant_id: &str, title: &str) -> Result<String> {
        let key = self.keys.get_key(tenant_id).await?;
        self.cipher.decrypt(title, &key).await
    }

    pub async fn decrypt_optional(
        &self,
        tenant_id: &str,
        value: &Option<String>,
    ) -> Result<Option<String>> {
        match value {
            Some(v) => Ok(Some(self.cipher.decrypt(v, &self.keys.get_key(tenant_id).await?).await?)),
            None => Ok(None),
        }
    }
}

/// In-memory key store and a reversible XOR "cipher" good enough to exercise
/// the decrypt boundary in tests and local development. A production
/// deployment swaps both collaborators for a real key-management service and
/// cipher without touching the Dispatcher or Classifier.
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, Vec<u8>>>,
    default_key: Vec<u8>,
}

impl InMemoryKeyStore {
    pub fn new(default_key: Vec<u8>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            default_key,
        }
    }

    pub async fn set_key(&self, tenant_id: &str, key: Vec<u8>) {
        self.keys.write().await.insert(tenant_id.to_string(), key);
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get_key(&self, tenant_id: &str) -> Result<Vec<u8>> {
        Ok(self
            .keys
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| self.default_key.clone()))
    }
}

pub struct XorCipher;

#[async_trait]
impl Encryptor for XorCipher {
    async fn encrypt(&self, plaintext: &str, key: &[u8]) -> Result<String> {
        if key.is_empty() {
            return Err(CoreError::Configuration("encryption key is empty".into()));
        }
        let xored: Vec<u8> = plaintext
            .as_bytes()
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect();
        Ok(format!("xor:{}", hex_encode(&xored)))
    }

    async fn decrypt(&self, ciphertext: &str, key: &[u8]) -> Result<String> {
        if key.is_empty() {
            return Err(CoreError::Configuration("encryption key is empty".into()));
        }
        let Some(hex) = ciphertext.strip_prefix("xor:") else {
            // Not our ciphertext format: treat as already-plaintext, matching
            // the behavior a real cipher would need for unencrypted legacy rows.
            return Ok(ciphertext.to_string());
        };
        let bytes = hex_decode(hex).map_err(|e| CoreError::Validation(format!("bad ciphertext: {e}")))?;
        let xored: Vec<u8> = bytes
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect();
        String::from_utf8(xored).map_err(|e| CoreError::Validation(format!("bad ciphertext: {e}")))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> std::result::Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".into());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_encrypt_decrypt() {
        let cipher = XorCipher;
        let key = b"secret-key".to_vec();
        let ciphertext = cipher.encrypt("[ai] implement login", &key).await.unwrap();
        assert_ne!(ciphertext, "[ai] implement login");
        let plaintext = cipher.decrypt(&ciphertext, &key).await.unwrap();
        assert_eq!(plaintext, "[ai] implement login");
    }

    #[tokio::test]
    async fn unrecognized_ciphertext_passes_through() {
        let cipher = XorCipher;
        let plaintext = cipher.decrypt("[ai] plain title", b"key").await.unwrap();
        assert_eq!(plaintext, "[ai] plain title");
    }

    #[tokio::test]
    async fn key_store_falls_back_to_default() {
        let store = InMemoryKeyStore::new(b"default".to_vec());
        assert_eq!(store.get_key("tenant-a").await.unwrap(), b"default".to_vec());
        store.set_key("tenant-a", b"override".to_vec()).await;
        assert_eq!(store.get_key("tenant-a").await.unwrap(), b"override".to_vec());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered symmetric key set for gossip encryption.
//!
//! The first key is primary (used for encryption); the rest are accepted
//! for decryption. The keyring file is a JSON array of base64-encoded
//! keys, primary first. AEAD itself lives in the transport.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use muster_core::Error;
use parking_lot::Mutex;
use std::path::Path;

/// Accepted key sizes in bytes (AES-128/192/256).
const KEY_SIZES: [usize; 3] = [16, 24, 32];

/// Ordered set of symmetric keys, primary first.
pub struct Keyring {
    keys: Mutex<Vec<Vec<u8>>>,
}

fn validate_key(key: &[u8]) -> Result<(), Error> {
    if KEY_SIZES.contains(&key.len()) {
        Ok(())
    } else {
        Err(Error::Invalid(format!(
            "key size must be 16, 24 or 32 bytes, got {}",
            key.len()
        )))
    }
}

impl Keyring {
    /// Create a keyring with a single primary key.
    pub fn new(primary: Vec<u8>) -> Result<Self, Error> {
        validate_key(&primary)?;
        Ok(Self { keys: Mutex::new(vec![primary]) })
    }

    /// Create a keyring from an ordered key list, primary first.
    pub fn from_keys(keys: Vec<Vec<u8>>) -> Result<Self, Error> {
        if keys.is_empty() {
            return Err(Error::Invalid("keyring requires at least one key".to_string()));
        }
        for key in &keys {
            validate_key(key)?;
        }
        Ok(Self { keys: Mutex::new(keys) })
    }

    /// Install an additional decryption key. Idempotent for a key that is
    /// already installed.
    pub fn add_key(&self, key: Vec<u8>) -> Result<(), Error> {
        validate_key(&key)?;
        let mut keys = self.keys.lock();
        if !keys.contains(&key) {
            keys.push(key);
        }
        Ok(())
    }

    /// Make an installed key the primary one.
    pub fn use_key(&self, key: &[u8]) -> Result<(), Error> {
        let mut keys = self.keys.lock();
        let Some(pos) = keys.iter().position(|k| k == key) else {
            return Err(Error::Invalid("requested key is not in the keyring".to_string()));
        };
        let primary = keys.remove(pos);
        keys.insert(0, primary);
        Ok(())
    }

    /// Base64-encoded keys, primary first.
    pub fn get_keys(&self) -> Vec<String> {
        self.keys.lock().iter().map(|k| BASE64.encode(k)).collect()
    }

    /// Raw key material, primary first.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keys.lock().clone()
    }
}

/// Load a keyring from a JSON array of base64-encoded keys.
pub fn load_keyring_file(path: &Path) -> Result<Keyring, Error> {
    let data = std::fs::read_to_string(path)?;
    let encoded: Vec<String> = serde_json::from_str(&data)
        .map_err(|e| Error::Invalid(format!("malformed keyring file: {e}")))?;
    let mut keys = Vec::with_capacity(encoded.len());
    for entry in &encoded {
        let key = BASE64
            .decode(entry)
            .map_err(|e| Error::Invalid(format!("malformed key in keyring file: {e}")))?;
        keys.push(key);
    }
    Keyring::from_keys(keys)
}

/// Persist a keyring as a JSON array of base64-encoded keys.
pub fn write_keyring_file(path: &Path, keyring: &Keyring) -> Result<(), Error> {
    let encoded = keyring.get_keys();
    let json = serde_json::to_string_pretty(&encoded)
        .map_err(|e| Error::Invalid(format!("keyring serialization failed: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
#[path = "keyring_tests.rs"]
mod tests;

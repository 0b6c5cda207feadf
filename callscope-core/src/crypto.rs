//! Per-tenant telephony credential resolution.
//!
//! Credentials live on the agency row in one of two formats:
//! - a single AES-256-CBC encrypted auth token, stored as
//!   `"<iv_hex>:<ciphertext_hex>"`, with the key derived from an
//!   environment secret via SHA-256;
//! - a legacy JSON blob, either `{ "encrypted": true, "payload": ... }`
//!   (same cipher) or plaintext `{ "auth_token": ..., "api_url": ... }`.
//!
//! Missing credentials resolve to `None` — callers treat that as "skip
//! tenant", not as a failed run. A failed decryption yields an empty
//! string for that field and a warning, never an error.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const DEFAULT_API_BASE: &str = "https://api.convoso.com/v1";

/// Decrypted per-tenant telephony API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelephonyCredentials {
    pub auth_token: String,
    pub api_base_url: String,
}

/// Credential columns as stored on the agency row.
#[derive(Debug, Clone, Default)]
pub struct StoredCredentials {
    /// New-style encrypted single-field token (`"<iv_hex>:<ct_hex>"`).
    pub api_token_encrypted: Option<String>,
    /// Base URL stored alongside the encrypted token.
    pub api_base_url: Option<String>,
    /// Legacy JSON credentials blob.
    pub credentials_json: Option<serde_json::Value>,
}

impl StoredCredentials {
    pub fn is_configured(&self) -> bool {
        self.api_token_encrypted.is_some() || self.credentials_json.is_some()
    }
}

/// Legacy JSON blob shape. `api_token` is an older alias for `auth_token`.
#[derive(Debug, Deserialize)]
struct LegacyCredentials {
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
}

/// Derive the 32-byte cipher key from an environment secret.
pub fn derive_key(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Decrypt an `"<iv_hex>:<ciphertext_hex>"` payload.
pub fn decrypt_token(payload: &str, key: &[u8; 32]) -> Result<String> {
    let (iv_hex, ct_hex) = payload
        .split_once(':')
        .ok_or_else(|| Error::Crypto("payload is not <iv_hex>:<ciphertext_hex>".to_string()))?;

    let iv = hex::decode(iv_hex).map_err(|e| Error::Crypto(format!("bad IV hex: {}", e)))?;
    let ct = hex::decode(ct_hex).map_err(|e| Error::Crypto(format!("bad ciphertext hex: {}", e)))?;

    let cipher = Aes256CbcDec::new_from_slices(key, &iv)
        .map_err(|e| Error::Crypto(format!("bad key/IV length: {}", e)))?;

    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ct)
        .map_err(|e| Error::Crypto(format!("decryption failed: {}", e)))?;

    String::from_utf8(plain).map_err(|e| Error::Crypto(format!("plaintext not UTF-8: {}", e)))
}

/// Encrypt a token into the stored `"<iv_hex>:<ciphertext_hex>"` format.
///
/// Used when onboarding an agency and by tests.
pub fn encrypt_token(plain: &str, key: &[u8; 32]) -> String {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).expect("key and IV lengths are fixed");
    let ct = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

    format!("{}:{}", hex::encode(iv), hex::encode(ct))
}

/// Resolve stored credential fields into usable credentials.
///
/// Returns `Ok(None)` when no credentials are configured for the tenant.
/// A configured-but-undecryptable token resolves to an empty token (and a
/// warning) rather than an error, matching the skip-don't-fail contract.
pub fn resolve_credentials(
    stored: &StoredCredentials,
    secret: Option<&str>,
) -> Result<Option<TelephonyCredentials>> {
    // New encrypted single-field token wins when present.
    if let Some(encrypted) = stored.api_token_encrypted.as_deref() {
        let secret = secret.ok_or_else(|| {
            Error::Config(format!(
                "{} must be set to decrypt stored credentials",
                crate::config::ENCRYPTION_KEY_ENV
            ))
        })?;
        let key = derive_key(secret);
        let auth_token = match decrypt_token(encrypted, &key) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decrypt agency auth token");
                String::new()
            }
        };

        return Ok(Some(TelephonyCredentials {
            auth_token,
            api_base_url: stored
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }));
    }

    // Legacy JSON blob fallback.
    if let Some(blob) = stored.credentials_json.as_ref() {
        let legacy: LegacyCredentials = serde_json::from_value(blob.clone())
            .map_err(|e| Error::Crypto(format!("legacy credentials blob malformed: {}", e)))?;

        let auth_token = if legacy.encrypted {
            let payload = legacy.payload.as_deref().unwrap_or_default();
            match secret {
                Some(secret) => {
                    let key = derive_key(secret);
                    match decrypt_token(payload, &key) {
                        Ok(token) => token,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to decrypt legacy credentials");
                            String::new()
                        }
                    }
                }
                None => {
                    tracing::warn!("Encrypted legacy credentials present but no secret configured");
                    String::new()
                }
            }
        } else {
            legacy
                .auth_token
                .or(legacy.api_token)
                .unwrap_or_default()
        };

        return Ok(Some(TelephonyCredentials {
            auth_token,
            api_base_url: legacy
                .api_url
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_key("unit-test-secret");
        let payload = encrypt_token("tok_12345", &key);
        assert!(payload.contains(':'));
        assert_eq!(decrypt_token(&payload, &key).unwrap(), "tok_12345");
    }

    #[test]
    fn test_decrypt_rejects_malformed_payload() {
        let key = derive_key("unit-test-secret");
        assert!(decrypt_token("no-separator", &key).is_err());
        assert!(decrypt_token("zz:zz", &key).is_err());
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key = derive_key("secret-a");
        let other = derive_key("secret-b");
        let payload = encrypt_token("tok_12345", &key);
        assert!(decrypt_token(&payload, &other).is_err());
    }

    #[test]
    fn test_resolve_none_when_unconfigured() {
        let stored = StoredCredentials::default();
        let resolved = resolve_credentials(&stored, Some("secret")).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_resolve_encrypted_token() {
        let key = derive_key("secret");
        let stored = StoredCredentials {
            api_token_encrypted: Some(encrypt_token("tok_live", &key)),
            api_base_url: Some("https://dialer.example.com/v1".to_string()),
            credentials_json: None,
        };
        let creds = resolve_credentials(&stored, Some("secret"))
            .unwrap()
            .unwrap();
        assert_eq!(creds.auth_token, "tok_live");
        assert_eq!(creds.api_base_url, "https://dialer.example.com/v1");
    }

    #[test]
    fn test_resolve_bad_decrypt_yields_empty_token() {
        let key = derive_key("secret");
        let stored = StoredCredentials {
            api_token_encrypted: Some(encrypt_token("tok_live", &key)),
            api_base_url: None,
            credentials_json: None,
        };
        // Wrong secret: resolution still succeeds, token is empty.
        let creds = resolve_credentials(&stored, Some("other-secret"))
            .unwrap()
            .unwrap();
        assert_eq!(creds.auth_token, "");
        assert_eq!(creds.api_base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn test_resolve_legacy_plaintext_blob() {
        let stored = StoredCredentials {
            api_token_encrypted: None,
            api_base_url: None,
            credentials_json: Some(json!({
                "auth_token": "tok_legacy",
                "api_url": "https://old.example.com/v1"
            })),
        };
        let creds = resolve_credentials(&stored, None).unwrap().unwrap();
        assert_eq!(creds.auth_token, "tok_legacy");
        assert_eq!(creds.api_base_url, "https://old.example.com/v1");
    }

    #[test]
    fn test_resolve_legacy_api_token_alias() {
        let stored = StoredCredentials {
            api_token_encrypted: None,
            api_base_url: None,
            credentials_json: Some(json!({ "api_token": "tok_alias" })),
        };
        let creds = resolve_credentials(&stored, None).unwrap().unwrap();
        assert_eq!(creds.auth_token, "tok_alias");
    }

    #[test]
    fn test_resolve_legacy_encrypted_blob() {
        let key = derive_key("secret");
        let stored = StoredCredentials {
            api_token_encrypted: None,
            api_base_url: None,
            credentials_json: Some(json!({
                "encrypted": true,
                "payload": encrypt_token("tok_wrapped", &key),
                "api_url": "https://old.example.com/v1"
            })),
        };
        let creds = resolve_credentials(&stored, Some("secret"))
            .unwrap()
            .unwrap();
        assert_eq!(creds.auth_token, "tok_wrapped");
    }
}

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Key, Nonce};
use anyhow::{Result, anyhow};
use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

// Wire format constants
pub(crate) const MAGIC: &[u8; 4] = b"RCT1";
pub(crate) const VERSION: u8 = 1;
pub(crate) const ALG_AES_256_GCM: u8 = 1;

// Header size: magic(4) + ver(1) + kid(1) + alg(1) + rsv(1) + nonce(12) = 20 bytes
pub(crate) const HEADER_SIZE: usize = 20;
pub(crate) const TAG_SIZE: usize = 16;

/// Lifetime of an issued token in seconds
pub const TOKEN_TTL_SECS: u32 = 3600;

/// Token-related errors with API error codes
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("AEAD decryption failed")]
    AeadFail,

    #[error("Key not found: {0}")]
    KeyNotFound(u8),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl TokenError {
    /// Convert error to HTTP status code
    pub fn to_err_code(&self) -> StatusCode {
        match self {
            TokenError::InvalidToken
            | TokenError::TokenExpired
            | TokenError::AeadFail
            | TokenError::KeyNotFound(_)
            | TokenError::InvalidHeader(_)
            | TokenError::InvalidPayload(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Binary header structure (plaintext)
#[derive(Debug, Clone)]
struct TokenHeader {
    magic: [u8; 4],
    version: u8,
    kid: u8,
    alg: u8,
    rsv: u8,
    nonce: [u8; 12],
}

impl TokenHeader {
    fn new(kid: u8, alg: u8) -> Self {
        use rand::RngCore;

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            magic: *MAGIC,
            version: VERSION,
            kid,
            alg,
            rsv: 0,
            nonce,
        }
    }

    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.kid;
        bytes[6] = self.alg;
        bytes[7] = self.rsv;
        bytes[8..20].copy_from_slice(&self.nonce);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        let bytes: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| TokenError::InvalidHeader("Header truncated".to_string()))?;

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != *MAGIC {
            return Err(TokenError::InvalidHeader("Bad magic".to_string()));
        }

        let version = bytes[4];
        if version != VERSION {
            return Err(TokenError::InvalidHeader(format!(
                "Unsupported version {version}",
            )));
        }

        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[8..20]);

        Ok(Self {
            magic,
            version,
            kid: bytes[5],
            alg: bytes[6],
            rsv: bytes[7],
            nonce,
        })
    }
}

/// Token payload structure (to be encrypted)
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenPayload {
    /// Username the token was issued to
    pub username: String,
    /// Expiration time in Unix timestamp
    pub exp_unix: u32,
}

impl TokenPayload {
    /// Serialize payload to binary format
    fn serialize_to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();

        // exp_unix (4 bytes)
        bytes.extend_from_slice(&self.exp_unix.to_le_bytes());

        // username_len (1 byte)
        let username_bytes = self.username.as_bytes();
        if username_bytes.len() > 255 {
            return Err(anyhow!("Username too long"));
        }
        bytes.push(username_bytes.len() as u8);

        // username (variable)
        bytes.extend_from_slice(username_bytes);

        Ok(bytes)
    }

    /// Deserialize payload from binary format
    fn deserialize_from_bytes(bytes: &[u8]) -> Result<TokenPayload, TokenError> {
        if bytes.len() < 5 {
            return Err(TokenError::InvalidPayload("Payload too short".to_string()));
        }

        // exp_unix (4 bytes)
        let exp_unix = u32::from_le_bytes(
            bytes[0..4]
                .try_into()
                .map_err(|_| TokenError::InvalidPayload("Failed to read exp_unix".to_string()))?,
        );

        // username_len (1 byte)
        let username_len = bytes[4] as usize;

        if bytes.len() != 5 + username_len {
            return Err(TokenError::InvalidPayload(
                "Invalid payload size".to_string(),
            ));
        }

        // username (variable)
        let username = String::from_utf8(bytes[5..5 + username_len].to_vec())
            .map_err(|_| TokenError::InvalidPayload("Invalid UTF-8 in username".to_string()))?;

        Ok(TokenPayload { username, exp_unix })
    }
}

#[derive(Debug)]
struct TokenServiceInner {
    keys: HashMap<u8, [u8; 32]>,
    current_kid: u8,
}

/// Issues and verifies sealed access tokens.
///
/// The key set is fixed at startup; old keys stay in the map so tokens signed
/// before a rotation keep verifying until they expire.
#[derive(Clone, Debug)]
pub struct TokenService {
    inner: Arc<TokenServiceInner>,
}

impl TokenService {
    /// Create a token service from configured keys. Signing uses the smallest kid.
    pub fn from_keys(keys: Vec<(u8, [u8; 32])>) -> Result<Self> {
        let keys = keys.into_iter().collect::<HashMap<_, _>>();
        let current_kid = keys
            .keys()
            .min()
            .copied()
            .ok_or_else(|| anyhow!("At least one token key is required"))?;

        Ok(Self {
            inner: Arc::new(TokenServiceInner { keys, current_kid }),
        })
    }

    /// Create a token service with a single specific key
    pub fn with_key(kid: u8, key: [u8; 32]) -> Self {
        let mut keys = HashMap::new();
        keys.insert(kid, key);

        Self {
            inner: Arc::new(TokenServiceInner {
                keys,
                current_kid: kid,
            }),
        }
    }

    /// Issue a token for a username, valid for [`TOKEN_TTL_SECS`] from now
    pub fn issue(&self, username: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;

        let payload = TokenPayload {
            username: username.to_string(),
            exp_unix: now + TOKEN_TTL_SECS,
        };

        self.sign(&payload)
    }

    /// Sign a payload and return the base64url-encoded token
    fn sign(&self, payload: &TokenPayload) -> Result<String> {
        let key = self
            .inner
            .keys
            .get(&self.inner.current_kid)
            .ok_or_else(|| anyhow!("Key ID {} not found", self.inner.current_kid))?;

        // Create header
        let header = TokenHeader::new(self.inner.current_kid, ALG_AES_256_GCM);
        let header_bytes = header.to_bytes();

        // Serialize payload
        let payload_bytes = payload.serialize_to_bytes()?;

        // Encrypt using AES-256-GCM
        let cipher_key = Key::<Aes256Gcm>::from_slice(key);
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(&header.nonce);

        // Use header as AAD (Additional Authenticated Data)
        let ciphertext = cipher
            .encrypt(
                nonce,
                aes_gcm::aead::Payload {
                    msg: &payload_bytes,
                    aad: &header_bytes,
                },
            )
            .map_err(|error| anyhow!("Encryption failed: {error}"))?;

        // Combine: header || ciphertext (includes tag)
        let mut token_bytes = header_bytes.to_vec();
        token_bytes.extend_from_slice(&ciphertext);

        // Encode as base64url without padding
        Ok(URL_SAFE_NO_PAD.encode(token_bytes))
    }

    /// Verify and decode a token, checking the expiration time.
    ///
    /// The embedded username is trusted as sealed; it is not re-checked
    /// against the credential store.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        // Decode from base64url
        let token_bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::InvalidToken)?;

        if token_bytes.len() < HEADER_SIZE + TAG_SIZE {
            return Err(TokenError::InvalidToken);
        }

        // Parse header
        let header = TokenHeader::from_bytes(&token_bytes[..HEADER_SIZE])?;

        // Get the key
        let key = self
            .inner
            .keys
            .get(&header.kid)
            .ok_or(TokenError::KeyNotFound(header.kid))?;

        if header.alg != ALG_AES_256_GCM {
            return Err(TokenError::InvalidHeader(format!(
                "Unsupported algorithm: {}",
                header.alg
            )));
        }

        // Extract ciphertext (includes tag)
        let ciphertext = &token_bytes[HEADER_SIZE..];

        // Decrypt using AES-256-GCM
        let cipher_key = Key::<Aes256Gcm>::from_slice(key);
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(&header.nonce);

        // Use header as AAD
        let header_bytes = header.to_bytes();
        let payload_bytes = cipher
            .decrypt(
                nonce,
                aes_gcm::aead::Payload {
                    msg: ciphertext,
                    aad: &header_bytes,
                },
            )
            .map_err(|_| TokenError::AeadFail)?;

        // Deserialize payload
        let payload = TokenPayload::deserialize_from_bytes(&payload_bytes)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        if now >= payload.exp_unix {
            return Err(TokenError::TokenExpired);
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_unix() -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32
    }

    #[test]
    fn test_token_issue_and_verify() {
        let service = TokenService::with_key(1, [7u8; 32]);

        let token = service.issue("alice").unwrap();
        assert!(!token.is_empty());

        let payload = service.verify(&token).unwrap();
        assert_eq!(payload.username, "alice");
        assert!(payload.exp_unix > now_unix());
        assert!(payload.exp_unix <= now_unix() + TOKEN_TTL_SECS + 1);
    }

    #[test]
    fn test_payload_serialization_roundtrip() {
        let test_cases = vec![
            TokenPayload {
                username: "alice".to_string(),
                exp_unix: 2000000000,
            },
            TokenPayload {
                username: "a".to_string(),
                exp_unix: 0,
            },
            TokenPayload {
                username: "user_with_a_rather_long_name_for_testing".to_string(),
                exp_unix: u32::MAX,
            },
        ];

        for payload in test_cases {
            let serialized = payload.serialize_to_bytes().unwrap();
            let deserialized = TokenPayload::deserialize_from_bytes(&serialized).unwrap();
            assert_eq!(deserialized, payload);
        }
    }

    #[test]
    fn test_payload_binary_format_compatibility() {
        let payload = TokenPayload {
            username: "abc".to_string(),
            exp_unix: 0x12345678,
        };

        let bytes = payload.serialize_to_bytes().unwrap();

        assert_eq!(&bytes[0..4], &0x12345678u32.to_le_bytes());
        assert_eq!(bytes[4], 3); // username length
        assert_eq!(&bytes[5..8], b"abc");
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn test_payload_username_too_long() {
        let payload = TokenPayload {
            username: "x".repeat(256),
            exp_unix: 2000000000,
        };

        assert!(payload.serialize_to_bytes().is_err());
    }

    #[test]
    fn test_payload_trailing_bytes_rejected() {
        let payload = TokenPayload {
            username: "alice".to_string(),
            exp_unix: 2000000000,
        };

        let mut bytes = payload.serialize_to_bytes().unwrap();
        bytes.push(0);

        assert_eq!(
            TokenPayload::deserialize_from_bytes(&bytes),
            Err(TokenError::InvalidPayload(
                "Invalid payload size".to_string()
            ))
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::with_key(1, [7u8; 32]);

        let payload = TokenPayload {
            username: "alice".to_string(),
            exp_unix: now_unix() - 1,
        };
        let token = service.sign(&payload).unwrap();

        assert_eq!(service.verify(&token), Err(TokenError::TokenExpired));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = TokenService::with_key(1, [7u8; 32]);
        let token = service.issue("alice").unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();

        // Flip a bit in the ciphertext
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);

        assert_eq!(service.verify(&tampered), Err(TokenError::AeadFail));
    }

    #[test]
    fn test_tampered_header_rejected() {
        let service = TokenService::with_key(1, [7u8; 32]);
        let token = service.issue("alice").unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();

        // The nonce is part of the AAD, so this breaks decryption
        bytes[8] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);

        assert_eq!(service.verify(&tampered), Err(TokenError::AeadFail));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let service = TokenService::with_key(1, [7u8; 32]);
        let token = service.issue("alice").unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        bytes[0..4].copy_from_slice(b"XXXX");
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);

        assert_eq!(
            service.verify(&tampered),
            Err(TokenError::InvalidHeader("Bad magic".to_string()))
        );
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = TokenService::with_key(1, [7u8; 32]);

        assert_eq!(
            service.verify("not!!valid!!base64"),
            Err(TokenError::InvalidToken)
        );
        assert_eq!(
            service.verify(&URL_SAFE_NO_PAD.encode(b"short")),
            Err(TokenError::InvalidToken)
        );
        assert_eq!(service.verify(""), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = TokenService::with_key(1, [7u8; 32]);
        let other = TokenService::with_key(1, [8u8; 32]);

        let token = signer.issue("alice").unwrap();

        assert_eq!(other.verify(&token), Err(TokenError::AeadFail));
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let signer = TokenService::with_key(1, [7u8; 32]);
        let other = TokenService::with_key(2, [7u8; 32]);

        let token = signer.issue("alice").unwrap();

        assert_eq!(other.verify(&token), Err(TokenError::KeyNotFound(1)));
    }

    #[test]
    fn test_from_keys_signs_with_smallest_kid() {
        let service = TokenService::from_keys(vec![(3, [3u8; 32]), (1, [1u8; 32])]).unwrap();
        let token = service.issue("alice").unwrap();

        // Only the kid=1 key can open it
        let verifier = TokenService::with_key(1, [1u8; 32]);
        assert_eq!(verifier.verify(&token).unwrap().username, "alice");
    }

    #[test]
    fn test_from_keys_requires_a_key() {
        assert!(TokenService::from_keys(Vec::new()).is_err());
    }

    #[test]
    fn test_tokens_are_unique_per_issue() {
        let service = TokenService::with_key(1, [7u8; 32]);

        // Fresh nonce every seal
        let token1 = service.issue("alice").unwrap();
        let token2 = service.issue("alice").unwrap();
        assert_ne!(token1, token2);
    }
}

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::digest::{HmacSha256Scheme, Md5Scheme, SecureKeyScheme};
use super::rsa::RsaPkcs1v15;
use crate::error::{PaysignError, Result};
use crate::keys::{SigningKey, VerificationKey};

/// Closed set of signature schemes, identified by the codes gateways send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureSchemeId {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    /// RSA PKCS#1 v1.5 over SHA-1.
    #[serde(rename = "RSA")]
    Rsa,
    /// RSA PKCS#1 v1.5 over SHA-256.
    #[serde(rename = "RSA2")]
    Rsa2,
    #[serde(rename = "SECURE-KEY")]
    SecureKey,
}

impl SignatureSchemeId {
    pub const ALL: [SignatureSchemeId; 5] = [
        SignatureSchemeId::Md5,
        SignatureSchemeId::HmacSha256,
        SignatureSchemeId::Rsa,
        SignatureSchemeId::Rsa2,
        SignatureSchemeId::SecureKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureSchemeId::Md5 => "MD5",
            SignatureSchemeId::HmacSha256 => "HMAC-SHA256",
            SignatureSchemeId::Rsa => "RSA",
            SignatureSchemeId::Rsa2 => "RSA2",
            SignatureSchemeId::SecureKey => "SECURE-KEY",
        }
    }

    /// Whether the scheme signs with a shared secret rather than a key pair.
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, SignatureSchemeId::Rsa | SignatureSchemeId::Rsa2)
    }
}

impl fmt::Display for SignatureSchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureSchemeId {
    type Err = PaysignError;

    fn from_str(code: &str) -> Result<Self> {
        SignatureSchemeId::ALL
            .into_iter()
            .find(|id| id.as_str() == code)
            .ok_or_else(|| PaysignError::UnsupportedScheme(code.to_string()))
    }
}

/// One signature algorithm over canonical bytes.
///
/// Implementations are sync; signing is CPU-bound.
pub trait SignatureScheme: Send + Sync {
    fn id(&self) -> SignatureSchemeId;

    /// Sign `message`, returning raw signature bytes.
    ///
    /// Fails with [`PaysignError::Signing`] when the key does not fit the
    /// scheme or the cryptographic operation fails.
    fn sign(&self, message: &[u8], key: &SigningKey) -> Result<Vec<u8>>;

    /// Check raw `signature` bytes over `message`. A key of the wrong kind
    /// is a failed check, not an error.
    fn verify(&self, message: &[u8], signature: &[u8], key: &VerificationKey) -> bool;
}

/// Schemes selectable by [`SignatureSchemeId`].
pub struct SchemeRegistry {
    schemes: HashMap<SignatureSchemeId, Box<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    /// A registry with no schemes; every lookup fails until one is registered.
    pub fn empty() -> Self {
        Self {
            schemes: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Md5Scheme);
        registry.register(HmacSha256Scheme);
        registry.register(SecureKeyScheme);
        registry.register(RsaPkcs1v15::<sha1::Sha1>::new(SignatureSchemeId::Rsa));
        registry.register(RsaPkcs1v15::<sha2::Sha256>::new(SignatureSchemeId::Rsa2));
        registry
    }

    /// Register `scheme` under its own id, replacing any previous entry.
    pub fn register(&mut self, scheme: impl SignatureScheme + 'static) {
        self.schemes.insert(scheme.id(), Box::new(scheme));
    }

    pub fn get(&self, id: SignatureSchemeId) -> Result<&dyn SignatureScheme> {
        self.schemes
            .get(&id)
            .map(|scheme| scheme.as_ref())
            .ok_or_else(|| PaysignError::UnsupportedScheme(id.to_string()))
    }

    pub fn sign(&self, message: &[u8], id: SignatureSchemeId, key: &SigningKey) -> Result<Vec<u8>> {
        let signature = self.get(id)?.sign(message, key)?;
        if signature.is_empty() {
            return Err(PaysignError::Signing(format!("{id} produced an empty signature")));
        }
        Ok(signature)
    }

    /// Errors only when `id` is not registered.
    pub fn verify(
        &self,
        message: &[u8],
        id: SignatureSchemeId,
        signature: &[u8],
        key: &VerificationKey,
    ) -> Result<bool> {
        let scheme = self.get(id)?;
        Ok(!signature.is_empty() && scheme.verify(message, signature, key))
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

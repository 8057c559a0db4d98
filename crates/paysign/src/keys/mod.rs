//! Key material: shared secrets, RSA keys, certificates and the cache that
//! loads them.

mod certificate;
mod store;

pub use certificate::{Certificate, ChainStatus, TrustAnchors, verify_certificate_chain};
pub use store::{CertificateBundle, CertificateIndex, KeyMaterialStore};

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{PaysignError, Result};

/// Key used to produce a signature.
#[derive(Clone)]
pub enum SigningKey {
    /// Shared secret for the digest schemes.
    Secret(Vec<u8>),
    Rsa(Arc<RsaPrivateKey>),
    /// Private key plus the certificate whose serial is sent as `certId`.
    Bundle(Arc<CertificateBundle>),
}

impl SigningKey {
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        Self::Secret(secret.as_ref().to_vec())
    }

    pub fn rsa(key: RsaPrivateKey) -> Self {
        Self::Rsa(Arc::new(key))
    }

    pub(crate) fn rsa_private_key(&self) -> Option<&RsaPrivateKey> {
        match self {
            SigningKey::Rsa(key) => Some(key.as_ref()),
            SigningKey::Bundle(bundle) => Some(bundle.private_key().as_ref()),
            SigningKey::Secret(_) => None,
        }
    }

    /// Serial of the signing certificate, when the key carries one.
    pub fn certificate_id(&self) -> Option<&str> {
        match self {
            SigningKey::Bundle(bundle) => Some(bundle.cert_id()),
            SigningKey::Secret(_) | SigningKey::Rsa(_) => None,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKey::Secret(_) => f.write_str("SigningKey::Secret(<redacted>)"),
            SigningKey::Rsa(_) => f.write_str("SigningKey::Rsa(<redacted>)"),
            SigningKey::Bundle(bundle) => f
                .debug_tuple("SigningKey::Bundle")
                .field(&bundle.cert_id())
                .finish(),
        }
    }
}

/// Key used to check a signature.
#[derive(Clone)]
pub enum VerificationKey {
    Secret(Vec<u8>),
    PublicKey(RsaPublicKey),
    Certificate(Arc<Certificate>),
    /// Certificates looked up by the serial a message names.
    CertificateIndex(Arc<CertificateIndex>),
    /// The message carries its own certificate, checked against these anchors.
    EmbeddedCertificate(Arc<TrustAnchors>),
}

impl VerificationKey {
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        Self::Secret(secret.as_ref().to_vec())
    }

    /// Public key usable directly, without per-message resolution.
    pub(crate) fn rsa_public_key(&self) -> Option<&RsaPublicKey> {
        match self {
            VerificationKey::PublicKey(key) => Some(key),
            VerificationKey::Certificate(certificate) => Some(certificate.public_key()),
            _ => None,
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationKey::Secret(_) => f.write_str("VerificationKey::Secret(<redacted>)"),
            VerificationKey::PublicKey(_) => f.write_str("VerificationKey::PublicKey"),
            VerificationKey::Certificate(certificate) => f
                .debug_tuple("VerificationKey::Certificate")
                .field(&certificate.serial())
                .finish(),
            VerificationKey::CertificateIndex(index) => f
                .debug_tuple("VerificationKey::CertificateIndex")
                .field(&index.len())
                .finish(),
            VerificationKey::EmbeddedCertificate(_) => {
                f.write_str("VerificationKey::EmbeddedCertificate")
            }
        }
    }
}

/// Parse an RSA private key from PEM (PKCS#8 or PKCS#1) or from bare base64
/// DER, the form gateway consoles hand out.
pub fn parse_private_key(text: &str) -> Result<RsaPrivateKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        return RsaPrivateKey::from_pkcs8_pem(text)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
            .map_err(|e| PaysignError::key_load("private key", e));
    }

    let der = decode_bare_base64(text).map_err(|e| PaysignError::key_load("private key", e))?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
        .map_err(|e| PaysignError::key_load("private key", e))
}

/// Parse an RSA public key from PEM (SPKI or PKCS#1) or bare base64 DER.
pub fn parse_public_key(text: &str) -> Result<RsaPublicKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(text)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(text))
            .map_err(|e| PaysignError::key_load("public key", e));
    }

    let der = decode_bare_base64(text).map_err(|e| PaysignError::key_load("public key", e))?;
    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|e| PaysignError::key_load("public key", e))
}

fn decode_bare_base64(text: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact)
}

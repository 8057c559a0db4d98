use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use rsa::pkcs8::DecodePublicKey;
use tracing::debug;
use x509_cert::der::asn1::{Any, Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::spki::ObjectIdentifier;

use crate::error::{PaysignError, Result};
use crate::signing::rsa::verify_pkcs1v15;

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// Longest issuer path walked from a leaf to a root.
const MAX_CHAIN_DEPTH: usize = 8;

/// A parsed X.509 certificate carrying an RSA public key.
///
/// The serial number is kept in decimal, the form gateways use for `certId`.
#[derive(Debug, Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    serial: String,
    public_key: RsaPublicKey,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| PaysignError::key_load("certificate", format!("invalid DER: {e}")))?;
        Self::from_x509(inner)
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = x509_cert::Certificate::from_pem(pem.trim().as_bytes())
            .map_err(|e| PaysignError::key_load("certificate", format!("invalid PEM: {e}")))?;
        Self::from_x509(inner)
    }

    /// Parse either PEM text or raw DER.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let trimmed = bytes.trim_ascii_start();
        if trimmed.starts_with(b"-----BEGIN") {
            let pem = std::str::from_utf8(trimmed)
                .map_err(|e| PaysignError::key_load("certificate", format!("invalid PEM: {e}")))?;
            Self::from_pem(pem)
        } else {
            Self::from_der(bytes)
        }
    }

    fn from_x509(inner: x509_cert::Certificate) -> Result<Self> {
        let der = inner
            .to_der()
            .map_err(|e| PaysignError::key_load("certificate", e))?;
        let spki = inner
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| PaysignError::key_load("certificate", e))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki).map_err(|e| {
            PaysignError::key_load("certificate", format!("unsupported public key: {e}"))
        })?;
        let serial =
            rsa::BigUint::from_bytes_be(inner.tbs_certificate.serial_number.as_bytes()).to_string();

        Ok(Self {
            inner,
            der,
            serial,
            public_key,
        })
    }

    /// Decimal serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn x509(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    pub fn common_name(&self) -> Option<String> {
        self.inner
            .tbs_certificate
            .subject
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|attribute| attribute.oid == COMMON_NAME)
            .and_then(|attribute| attribute_text(&attribute.value))
    }

    /// Organisation claim encoded in the subject common name.
    ///
    /// Gateway-issued signing certificates use `CN=<a>@<b>@<organisation>@<d>`;
    /// a name with fewer than three `@`-separated parts carries no claim.
    pub fn identity(&self) -> Option<String> {
        let common_name = self.common_name()?;
        common_name.split('@').nth(2).map(str::to_string)
    }

    pub fn not_before(&self) -> SystemTime {
        UNIX_EPOCH + self.inner.tbs_certificate.validity.not_before.to_unix_duration()
    }

    pub fn not_after(&self) -> SystemTime {
        UNIX_EPOCH + self.inner.tbs_certificate.validity.not_after.to_unix_duration()
    }

    pub fn is_valid_at(&self, at: SystemTime) -> bool {
        self.not_before() <= at && at <= self.not_after()
    }

    /// Whether `issuer` names and signed this certificate.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        let tbs = &self.inner.tbs_certificate;
        if tbs.issuer != issuer.inner.tbs_certificate.subject {
            return false;
        }
        let Ok(message) = tbs.to_der() else {
            return false;
        };
        let signature = self.inner.signature.raw_bytes();
        let public_key = issuer.public_key();

        let algorithm = self.inner.signature_algorithm.oid;
        if algorithm == SHA256_WITH_RSA {
            verify_pkcs1v15::<sha2::Sha256>(public_key, &message, signature)
        } else if algorithm == SHA1_WITH_RSA {
            verify_pkcs1v15::<sha1::Sha1>(public_key, &message, signature)
        } else if algorithm == SHA384_WITH_RSA {
            verify_pkcs1v15::<sha2::Sha384>(public_key, &message, signature)
        } else if algorithm == SHA512_WITH_RSA {
            verify_pkcs1v15::<sha2::Sha512>(public_key, &message, signature)
        } else {
            debug!(%algorithm, "unsupported certificate signature algorithm");
            false
        }
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

fn attribute_text(value: &Any) -> Option<String> {
    if let Ok(text) = value.decode_as::<Utf8StringRef<'_>>() {
        return Some(text.as_str().to_string());
    }
    if let Ok(text) = value.decode_as::<PrintableStringRef<'_>>() {
        return Some(text.as_str().to_string());
    }
    value
        .decode_as::<Ia5StringRef<'_>>()
        .ok()
        .map(|text| text.as_str().to_string())
}

/// Outcome of checking a certificate against a set of trust anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Trusted,
    /// The subject's organisation claim is not one of the expected names.
    IdentityMismatch(Option<String>),
    /// A certificate on the path is outside its validity window.
    Expired,
    /// No path to a trusted root.
    Untrusted,
}

impl ChainStatus {
    pub fn is_trusted(&self) -> bool {
        matches!(self, ChainStatus::Trusted)
    }
}

/// Roots, intermediates and the organisation names a leaf may claim.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    roots: Vec<Arc<Certificate>>,
    intermediates: Vec<Arc<Certificate>>,
    expected_identities: Vec<String>,
}

impl TrustAnchors {
    pub fn new(roots: impl IntoIterator<Item = Arc<Certificate>>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_intermediates(
        mut self,
        intermediates: impl IntoIterator<Item = Arc<Certificate>>,
    ) -> Self {
        self.intermediates.extend(intermediates);
        self
    }

    /// Restrict accepted leaves to these organisation claims.
    /// With no expected identities the claim is not checked.
    pub fn with_expected_identities<S: Into<String>>(
        mut self,
        identities: impl IntoIterator<Item = S>,
    ) -> Self {
        self.expected_identities
            .extend(identities.into_iter().map(Into::into));
        self
    }

    pub fn roots(&self) -> &[Arc<Certificate>] {
        &self.roots
    }

    pub fn check(&self, leaf: &Certificate) -> ChainStatus {
        self.check_at(leaf, SystemTime::now())
    }

    /// Identity, then validity window, then issuer path.
    pub fn check_at(&self, leaf: &Certificate, at: SystemTime) -> ChainStatus {
        match self.issuer_path_at(leaf, at) {
            Ok(_) => ChainStatus::Trusted,
            Err(status) => status,
        }
    }

    /// The intermediates and root that vouch for `leaf`, or the reason none do.
    pub(crate) fn issuer_path_at(
        &self,
        leaf: &Certificate,
        at: SystemTime,
    ) -> std::result::Result<Vec<Arc<Certificate>>, ChainStatus> {
        if !self.expected_identities.is_empty() {
            let identity = leaf.identity();
            let accepted = identity
                .as_deref()
                .is_some_and(|claim| self.expected_identities.iter().any(|name| name == claim));
            if !accepted {
                return Err(ChainStatus::IdentityMismatch(identity));
            }
        }

        if !leaf.is_valid_at(at) {
            return Err(ChainStatus::Expired);
        }

        let mut path = Vec::new();
        let mut current = leaf;
        for _ in 0..MAX_CHAIN_DEPTH {
            if let Some(root) = self.roots.iter().find(|root| current.is_issued_by(root)) {
                if !root.is_valid_at(at) {
                    return Err(ChainStatus::Expired);
                }
                path.push(Arc::clone(root));
                return Ok(path);
            }

            let Some(issuer) = self
                .intermediates
                .iter()
                .find(|candidate| candidate.der() != current.der() && current.is_issued_by(candidate))
            else {
                return Err(ChainStatus::Untrusted);
            };
            if !issuer.is_valid_at(at) {
                return Err(ChainStatus::Expired);
            }
            path.push(Arc::clone(issuer));
            current = &**issuer;
        }

        Err(ChainStatus::Untrusted)
    }

    /// Digest of the roots, intermediates and expected identities. Two anchor
    /// sets with the same fingerprint accept exactly the same leaves.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (tag, certificates) in [(b'R', &self.roots), (b'I', &self.intermediates)] {
            for certificate in certificates {
                hasher.update([tag]);
                hasher.update((certificate.der().len() as u64).to_be_bytes());
                hasher.update(certificate.der());
            }
        }
        for identity in &self.expected_identities {
            hasher.update([b'N']);
            hasher.update((identity.len() as u64).to_be_bytes());
            hasher.update(identity.as_bytes());
        }
        hasher.finalize().into()
    }
}

/// Validate encoded certificate bytes (PEM or DER) against `anchors`.
///
/// Returns `Ok(false)` on any chain, identity or expiry failure; errors only
/// when the bytes cannot be parsed as a certificate.
pub fn verify_certificate_chain(certificate: &[u8], anchors: &TrustAnchors) -> Result<bool> {
    let leaf = Certificate::parse(certificate)?;
    Ok(anchors.check(&leaf).is_trusted())
}

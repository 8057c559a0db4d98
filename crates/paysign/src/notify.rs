use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::canonical::{ParameterSet, canonicalize};
use crate::error::Result;
use crate::gateway::GatewayProfile;
use crate::keys::{ChainStatus, KeyMaterialStore, VerificationKey};
use crate::signing::{SchemeRegistry, SignatureSchemeId, default_registry};

/// Why a notification was not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrustedReason {
    MissingSignature,
    SchemeMismatch,
    CryptoVerificationFailed,
    CertificateUntrusted,
    CertificateExpired,
}

impl UntrustedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UntrustedReason::MissingSignature => "missing-signature",
            UntrustedReason::SchemeMismatch => "scheme-mismatch",
            UntrustedReason::CryptoVerificationFailed => "crypto-verification-failed",
            UntrustedReason::CertificateUntrusted => "certificate-untrusted",
            UntrustedReason::CertificateExpired => "certificate-expired",
        }
    }
}

impl fmt::Display for UntrustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of verifying a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The signature checked out; `fields` are the notification's fields
    /// without the signature.
    Trusted { fields: ParameterSet },
    Untrusted(UntrustedReason),
}

impl Verdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verdict::Trusted { .. })
    }

    pub fn reason(&self) -> Option<UntrustedReason> {
        match self {
            Verdict::Trusted { .. } => None,
            Verdict::Untrusted(reason) => Some(*reason),
        }
    }
}

/// Verifies signed notifications pushed by a gateway.
pub struct NotificationVerifier {
    registry: Option<Arc<SchemeRegistry>>,
    store: Arc<KeyMaterialStore>,
}

impl NotificationVerifier {
    pub fn new(store: Arc<KeyMaterialStore>) -> Self {
        Self {
            registry: None,
            store,
        }
    }

    pub fn with_registry(mut self, registry: Arc<SchemeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn registry(&self) -> &SchemeRegistry {
        self.registry.as_deref().unwrap_or_else(|| default_registry())
    }

    /// Verify `raw` against `scheme` and `key` under `profile`'s rules.
    ///
    /// Every failed check is a [`Verdict::Untrusted`] and is logged at warn.
    ///
    /// # Errors
    /// Only for malformed input: reserved keys other than the signature field,
    /// nested values the profile does not allow, an unparseable embedded
    /// certificate, or a scheme missing from the registry.
    pub fn verify(
        &self,
        raw: &ParameterSet,
        scheme: SignatureSchemeId,
        key: &VerificationKey,
        profile: &GatewayProfile,
    ) -> Result<Verdict> {
        let verdict = self.evaluate(raw, scheme, key, profile)?;
        match &verdict {
            Verdict::Trusted { .. } => {
                debug!(gateway = %profile.name, %scheme, "notification trusted");
            }
            Verdict::Untrusted(reason) => {
                warn!(gateway = %profile.name, %scheme, %reason, "notification untrusted");
            }
        }
        Ok(verdict)
    }

    fn evaluate(
        &self,
        raw: &ParameterSet,
        scheme: SignatureSchemeId,
        key: &VerificationKey,
        profile: &GatewayProfile,
    ) -> Result<Verdict> {
        let mut fields = raw.clone();
        let signature_text = fields
            .text(&profile.signature_field)
            .filter(|text| !text.trim().is_empty());
        fields.remove(&profile.signature_field);
        let Some(signature_text) = signature_text else {
            return Ok(Verdict::Untrusted(UntrustedReason::MissingSignature));
        };

        match profile.declared_scheme(&fields) {
            Ok(None) => {}
            Ok(Some(declared)) if declared == scheme => {}
            Ok(Some(_)) | Err(_) => return Ok(Verdict::Untrusted(UntrustedReason::SchemeMismatch)),
        }

        let resolved = match self.resolve_key(&fields, key, profile)? {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(Verdict::Untrusted(reason)),
        };

        let Some(signature) = profile.encoding(scheme).decode(&signature_text) else {
            return Ok(Verdict::Untrusted(UntrustedReason::CryptoVerificationFailed));
        };

        let mut signed_fields = fields.clone();
        for excluded in &profile.excluded_fields {
            signed_fields.remove(excluded);
        }
        let canonical = canonicalize(&signed_fields, &profile.options)?;
        let message = profile.message(&canonical, scheme);

        if self.registry().verify(&message, scheme, &signature, &resolved)? {
            Ok(Verdict::Trusted { fields })
        } else {
            Ok(Verdict::Untrusted(UntrustedReason::CryptoVerificationFailed))
        }
    }

    /// Turn certificate references into a concrete key. The inner `Err` is a
    /// trust failure, the outer one malformed input.
    fn resolve_key(
        &self,
        fields: &ParameterSet,
        key: &VerificationKey,
        profile: &GatewayProfile,
    ) -> Result<Result<VerificationKey, UntrustedReason>> {
        match key {
            VerificationKey::CertificateIndex(index) => {
                let certificate = profile
                    .certificate_id_field
                    .as_deref()
                    .and_then(|field| fields.text(field))
                    .and_then(|serial| index.get(&serial).cloned());
                let Some(certificate) = certificate else {
                    return Ok(Err(UntrustedReason::CertificateUntrusted));
                };
                if !certificate.is_valid_at(SystemTime::now()) {
                    return Ok(Err(UntrustedReason::CertificateExpired));
                }
                Ok(Ok(VerificationKey::Certificate(certificate)))
            }
            VerificationKey::EmbeddedCertificate(anchors) => {
                let encoded = profile
                    .embedded_certificate_field
                    .as_deref()
                    .and_then(|field| fields.text(field));
                let Some(encoded) = encoded else {
                    return Ok(Err(UntrustedReason::CertificateUntrusted));
                };
                let (certificate, status) =
                    self.store.resolve_embedded_certificate(&encoded, anchors)?;
                match status {
                    ChainStatus::Trusted => Ok(Ok(VerificationKey::Certificate(certificate))),
                    ChainStatus::Expired => Ok(Err(UntrustedReason::CertificateExpired)),
                    ChainStatus::IdentityMismatch(_) | ChainStatus::Untrusted => {
                        debug!(serial = certificate.serial(), ?status, "embedded certificate rejected");
                        Ok(Err(UntrustedReason::CertificateUntrusted))
                    }
                }
            }
            VerificationKey::Certificate(certificate) => {
                if certificate.is_valid_at(SystemTime::now()) {
                    Ok(Ok(key.clone()))
                } else {
                    Ok(Err(UntrustedReason::CertificateExpired))
                }
            }
            VerificationKey::Secret(_) | VerificationKey::PublicKey(_) => Ok(Ok(key.clone())),
        }
    }
}

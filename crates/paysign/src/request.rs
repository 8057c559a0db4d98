use std::sync::Arc;

use tracing::debug;

use crate::canonical::{ParameterSet, canonicalize};
use crate::error::{PaysignError, Result};
use crate::gateway::GatewayProfile;
use crate::keys::SigningKey;
use crate::signing::{SchemeRegistry, SignatureSchemeId, default_registry};

/// Signs outbound requests.
///
/// 1. Copies the caller's parameters.
/// 2. Fills in the scheme code and certificate serial the gateway expects.
/// 3. Canonicalizes, signs, and appends the encoded signature.
#[derive(Clone, Default)]
pub struct RequestSigner {
    registry: Option<Arc<SchemeRegistry>>,
}

impl RequestSigner {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    fn registry(&self) -> &SchemeRegistry {
        self.registry.as_deref().unwrap_or_else(|| default_registry())
    }

    /// Return a signed copy of `params`; `params` itself is left untouched.
    ///
    /// # Errors
    /// [`PaysignError::Validation`] if `params` already carries a signature or
    /// declares a different scheme, [`PaysignError::UnsupportedScheme`] if the
    /// profile has no code for `scheme`, [`PaysignError::Signing`] if the key
    /// does not fit the scheme.
    pub fn attach_signature(
        &self,
        params: &ParameterSet,
        scheme: SignatureSchemeId,
        key: &SigningKey,
        profile: &GatewayProfile,
    ) -> Result<ParameterSet> {
        if let Some(reserved) = params.reserved_key() {
            return Err(PaysignError::Validation(format!(
                "request already carries `{reserved}`"
            )));
        }

        let mut signed = params.clone();
        self.declare_scheme(&mut signed, scheme, profile)?;

        if let (Some(field), Some(cert_id)) =
            (profile.certificate_id_field.as_deref(), key.certificate_id())
        {
            if !signed.contains_key(field) {
                signed.insert(field, cert_id);
            }
        }

        let canonical = canonicalize(&signed, &profile.options)?;
        let message = profile.message(&canonical, scheme);
        let signature = self.registry().sign(&message, scheme, key)?;

        debug!(gateway = %profile.name, %scheme, fields = signed.len(), "signed request");
        signed.insert(
            profile.signature_field.as_str(),
            profile.encoding(scheme).encode(&signature),
        );
        Ok(signed)
    }

    fn declare_scheme(
        &self,
        params: &mut ParameterSet,
        scheme: SignatureSchemeId,
        profile: &GatewayProfile,
    ) -> Result<()> {
        let Some(field) = profile.scheme_field.as_deref() else {
            return Ok(());
        };

        if params.contains_key(field) {
            let declared = profile.declared_scheme(params)?;
            if declared != Some(scheme) {
                return Err(PaysignError::Validation(format!(
                    "`{field}` declares a scheme other than {scheme}"
                )));
            }
            return Ok(());
        }

        let version = profile.version(params);
        let code = profile
            .scheme_code(scheme, version.as_deref())
            .ok_or_else(|| PaysignError::UnsupportedScheme(format!("{scheme} for {}", profile.name)))?;
        params.insert(field, code);
        Ok(())
    }
}

//! Per-gateway signing contracts.
//!
//! A [`GatewayProfile`] records everything that differs between gateways
//! once the canonical string is built: where the signature lives, how the
//! scheme is declared, which fields stay out of a notification's canonical
//! string, and how signature bytes are written as text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::canonical::{ArrayPolicy, CanonicalString, CanonicalizationOptions, ParameterSet};
use crate::error::{PaysignError, Result};
use crate::signing::{SignatureEncoding, SignatureSchemeId};

/// Gateways with a built-in [`GatewayProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Alipay,
    Wechat,
    Unionpay,
}

impl Gateway {
    pub fn profile(&self) -> GatewayProfile {
        match self {
            Gateway::Alipay => GatewayProfile::alipay(),
            Gateway::Wechat => GatewayProfile::wechat(),
            Gateway::Unionpay => GatewayProfile::unionpay(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Alipay => "alipay",
            Gateway::Wechat => "wechat",
            Gateway::Unionpay => "unionpay",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = PaysignError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "alipay" => Ok(Gateway::Alipay),
            "wechat" | "wx" => Ok(Gateway::Wechat),
            "unionpay" | "union" => Ok(Gateway::Unionpay),
            _ => Err(PaysignError::Config(format!("unknown gateway `{name}`"))),
        }
    }
}

/// What the signature scheme is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageForm {
    /// The canonical string itself.
    Canonical,
    /// Lower-case hex of the canonical string's digest (SHA-1 for RSA,
    /// SHA-256 for RSA2). Symmetric schemes still sign the canonical string.
    HexDigest,
}

/// Maps a gateway's scheme code to a scheme, optionally only for one
/// protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeCode {
    pub code: String,
    pub scheme: SignatureSchemeId,
    pub version: Option<String>,
}

impl SchemeCode {
    pub fn new(code: impl Into<String>, scheme: SignatureSchemeId) -> Self {
        Self {
            code: code.into(),
            scheme,
            version: None,
        }
    }

    pub fn for_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GatewayProfile {
    pub name: String,
    pub signature_field: String,
    pub scheme_field: Option<String>,
    pub version_field: Option<String>,
    pub scheme_codes: Vec<SchemeCode>,
    /// Removed from a notification before canonicalization, besides the
    /// signature field.
    pub excluded_fields: Vec<String>,
    pub options: CanonicalizationOptions,
    pub symmetric_encoding: SignatureEncoding,
    pub asymmetric_encoding: SignatureEncoding,
    pub message_form: MessageForm,
    /// Carries the serial of the certificate that made the signature.
    pub certificate_id_field: Option<String>,
    /// Carries the signer's PEM certificate inside the message.
    pub embedded_certificate_field: Option<String>,
}

impl GatewayProfile {
    /// A bare profile: signature in `signature_field`, scheme codes equal to
    /// scheme names, default canonicalization.
    pub fn new(name: impl Into<String>, signature_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature_field: signature_field.into(),
            scheme_field: None,
            version_field: None,
            scheme_codes: SignatureSchemeId::ALL
                .into_iter()
                .map(|id| SchemeCode::new(id.as_str(), id))
                .collect(),
            excluded_fields: Vec::new(),
            options: CanonicalizationOptions::default(),
            symmetric_encoding: SignatureEncoding::LowerHex,
            asymmetric_encoding: SignatureEncoding::Base64,
            message_form: MessageForm::Canonical,
            certificate_id_field: None,
            embedded_certificate_field: None,
        }
    }

    /// Alipay: `sign` / `sign_type`, base64 RSA signatures over the
    /// URL-decoded canonical string.
    pub fn alipay() -> Self {
        Self {
            scheme_field: Some("sign_type".into()),
            scheme_codes: vec![
                SchemeCode::new("RSA", SignatureSchemeId::Rsa),
                SchemeCode::new("RSA2", SignatureSchemeId::Rsa2),
            ],
            excluded_fields: vec!["sign_type".into()],
            options: CanonicalizationOptions::new()
                .with_array_policy(ArrayPolicy::Skip)
                .url_decoded(),
            ..Self::new(Gateway::Alipay.as_str(), "sign")
        }
    }

    /// WeChat Pay: `sign` / `sign_type`, upper-case hex digests. `sign_type`
    /// is itself signed.
    pub fn wechat() -> Self {
        Self {
            scheme_field: Some("sign_type".into()),
            scheme_codes: vec![
                SchemeCode::new("MD5", SignatureSchemeId::Md5),
                SchemeCode::new("HMAC-SHA256", SignatureSchemeId::HmacSha256),
            ],
            options: CanonicalizationOptions::new()
                .with_array_policy(ArrayPolicy::Skip)
                .url_decoded(),
            symmetric_encoding: SignatureEncoding::UpperHex,
            ..Self::new(Gateway::Wechat.as_str(), "sign")
        }
    }

    /// UnionPay: `signature` / `signMethod`. Method `01` means RSA on 5.0.0
    /// and RSA2 on 5.1.0; `11` is the secure-key digest.
    pub fn unionpay() -> Self {
        Self {
            scheme_field: Some("signMethod".into()),
            version_field: Some("version".into()),
            scheme_codes: vec![
                SchemeCode::new("01", SignatureSchemeId::Rsa).for_version("5.0.0"),
                SchemeCode::new("01", SignatureSchemeId::Rsa2).for_version("5.1.0"),
                SchemeCode::new("11", SignatureSchemeId::SecureKey),
            ],
            options: CanonicalizationOptions::new().with_array_policy(ArrayPolicy::Skip),
            symmetric_encoding: SignatureEncoding::LowerHex,
            asymmetric_encoding: SignatureEncoding::Base64,
            message_form: MessageForm::HexDigest,
            certificate_id_field: Some("certId".into()),
            embedded_certificate_field: Some("signPubKeyCert".into()),
            ..Self::new(Gateway::Unionpay.as_str(), "signature")
        }
    }

    pub fn with_options(mut self, options: CanonicalizationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn encoding(&self, scheme: SignatureSchemeId) -> SignatureEncoding {
        if scheme.is_symmetric() {
            self.symmetric_encoding
        } else {
            self.asymmetric_encoding
        }
    }

    /// Gateway code for `scheme`, given the message's protocol version.
    pub fn scheme_code(&self, scheme: SignatureSchemeId, version: Option<&str>) -> Option<&str> {
        self.scheme_codes
            .iter()
            .find(|entry| entry.scheme == scheme && version_matches(entry, version))
            .map(|entry| entry.code.as_str())
    }

    /// Scheme declared by `params` in the scheme field, if the profile has one
    /// and the field is set.
    ///
    /// # Errors
    /// [`PaysignError::UnsupportedScheme`] when the declared code has no
    /// mapping for the message's version.
    pub fn declared_scheme(&self, params: &ParameterSet) -> Result<Option<SignatureSchemeId>> {
        let Some(code) = self.scheme_field.as_deref().and_then(|field| params.text(field)) else {
            return Ok(None);
        };
        let version = self.version(params);
        self.scheme_codes
            .iter()
            .find(|entry| entry.code == code && version_matches(entry, version.as_deref()))
            .map(|entry| Some(entry.scheme))
            .ok_or_else(|| PaysignError::UnsupportedScheme(code))
    }

    pub(crate) fn version(&self, params: &ParameterSet) -> Option<String> {
        self.version_field
            .as_deref()
            .and_then(|field| params.text(field))
    }

    /// Bytes handed to the signature scheme for this canonical string.
    pub fn message(&self, canonical: &CanonicalString, scheme: SignatureSchemeId) -> Vec<u8> {
        match (self.message_form, scheme) {
            (MessageForm::HexDigest, SignatureSchemeId::Rsa) => {
                hex::encode(Sha1::digest(canonical.as_bytes())).into_bytes()
            }
            (MessageForm::HexDigest, SignatureSchemeId::Rsa2) => {
                hex::encode(Sha256::digest(canonical.as_bytes())).into_bytes()
            }
            _ => canonical.as_bytes().to_vec(),
        }
    }
}

fn version_matches(entry: &SchemeCode, version: Option<&str>) -> bool {
    match (&entry.version, version) {
        (None, _) => true,
        (Some(expected), Some(actual)) => expected == actual,
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;

    #[test]
    fn unionpay_method_01_depends_on_version() {
        let profile = GatewayProfile::unionpay();
        let v500 = ParameterSet::new().with("signMethod", "01").with("version", "5.0.0");
        let v510 = ParameterSet::new().with("signMethod", "01").with("version", "5.1.0");
        let secure = ParameterSet::new().with("signMethod", "11").with("version", "5.1.0");

        assert_eq!(profile.declared_scheme(&v500).unwrap(), Some(SignatureSchemeId::Rsa));
        assert_eq!(profile.declared_scheme(&v510).unwrap(), Some(SignatureSchemeId::Rsa2));
        assert_eq!(
            profile.declared_scheme(&secure).unwrap(),
            Some(SignatureSchemeId::SecureKey)
        );
    }

    #[test]
    fn unionpay_sm3_is_unsupported() {
        let params = ParameterSet::new().with("signMethod", "12").with("version", "5.1.0");
        assert!(matches!(
            GatewayProfile::unionpay().declared_scheme(&params),
            Err(PaysignError::UnsupportedScheme(code)) if code == "12"
        ));
    }

    #[test]
    fn undeclared_scheme_is_none() {
        let params = ParameterSet::new().with("appid", "2017");
        assert_eq!(GatewayProfile::alipay().declared_scheme(&params).unwrap(), None);
    }

    #[test]
    fn scheme_codes_round_trip() {
        let union = GatewayProfile::unionpay();
        assert_eq!(union.scheme_code(SignatureSchemeId::Rsa2, Some("5.1.0")), Some("01"));
        assert_eq!(union.scheme_code(SignatureSchemeId::Rsa2, Some("5.0.0")), None);
        assert_eq!(union.scheme_code(SignatureSchemeId::SecureKey, None), Some("11"));
        assert_eq!(
            GatewayProfile::wechat().scheme_code(SignatureSchemeId::HmacSha256, None),
            Some("HMAC-SHA256")
        );
        assert_eq!(GatewayProfile::alipay().scheme_code(SignatureSchemeId::Md5, None), None);
    }

    #[test]
    fn hex_digest_message_form() {
        let canonical = canonicalize(
            &ParameterSet::new().with("a", "1"),
            &CanonicalizationOptions::new(),
        )
        .unwrap();
        let profile = GatewayProfile::unionpay();

        let rsa = profile.message(&canonical, SignatureSchemeId::Rsa);
        assert_eq!(rsa, hex::encode(Sha1::digest(b"a=1")).into_bytes());
        let rsa2 = profile.message(&canonical, SignatureSchemeId::Rsa2);
        assert_eq!(rsa2.len(), 64);
        assert_eq!(profile.message(&canonical, SignatureSchemeId::SecureKey), b"a=1");
        assert_eq!(
            GatewayProfile::alipay().message(&canonical, SignatureSchemeId::Rsa2),
            b"a=1"
        );
    }

    #[test]
    fn gateway_names() {
        assert_eq!("WX".parse::<Gateway>().unwrap(), Gateway::Wechat);
        assert_eq!("unionpay".parse::<Gateway>().unwrap().profile().signature_field, "signature");
        assert!(matches!("paypal".parse::<Gateway>(), Err(PaysignError::Config(_))));
    }

    #[test]
    fn encodings_per_scheme() {
        let union = GatewayProfile::unionpay();
        assert_eq!(union.encoding(SignatureSchemeId::Rsa), SignatureEncoding::Base64);
        assert_eq!(union.encoding(SignatureSchemeId::SecureKey), SignatureEncoding::LowerHex);
        assert_eq!(
            GatewayProfile::wechat().encoding(SignatureSchemeId::Md5),
            SignatureEncoding::UpperHex
        );
    }
}

//! Per-gateway key material configuration, loaded from TOML.
//!
//! ```toml
//! [wechat]
//! sign_type = "HMAC-SHA256"
//! key = "..."
//!
//! [unionpay]
//! sign_cert_path = "certs/acp_test_sign.pfx"
//! sign_cert_password = "000000"
//! root_cert_path = "certs/acp_test_root.cer"
//! middle_cert_path = "certs/acp_test_middle.cer"
//! use_sandbox = true
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PaysignError, Result};
use crate::gateway::Gateway;
use crate::keys::{KeyMaterialStore, SigningKey, VerificationKey, parse_public_key};
use crate::signing::SignatureSchemeId;

/// Organisation claim carried by production UnionPay signing certificates.
pub const UNIONPAY_IDENTITY: &str = "中国银联股份有限公司";
/// Additional claim accepted in the UnionPay sandbox.
pub const UNIONPAY_SANDBOX_IDENTITY: &str = "00040000:SIGN";

/// UnionPay protocol version whose notifications name a directory certificate.
pub const UNIONPAY_VERSION_CERT_ID: &str = "5.0.0";
/// UnionPay protocol version whose notifications embed their certificate.
pub const UNIONPAY_VERSION_EMBEDDED: &str = "5.1.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaysignConfig {
    pub alipay: Option<AlipayConfig>,
    pub wechat: Option<WechatConfig>,
    pub unionpay: Option<UnionpayConfig>,
}

impl PaysignConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PaysignError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&contents).map_err(|e| match e {
            PaysignError::Config(reason) => {
                PaysignError::Config(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| PaysignError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(alipay) = &self.alipay {
            if alipay.sign_type.is_symmetric() {
                return Err(PaysignError::Config(format!(
                    "alipay.sign_type must be RSA or RSA2, not {}",
                    alipay.sign_type
                )));
            }
        }
        if let Some(wechat) = &self.wechat {
            if !matches!(
                wechat.sign_type,
                SignatureSchemeId::Md5 | SignatureSchemeId::HmacSha256
            ) {
                return Err(PaysignError::Config(format!(
                    "wechat.sign_type must be MD5 or HMAC-SHA256, not {}",
                    wechat.sign_type
                )));
            }
        }
        Ok(())
    }

    /// Scheme the gateway is configured to sign with.
    pub fn default_scheme(&self, gateway: Gateway) -> Result<SignatureSchemeId> {
        match gateway {
            Gateway::Alipay => Ok(self.alipay()?.sign_type),
            Gateway::Wechat => Ok(self.wechat()?.sign_type),
            Gateway::Unionpay => Ok(SignatureSchemeId::Rsa2),
        }
    }

    pub fn signing_key(
        &self,
        gateway: Gateway,
        scheme: SignatureSchemeId,
        store: &KeyMaterialStore,
    ) -> Result<SigningKey> {
        match gateway {
            Gateway::Alipay => self.alipay()?.signing_key(store),
            Gateway::Wechat => Ok(self.wechat()?.key()),
            Gateway::Unionpay => self.unionpay()?.signing_key(scheme, store),
        }
    }

    /// Key for checking a notification. UnionPay picks its key by protocol
    /// `version` when the scheme is certificate based.
    pub fn verification_key(
        &self,
        gateway: Gateway,
        scheme: SignatureSchemeId,
        version: Option<&str>,
        store: &KeyMaterialStore,
    ) -> Result<VerificationKey> {
        match gateway {
            Gateway::Alipay => self.alipay()?.verification_key(),
            Gateway::Wechat => Ok(VerificationKey::secret(&self.wechat()?.key)),
            Gateway::Unionpay => self.unionpay()?.verification_key(scheme, version, store),
        }
    }

    fn alipay(&self) -> Result<&AlipayConfig> {
        self.alipay
            .as_ref()
            .ok_or_else(|| PaysignError::Config("missing [alipay] section".into()))
    }

    fn wechat(&self) -> Result<&WechatConfig> {
        self.wechat
            .as_ref()
            .ok_or_else(|| PaysignError::Config("missing [wechat] section".into()))
    }

    fn unionpay(&self) -> Result<&UnionpayConfig> {
        self.unionpay
            .as_ref()
            .ok_or_else(|| PaysignError::Config("missing [unionpay] section".into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlipayConfig {
    #[serde(default = "default_alipay_scheme")]
    pub sign_type: SignatureSchemeId,
    /// Merchant private key (PKCS#1 or PKCS#8 PEM, or bare base64).
    pub private_key_path: Option<PathBuf>,
    /// Alipay public key as distributed: PEM or bare base64.
    pub public_key: Option<String>,
}

fn default_alipay_scheme() -> SignatureSchemeId {
    SignatureSchemeId::Rsa2
}

impl AlipayConfig {
    pub fn signing_key(&self, store: &KeyMaterialStore) -> Result<SigningKey> {
        let path = self
            .private_key_path
            .as_ref()
            .ok_or_else(|| PaysignError::Config("alipay.private_key_path is not set".into()))?;
        Ok(SigningKey::Rsa(store.load_private_key(path)?))
    }

    pub fn verification_key(&self) -> Result<VerificationKey> {
        let text = self
            .public_key
            .as_deref()
            .ok_or_else(|| PaysignError::Config("alipay.public_key is not set".into()))?;
        Ok(VerificationKey::PublicKey(parse_public_key(text)?))
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WechatConfig {
    #[serde(default = "default_wechat_scheme")]
    pub sign_type: SignatureSchemeId,
    pub key: String,
}

fn default_wechat_scheme() -> SignatureSchemeId {
    SignatureSchemeId::Md5
}

impl WechatConfig {
    pub fn key(&self) -> SigningKey {
        SigningKey::secret(&self.key)
    }
}

impl std::fmt::Debug for WechatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatConfig")
            .field("sign_type", &self.sign_type)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionpayConfig {
    /// PKCS#12 container with the merchant signing key.
    pub sign_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub sign_cert_password: String,
    /// Directory of verification certificates, looked up by `certId`.
    pub verify_cert_dir: Option<PathBuf>,
    pub root_cert_path: Option<PathBuf>,
    pub middle_cert_path: Option<PathBuf>,
    pub secure_key: Option<String>,
    #[serde(default)]
    pub use_sandbox: bool,
    #[serde(default = "default_unionpay_identity")]
    pub expected_identity: String,
}

fn default_unionpay_identity() -> String {
    UNIONPAY_IDENTITY.to_string()
}

impl UnionpayConfig {
    pub fn expected_identities(&self) -> Vec<String> {
        let mut identities = vec![self.expected_identity.clone()];
        if self.use_sandbox {
            identities.push(UNIONPAY_SANDBOX_IDENTITY.to_string());
        }
        identities
    }

    pub fn signing_key(
        &self,
        scheme: SignatureSchemeId,
        store: &KeyMaterialStore,
    ) -> Result<SigningKey> {
        if scheme == SignatureSchemeId::SecureKey {
            return Ok(SigningKey::secret(self.secure_key()?));
        }
        let path = self
            .sign_cert_path
            .as_ref()
            .ok_or_else(|| PaysignError::Config("unionpay.sign_cert_path is not set".into()))?;
        Ok(SigningKey::Bundle(
            store.load_signing_bundle(path, &self.sign_cert_password)?,
        ))
    }

    pub fn verification_key(
        &self,
        scheme: SignatureSchemeId,
        version: Option<&str>,
        store: &KeyMaterialStore,
    ) -> Result<VerificationKey> {
        if scheme == SignatureSchemeId::SecureKey {
            return Ok(VerificationKey::secret(self.secure_key()?));
        }

        match version {
            Some(UNIONPAY_VERSION_CERT_ID) => {
                let directory = self.verify_cert_dir.as_ref().ok_or_else(|| {
                    PaysignError::Config("unionpay.verify_cert_dir is not set".into())
                })?;
                Ok(VerificationKey::CertificateIndex(
                    store.load_verification_certificates(directory)?,
                ))
            }
            Some(UNIONPAY_VERSION_EMBEDDED) | None => {
                let (Some(root), Some(middle)) = (&self.root_cert_path, &self.middle_cert_path)
                else {
                    return Err(PaysignError::Config(
                        "unionpay.root_cert_path and unionpay.middle_cert_path are required".into(),
                    ));
                };
                let anchors = store.load_trust_anchors(root, middle, self.expected_identities())?;
                Ok(VerificationKey::EmbeddedCertificate(Arc::new(anchors)))
            }
            Some(other) => Err(PaysignError::Config(format!(
                "unsupported unionpay version {other}"
            ))),
        }
    }

    fn secure_key(&self) -> Result<&str> {
        self.secure_key
            .as_deref()
            .ok_or_else(|| PaysignError::Config("unionpay.secure_key is not set".into()))
    }
}

impl std::fmt::Debug for UnionpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnionpayConfig")
            .field("sign_cert_path", &self.sign_cert_path)
            .field("verify_cert_dir", &self.verify_cert_dir)
            .field("root_cert_path", &self.root_cert_path)
            .field("middle_cert_path", &self.middle_cert_path)
            .field("use_sandbox", &self.use_sandbox)
            .field("expected_identity", &self.expected_identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let config = PaysignConfig::from_toml(
            r#"
            [alipay]
            sign_type = "RSA"
            private_key_path = "keys/app.pem"

            [wechat]
            sign_type = "HMAC-SHA256"
            key = "secret"

            [unionpay]
            sign_cert_path = "certs/sign.pfx"
            sign_cert_password = "000000"
            use_sandbox = true
            "#,
        )
        .unwrap();

        assert_eq!(config.default_scheme(Gateway::Alipay).unwrap(), SignatureSchemeId::Rsa);
        assert_eq!(
            config.default_scheme(Gateway::Wechat).unwrap(),
            SignatureSchemeId::HmacSha256
        );
        let unionpay = config.unionpay.as_ref().unwrap();
        assert_eq!(
            unionpay.expected_identities(),
            vec![UNIONPAY_IDENTITY.to_string(), UNIONPAY_SANDBOX_IDENTITY.to_string()]
        );
    }

    #[test]
    fn defaults() {
        let config = PaysignConfig::from_toml("[wechat]\nkey = \"k\"\n[unionpay]\n").unwrap();
        assert_eq!(config.wechat.as_ref().unwrap().sign_type, SignatureSchemeId::Md5);
        assert_eq!(
            config.unionpay.as_ref().unwrap().expected_identities(),
            vec![UNIONPAY_IDENTITY.to_string()]
        );
    }

    #[test]
    fn rejects_symmetric_alipay_scheme() {
        let error = PaysignConfig::from_toml("[alipay]\nsign_type = \"MD5\"\n").unwrap_err();
        assert!(matches!(error, PaysignError::Config(_)));
    }

    #[test]
    fn rejects_unknown_scheme_code() {
        let error = PaysignConfig::from_toml("[wechat]\nsign_type = \"SM3\"\nkey = \"k\"\n")
            .unwrap_err();
        assert!(matches!(error, PaysignError::Config(_)));
    }

    #[test]
    fn missing_section_is_config_error() {
        let config = PaysignConfig::default();
        let store = KeyMaterialStore::new();
        assert!(matches!(
            config.signing_key(Gateway::Wechat, SignatureSchemeId::Md5, &store),
            Err(PaysignError::Config(_))
        ));
    }

    #[test]
    fn unionpay_secure_key_needs_no_files() {
        let config = PaysignConfig::from_toml("[unionpay]\nsecure_key = \"k\"\n").unwrap();
        let store = KeyMaterialStore::new();
        let key = config
            .verification_key(Gateway::Unionpay, SignatureSchemeId::SecureKey, None, &store)
            .unwrap();
        assert!(matches!(key, VerificationKey::Secret(secret) if secret == b"k"));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = PaysignConfig::from_toml(
            "[wechat]\nkey = \"hunter2\"\n[unionpay]\nsecure_key = \"hunter3\"\nsign_cert_password = \"hunter4\"\n",
        )
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter"));
    }
}

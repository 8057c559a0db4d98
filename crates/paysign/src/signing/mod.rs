mod digest;
mod encoding;
pub(crate) mod rsa;
mod scheme;

pub use digest::{HmacSha256Scheme, Md5Scheme, SecureKeyScheme};
pub use encoding::SignatureEncoding;
pub use scheme::{SchemeRegistry, SignatureScheme, SignatureSchemeId};
pub use self::rsa::RsaPkcs1v15;

use std::sync::OnceLock;

use crate::canonical::CanonicalString;
use crate::error::Result;
use crate::keys::{SigningKey, VerificationKey};

/// Registry holding every built-in scheme, shared by the free functions.
pub fn default_registry() -> &'static SchemeRegistry {
    static REGISTRY: OnceLock<SchemeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SchemeRegistry::with_defaults)
}

/// Sign a canonical string with a built-in scheme.
pub fn sign(canonical: &CanonicalString, scheme: SignatureSchemeId, key: &SigningKey) -> Result<Vec<u8>> {
    default_registry().sign(canonical.as_bytes(), scheme, key)
}

/// Check raw signature bytes over a canonical string with a built-in scheme.
pub fn verify(
    canonical: &CanonicalString,
    scheme: SignatureSchemeId,
    signature: &[u8],
    key: &VerificationKey,
) -> Result<bool> {
    default_registry().verify(canonical.as_bytes(), scheme, signature, key)
}

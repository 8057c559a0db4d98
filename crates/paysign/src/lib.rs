pub mod canonical;
pub mod config;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod notify;
pub mod request;
pub mod signing;

pub use canonical::{
    ArrayPolicy, CanonicalString, CanonicalizationOptions, ParameterSet, canonicalize,
};
pub use config::PaysignConfig;
pub use error::{PaysignError, Result};
pub use gateway::{Gateway, GatewayProfile, MessageForm};
pub use keys::{
    Certificate, CertificateBundle, CertificateIndex, KeyMaterialStore, SigningKey, TrustAnchors,
    VerificationKey, verify_certificate_chain,
};
pub use notify::{NotificationVerifier, UntrustedReason, Verdict};
pub use request::RequestSigner;
pub use signing::{SchemeRegistry, SignatureEncoding, SignatureScheme, SignatureSchemeId, sign, verify};

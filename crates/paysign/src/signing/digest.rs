use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::scheme::{SignatureScheme, SignatureSchemeId};
use crate::error::{PaysignError, Result};
use crate::keys::{SigningKey, VerificationKey};

type HmacSha256 = Hmac<Sha256>;

fn signing_secret(id: SignatureSchemeId, key: &SigningKey) -> Result<&[u8]> {
    match key {
        SigningKey::Secret(secret) => Ok(secret),
        _ => Err(PaysignError::Signing(format!("{id} requires a shared secret"))),
    }
}

fn verification_secret(key: &VerificationKey) -> Option<&[u8]> {
    match key {
        VerificationKey::Secret(secret) => Some(secret),
        _ => None,
    }
}

/// `MD5(message + "&key=" + secret)`.
pub struct Md5Scheme;

impl Md5Scheme {
    fn digest(message: &[u8], secret: &[u8]) -> Vec<u8> {
        Md5::new()
            .chain_update(message)
            .chain_update(b"&key=")
            .chain_update(secret)
            .finalize()
            .to_vec()
    }
}

impl SignatureScheme for Md5Scheme {
    fn id(&self) -> SignatureSchemeId {
        SignatureSchemeId::Md5
    }

    fn sign(&self, message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
        let secret = signing_secret(self.id(), key)?;
        Ok(Self::digest(message, secret))
    }

    fn verify(&self, message: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        verification_secret(key)
            .is_some_and(|secret| bool::from(Self::digest(message, secret).ct_eq(signature)))
    }
}

/// HMAC-SHA256 over the message, keyed with the secret.
pub struct HmacSha256Scheme;

impl HmacSha256Scheme {
    fn mac(secret: &[u8]) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(secret).map_err(|e| PaysignError::Signing(e.to_string()))
    }
}

impl SignatureScheme for HmacSha256Scheme {
    fn id(&self) -> SignatureSchemeId {
        SignatureSchemeId::HmacSha256
    }

    fn sign(&self, message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
        let mut mac = Self::mac(signing_secret(self.id(), key)?)?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        let Some(Ok(mut mac)) = verification_secret(key).map(Self::mac) else {
            return false;
        };
        mac.update(message);
        mac.verify_slice(signature).is_ok()
    }
}

/// `SHA256(message + "&" + hex(SHA256(secret)))`.
pub struct SecureKeyScheme;

impl SecureKeyScheme {
    fn digest(message: &[u8], secret: &[u8]) -> Vec<u8> {
        let hashed_secret = hex::encode(Sha256::digest(secret));
        Sha256::new()
            .chain_update(message)
            .chain_update(b"&")
            .chain_update(hashed_secret.as_bytes())
            .finalize()
            .to_vec()
    }
}

impl SignatureScheme for SecureKeyScheme {
    fn id(&self) -> SignatureSchemeId {
        SignatureSchemeId::SecureKey
    }

    fn sign(&self, message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
        let secret = signing_secret(self.id(), key)?;
        Ok(Self::digest(message, secret))
    }

    fn verify(&self, message: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        verification_secret(key)
            .is_some_and(|secret| bool::from(Self::digest(message, secret).ct_eq(signature)))
    }
}

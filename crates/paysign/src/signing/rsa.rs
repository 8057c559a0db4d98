use std::marker::PhantomData;

use rsa::pkcs1v15::{Pkcs1v15Sign, SigningKey as Pkcs1v15SigningKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPublicKey;
use rsa::pkcs8::AssociatedOid;
use sha2::Digest;

use super::scheme::{SignatureScheme, SignatureSchemeId};
use crate::error::{PaysignError, Result};
use crate::keys::{SigningKey, VerificationKey};

/// RSA PKCS#1 v1.5 signatures over digest `D`.
pub struct RsaPkcs1v15<D> {
    id: SignatureSchemeId,
    digest: PhantomData<fn() -> D>,
}

impl<D> RsaPkcs1v15<D> {
    pub fn new(id: SignatureSchemeId) -> Self {
        Self {
            id,
            digest: PhantomData,
        }
    }
}

impl<D> SignatureScheme for RsaPkcs1v15<D>
where
    D: Digest + AssociatedOid,
{
    fn id(&self) -> SignatureSchemeId {
        self.id
    }

    fn sign(&self, message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
        let private_key = key
            .rsa_private_key()
            .ok_or_else(|| PaysignError::Signing(format!("{} requires an RSA private key", self.id)))?;
        let signing_key = Pkcs1v15SigningKey::<D>::new(private_key.clone());
        let signature = signing_key
            .try_sign(message)
            .map_err(|e| PaysignError::Signing(format!("{}: {e}", self.id)))?;
        Ok(signature.to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        key.rsa_public_key()
            .is_some_and(|public_key| verify_pkcs1v15::<D>(public_key, message, signature))
    }
}

/// Check a PKCS#1 v1.5 signature over `message` hashed with `D`.
pub(crate) fn verify_pkcs1v15<D>(public_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool
where
    D: Digest + AssociatedOid,
{
    let hashed = D::digest(message);
    public_key
        .verify(Pkcs1v15Sign::new::<D>(), &hashed, signature)
        .is_ok()
}

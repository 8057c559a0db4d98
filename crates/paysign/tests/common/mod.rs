#![allow(dead_code)]

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::UtcTime;
use x509_cert::der::{Encode, EncodePem};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

use paysign::Certificate;

pub const KEY_BITS: usize = 1024;
pub const TEST_IDENTITY: &str = "CUP TEST";

/// RSA key derived deterministically from `seed`.
pub fn rsa_key(seed: &str) -> RsaPrivateKey {
    let hash = Sha256::digest(seed.as_bytes());
    let mut rng = ChaCha20Rng::from_seed(hash.into());
    RsaPrivateKey::new(&mut rng, KEY_BITS).unwrap()
}

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub fn current_validity() -> Validity {
    validity_days(365)
}

/// Valid from now for `days` days.
pub fn validity_days(days: u32) -> Validity {
    Validity::from_now(DAY * days).unwrap()
}

/// 2000-01-01 to 2001-01-01.
pub fn expired_validity() -> Validity {
    Validity {
        not_before: utc(946_684_800),
        not_after: utc(978_307_200),
    }
}

fn utc(unix_seconds: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(unix_seconds)).unwrap())
}

fn mint(
    profile: Profile,
    serial: u32,
    validity: Validity,
    subject: &str,
    subject_key: &RsaPublicKey,
    issuer_key: &RsaPrivateKey,
) -> Certificate {
    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(issuer_key.clone());
    let spki = SubjectPublicKeyInfoOwned::from_key(subject_key.clone()).unwrap();
    let builder = CertificateBuilder::new(
        profile,
        SerialNumber::from(serial),
        validity,
        Name::from_str(subject).unwrap(),
        spki,
        &signer,
    )
    .unwrap();
    let certificate = builder.build::<rsa::pkcs1v15::Signature>().unwrap();
    Certificate::from_der(&certificate.to_der().unwrap()).unwrap()
}

/// Root, intermediate and leaf certificates with their keys.
pub struct Pki {
    pub root: Certificate,
    pub middle: Certificate,
    pub middle_key: RsaPrivateKey,
    pub leaf: Certificate,
    pub leaf_key: RsaPrivateKey,
}

impl Pki {
    /// Issue another leaf from this PKI's intermediate.
    pub fn issue_leaf(
        &self,
        serial: u32,
        common_name: &str,
        validity: Validity,
        key: &RsaPrivateKey,
    ) -> Certificate {
        issue_leaf(&self.middle, &self.middle_key, serial, common_name, validity, key)
    }
}

fn issue_leaf(
    middle: &Certificate,
    middle_key: &RsaPrivateKey,
    serial: u32,
    common_name: &str,
    validity: Validity,
    key: &RsaPrivateKey,
) -> Certificate {
    mint(
        Profile::Leaf {
            issuer: middle.x509().tbs_certificate.subject.clone(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        serial,
        validity,
        &format!("CN={common_name},O=Paysign Test"),
        &key.to_public_key(),
        middle_key,
    )
}

pub fn leaf_common_name(identity: &str) -> String {
    format!("shanghai@00040000@{identity}@00000001")
}

/// A three-level PKI named after `label`; keys derive from the label.
pub fn build_pki(label: &str, serial_base: u32) -> Pki {
    let root_key = rsa_key(&format!("{label}-root"));
    let middle_key = rsa_key(&format!("{label}-middle"));
    let leaf_key = rsa_key(&format!("{label}-leaf"));

    let root_subject = format!("CN={label} Root,O=Paysign Test");
    let middle_subject = format!("CN={label} Middle,O=Paysign Test");

    let root = mint(
        Profile::Root,
        serial_base,
        current_validity(),
        &root_subject,
        &root_key.to_public_key(),
        &root_key,
    );
    let middle = mint(
        Profile::SubCA {
            issuer: Name::from_str(&root_subject).unwrap(),
            path_len_constraint: Some(0),
        },
        serial_base + 1,
        current_validity(),
        &middle_subject,
        &middle_key.to_public_key(),
        &root_key,
    );
    let leaf = issue_leaf(
        &middle,
        &middle_key,
        serial_base + 2,
        &leaf_common_name(TEST_IDENTITY),
        current_validity(),
        &leaf_key,
    );

    Pki {
        root,
        middle,
        middle_key,
        leaf,
        leaf_key,
    }
}

/// PKI shared by every test in one test binary.
pub fn shared_pki() -> &'static Pki {
    static PKI: OnceLock<Pki> = OnceLock::new();
    PKI.get_or_init(|| build_pki("Trusted", 1000))
}

pub fn pem(certificate: &Certificate) -> String {
    certificate.x509().to_pem(LineEnding::LF).unwrap()
}

/// PKCS#12 container holding `key` and `certificate`.
pub fn pfx(certificate: &Certificate, key: &RsaPrivateKey, password: &str) -> Vec<u8> {
    let key_der = key.to_pkcs8_der().unwrap();
    p12::PFX::new(certificate.der(), key_der.as_bytes(), None, password, "paysign")
        .unwrap()
        .to_der()
}

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use dashmap::DashMap;
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use tracing::{debug, info, warn};

use super::certificate::{Certificate, ChainStatus, TrustAnchors};
use super::parse_private_key;
use crate::error::{PaysignError, Result};

/// File extensions scanned when indexing a verification certificate directory.
const CERTIFICATE_EXTENSIONS: [&str; 4] = ["cer", "crt", "pem", "der"];

/// A private key, its issuing certificate and the certificate serial (`certId`)
/// that identifies the key to the counterparty.
#[derive(Clone)]
pub struct CertificateBundle {
    private_key: Arc<RsaPrivateKey>,
    certificate: Arc<Certificate>,
}

impl CertificateBundle {
    pub fn private_key(&self) -> &Arc<RsaPrivateKey> {
        &self.private_key
    }

    pub fn certificate(&self) -> &Arc<Certificate> {
        &self.certificate
    }

    pub fn cert_id(&self) -> &str {
        self.certificate.serial()
    }
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("cert_id", &self.cert_id())
            .finish_non_exhaustive()
    }
}

/// Verification certificates keyed by decimal serial number.
#[derive(Debug, Clone, Default)]
pub struct CertificateIndex {
    by_serial: HashMap<String, Arc<Certificate>>,
}

impl CertificateIndex {
    pub fn get(&self, serial: &str) -> Option<&Arc<Certificate>> {
        self.by_serial.get(serial)
    }

    pub fn len(&self) -> usize {
        self.by_serial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_serial.is_empty()
    }

    pub fn serials(&self) -> impl Iterator<Item = &str> {
        self.by_serial.keys().map(String::as_str)
    }
}

impl FromIterator<Certificate> for CertificateIndex {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        Self {
            by_serial: iter
                .into_iter()
                .map(|certificate| (certificate.serial().to_string(), Arc::new(certificate)))
                .collect(),
        }
    }
}

/// Memoizes fallible loads: at most one load per key runs at a time, readers
/// only ever see fully built values, and failures are not remembered.
struct Memo<K, V> {
    loaded: DashMap<K, Arc<V>>,
    gates: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone, V> Memo<K, V> {
    fn new() -> Self {
        Self {
            loaded: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.loaded.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_try_load(&self, key: &K, load: impl FnOnce() -> Result<V>) -> Result<Arc<V>> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let gate = Arc::clone(self.gates.entry(key.clone()).or_default().value());
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = Arc::new(load()?);
        self.loaded.insert(key.clone(), Arc::clone(&value));
        Ok(value)
    }
}

/// Loads and caches private keys, certificates and certificate indexes.
///
/// Every successful load is kept for the lifetime of the store, keyed by
/// source path; failed loads are retried on the next call. Share one store
/// per process behind an `Arc`; tests build their own.
pub struct KeyMaterialStore {
    signing_bundles: Memo<PathBuf, CertificateBundle>,
    certificate_dirs: Memo<PathBuf, CertificateIndex>,
    certificates: Memo<PathBuf, Certificate>,
    private_keys: Memo<PathBuf, RsaPrivateKey>,
    embedded: DashMap<(AnchorFingerprint, String), Arc<TrustedChain>>,
}

type AnchorFingerprint = [u8; 32];

/// An embedded certificate that passed the chain check, with the issuers that
/// vouched for it.
struct TrustedChain {
    leaf: Arc<Certificate>,
    issuers: Vec<Arc<Certificate>>,
}

impl TrustedChain {
    fn is_valid_at(&self, at: SystemTime) -> bool {
        self.leaf.is_valid_at(at) && self.issuers.iter().all(|issuer| issuer.is_valid_at(at))
    }
}

impl Default for KeyMaterialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMaterialStore {
    pub fn new() -> Self {
        Self {
            signing_bundles: Memo::new(),
            certificate_dirs: Memo::new(),
            certificates: Memo::new(),
            private_keys: Memo::new(),
            embedded: DashMap::new(),
        }
    }

    /// Load a PKCS#12 container holding a signing key and its certificate.
    ///
    /// # Errors
    /// [`PaysignError::KeyLoad`] when the file is unreadable, the passphrase is
    /// wrong, or the container holds no usable RSA key and matching certificate.
    pub fn load_signing_bundle(
        &self,
        path: impl AsRef<Path>,
        passphrase: &str,
    ) -> Result<Arc<CertificateBundle>> {
        let path = path.as_ref();
        self.signing_bundles.get_or_try_load(&path.to_path_buf(), || {
            let bundle = read_pkcs12(path, passphrase)?;
            info!(path = %path.display(), cert_id = bundle.cert_id(), "loaded signing bundle");
            Ok(bundle)
        })
    }

    /// Index every parseable certificate in `directory` by serial number.
    ///
    /// Unparseable files are skipped with a warning; an unreadable directory
    /// is an error.
    pub fn load_verification_certificates(
        &self,
        directory: impl AsRef<Path>,
    ) -> Result<Arc<CertificateIndex>> {
        let directory = directory.as_ref();
        self.certificate_dirs
            .get_or_try_load(&directory.to_path_buf(), || {
                let index = read_certificate_dir(directory)?;
                info!(
                    directory = %directory.display(),
                    certificates = index.len(),
                    "indexed verification certificates"
                );
                Ok(index)
            })
    }

    /// Load a single PEM or DER certificate file.
    pub fn load_certificate(&self, path: impl AsRef<Path>) -> Result<Arc<Certificate>> {
        let path = path.as_ref();
        self.certificates.get_or_try_load(&path.to_path_buf(), || {
            let bytes = fs::read(path).map_err(|e| PaysignError::key_load_at(path, e))?;
            let certificate =
                Certificate::parse(&bytes).map_err(|e| PaysignError::key_load_at(path, e))?;
            debug!(path = %path.display(), serial = certificate.serial(), "loaded certificate");
            Ok(certificate)
        })
    }

    /// Load an RSA private key file (PKCS#8 or PKCS#1, PEM or bare base64).
    pub fn load_private_key(&self, path: impl AsRef<Path>) -> Result<Arc<RsaPrivateKey>> {
        let path = path.as_ref();
        self.private_keys.get_or_try_load(&path.to_path_buf(), || {
            let text = fs::read_to_string(path).map_err(|e| PaysignError::key_load_at(path, e))?;
            let key = parse_private_key(&text).map_err(|e| PaysignError::key_load_at(path, e))?;
            debug!(path = %path.display(), "loaded private key");
            Ok(key)
        })
    }

    /// Build trust anchors from a root and an intermediate certificate file.
    pub fn load_trust_anchors<S: Into<String>>(
        &self,
        root_path: impl AsRef<Path>,
        intermediate_path: impl AsRef<Path>,
        expected_identities: impl IntoIterator<Item = S>,
    ) -> Result<TrustAnchors> {
        let root = self.load_certificate(root_path)?;
        let intermediate = self.load_certificate(intermediate_path)?;
        Ok(TrustAnchors::new([root])
            .with_intermediates([intermediate])
            .with_expected_identities(expected_identities))
    }

    /// Resolve a certificate embedded in a message (PEM text) against `anchors`.
    ///
    /// Chains that passed the full check are cached per anchor set, keyed by
    /// the encoded text. A cache hit re-checks the validity window of the leaf
    /// and every issuer on its path.
    ///
    /// # Errors
    /// [`PaysignError::KeyLoad`] only when the text is not a certificate.
    pub fn resolve_embedded_certificate(
        &self,
        encoded: &str,
        anchors: &TrustAnchors,
    ) -> Result<(Arc<Certificate>, ChainStatus)> {
        self.resolve_embedded_certificate_at(encoded, anchors, SystemTime::now())
    }

    /// [`Self::resolve_embedded_certificate`] with validity judged at `now`.
    pub fn resolve_embedded_certificate_at(
        &self,
        encoded: &str,
        anchors: &TrustAnchors,
        now: SystemTime,
    ) -> Result<(Arc<Certificate>, ChainStatus)> {
        let key = (anchors.fingerprint(), encoded.to_string());
        if let Some(cached) = self.embedded.get(&key).map(|entry| Arc::clone(entry.value())) {
            let status = if cached.is_valid_at(now) {
                ChainStatus::Trusted
            } else {
                ChainStatus::Expired
            };
            debug!(serial = cached.leaf.serial(), ?status, "embedded certificate cache hit");
            return Ok((Arc::clone(&cached.leaf), status));
        }

        let certificate = Arc::new(Certificate::parse(encoded.as_bytes())?);
        match anchors.issuer_path_at(&certificate, now) {
            Ok(issuers) => {
                let chain = TrustedChain {
                    leaf: Arc::clone(&certificate),
                    issuers,
                };
                self.embedded.insert(key, Arc::new(chain));
                Ok((certificate, ChainStatus::Trusted))
            }
            Err(status) => Ok((certificate, status)),
        }
    }

    /// Number of embedded certificates cached so far.
    pub fn embedded_certificate_count(&self) -> usize {
        self.embedded.len()
    }

    /// Signing bundle already loaded from `path`, without touching the filesystem.
    pub fn cached_signing_bundle(&self, path: impl AsRef<Path>) -> Option<Arc<CertificateBundle>> {
        self.signing_bundles.get(&path.as_ref().to_path_buf())
    }
}

fn read_pkcs12(path: &Path, passphrase: &str) -> Result<CertificateBundle> {
    let data = fs::read(path).map_err(|e| PaysignError::key_load_at(path, e))?;
    let pfx = p12::PFX::parse(&data).map_err(|e| {
        PaysignError::key_load_at(path, format!("unparseable PKCS#12 container: {e:?}"))
    })?;
    if !pfx.verify_mac(passphrase) {
        return Err(PaysignError::key_load_at(
            path,
            "wrong passphrase or corrupted container",
        ));
    }

    let key_bags = pfx
        .key_bags(passphrase)
        .map_err(|e| PaysignError::key_load_at(path, format!("cannot decrypt key: {e:?}")))?;
    let key_der = key_bags
        .first()
        .ok_or_else(|| PaysignError::key_load_at(path, "container holds no private key"))?;
    let private_key = RsaPrivateKey::from_pkcs8_der(key_der)
        .map_err(|e| PaysignError::key_load_at(path, format!("unsupported private key: {e}")))?;

    let public_key = private_key.to_public_key();
    let certificate = pfx
        .cert_x509_bags(passphrase)
        .map_err(|e| PaysignError::key_load_at(path, format!("cannot read certificates: {e:?}")))?
        .iter()
        .filter_map(|der| Certificate::from_der(der).ok())
        .find(|certificate| *certificate.public_key() == public_key)
        .ok_or_else(|| {
            PaysignError::key_load_at(path, "no certificate matches the private key")
        })?;

    Ok(CertificateBundle {
        private_key: Arc::new(private_key),
        certificate: Arc::new(certificate),
    })
}

fn read_certificate_dir(directory: &Path) -> Result<CertificateIndex> {
    let entries = fs::read_dir(directory).map_err(|e| PaysignError::key_load_at(directory, e))?;

    let mut certificates = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let has_certificate_extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                CERTIFICATE_EXTENSIONS
                    .iter()
                    .any(|known| extension.eq_ignore_ascii_case(known))
            });
        if !path.is_file() || !has_certificate_extension {
            continue;
        }

        let parsed = fs::read(&path)
            .map_err(|e| PaysignError::key_load_at(&path, e))
            .and_then(|bytes| Certificate::parse(&bytes));
        match parsed {
            Ok(certificate) => certificates.push(certificate),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping certificate file"),
        }
    }

    Ok(certificates.into_iter().collect())
}

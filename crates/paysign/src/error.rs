use std::path::Path;

/// Errors raised by the canonicalization and signing core.
///
/// A signature that simply fails to match is not an error; it is reported
/// as [`Verdict::Untrusted`](crate::notify::Verdict::Untrusted).
#[derive(Debug, thiserror::Error)]
pub enum PaysignError {
    #[error("invalid parameters: {0}")]
    Validation(String),
    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(String),
    #[error("failed to load key material from {source_name}: {reason}")]
    KeyLoad { source_name: String, reason: String },
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PaysignError {
    pub(crate) fn key_load(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::KeyLoad {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn key_load_at(path: &Path, reason: impl ToString) -> Self {
        Self::key_load(path.display().to_string(), reason)
    }
}

pub type Result<T, E = PaysignError> = std::result::Result<T, E>;

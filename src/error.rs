//! Error taxonomy shared by the catalog store, cookie codec, query engine,
//! client cache and playback queue.

use thiserror::Error;

/// Errors produced by the catalog layer.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed cookie text. Caller error, always recoverable by the caller.
    #[error("Bad cookie: {0}")]
    BadCookie(String),

    /// Well-formed reference to an entity that is absent from this snapshot.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    /// Snapshot written by a newer build. Fatal for this snapshot.
    #[error("Unsupported format version {found} (supported up to {supported})")]
    FormatVersion { found: u16, supported: u16 },

    /// Snapshot framing violated (bad marker, count/complement mismatch,
    /// truncated data). Fatal for this snapshot.
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// Category insertion with a name that is already taken.
    #[error("Duplicate category name: {0:?}")]
    DuplicateName(String),

    /// Collection media type differs from the title set's established one.
    #[error("Title set {title} holds {expected} collections, rejected {got}")]
    MediaTypeMismatch {
        title: u16,
        expected: crate::catalog::MediaType,
        got: crate::catalog::MediaType,
    },

    /// The catalog behind the engine has not finished loading. Clients should
    /// retry shortly; this is not "does not exist".
    #[error("Catalog loading not yet complete")]
    LoadingNotComplete,

    /// A cache poll or engine query could not reach its source. Logged and
    /// retried on the next poll cycle.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A table consumed all 65535 local IDs of this snapshot. Local IDs are
    /// never reused, so the only recovery is a fresh snapshot.
    #[error("{0} table exhausted its local id space")]
    IdSpaceExhausted(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Short machine-readable code, stable across message rewording.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::BadCookie(_) => "bad_cookie",
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::FormatVersion { .. } => "format_version",
            CatalogError::Corrupt(_) => "corrupt",
            CatalogError::DuplicateName(_) => "duplicate_name",
            CatalogError::MediaTypeMismatch { .. } => "media_type_mismatch",
            CatalogError::LoadingNotComplete => "loading_not_complete",
            CatalogError::SourceUnavailable(_) => "source_unavailable",
            CatalogError::IdSpaceExhausted(_) => "id_space_exhausted",
            CatalogError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

//! Per-row failures.
//!
//! Every variant is fatal to the row it occurred on and to nothing else: the
//! import driver logs it with the row number and identity key, counts it, and
//! moves on to the next row.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row could not be read: {0}")]
    Malformed(String),

    #[error("identity number is missing")]
    MissingIdentity,

    #[error("identity number {0:?} fails checksum validation")]
    InvalidChecksum(String),

    #[error("identity number {nin:?} has length {len}, expected {expected}")]
    InvalidLength {
        nin: String,
        len: usize,
        expected: usize,
    },

    #[error("unknown region: LGA {0:?} not found in the location hierarchy")]
    UnknownRegion(String),

    #[error("no unknown-village placeholder configured for LGA {lga:?} (id {lga_id})")]
    MissingPlaceholder { lga: String, lga_id: i64 },

    #[error("photo payload is not valid base64: {0}")]
    InvalidPhoto(#[from] base64::DecodeError),

    #[error("identity number {0:?} cannot be used as a photo file name")]
    UnsafePhotoName(String),

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl RowError {
    /// Short machine-friendly reason, used in summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            RowError::Malformed(_) => "malformed",
            RowError::MissingIdentity => "missing_identity",
            RowError::InvalidChecksum(_) => "invalid_checksum",
            RowError::InvalidLength { .. } => "invalid_length",
            RowError::UnknownRegion(_) => "unknown_region",
            RowError::MissingPlaceholder { .. } => "missing_placeholder",
            RowError::InvalidPhoto(_) => "invalid_photo",
            RowError::UnsafePhotoName(_) => "unsafe_photo_name",
            RowError::Persistence(_) => "persistence",
        }
    }
}

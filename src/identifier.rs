//! Mapping between dataset identifiers and RBD image names.
//!
//! Images created by this driver are named `flocker-<uuid>`. Anything else in
//! the pool belongs to someone else and must be left alone.

use thiserror::Error;
use uuid::Uuid;

/// Prefix marking an image as managed by this driver.
pub const BLOCKDEVICE_ID_PREFIX: &str = "flocker-";

/// Errors raised while decoding a block device identifier.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdentifierError {
    /// The identifier does not carry the managed prefix.
    #[error("block device {blockdevice_id} is not managed by this driver")]
    ExternalIdentifier {
        /// Identifier that was rejected.
        blockdevice_id: String,
    },
    /// The identifier carries the prefix but the remainder is not a lowercase
    /// hyphenated UUID.
    #[error("block device {blockdevice_id} has a malformed dataset id: {message}")]
    MalformedDatasetId {
        /// Identifier that was rejected.
        blockdevice_id: String,
        /// Parser error message.
        message: String,
    },
}

/// Returns the image name used for `dataset_id`.
#[must_use]
pub fn blockdevice_id(dataset_id: Uuid) -> String {
    format!("{BLOCKDEVICE_ID_PREFIX}{}", dataset_id.hyphenated())
}

/// Recovers the dataset identifier from an image name.
///
/// # Errors
///
/// Returns [`IdentifierError::ExternalIdentifier`] when the prefix is missing
/// and [`IdentifierError::MalformedDatasetId`] when the remainder is not the
/// exact spelling [`blockdevice_id`] produces.
pub fn dataset_id(blockdevice_id: &str) -> Result<Uuid, IdentifierError> {
    let Some(rest) = blockdevice_id.strip_prefix(BLOCKDEVICE_ID_PREFIX) else {
        return Err(IdentifierError::ExternalIdentifier {
            blockdevice_id: blockdevice_id.to_owned(),
        });
    };
    let malformed = |message: String| IdentifierError::MalformedDatasetId {
        blockdevice_id: blockdevice_id.to_owned(),
        message,
    };
    let uuid = Uuid::parse_str(rest).map_err(|err| malformed(err.to_string()))?;
    // Uppercase, simple, braced and URN spellings parse too but do not round-trip.
    if uuid.hyphenated().to_string() != rest {
        return Err(malformed(format!("{rest} is not a lowercase hyphenated uuid")));
    }
    Ok(uuid)
}

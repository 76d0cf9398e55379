//! Pool-wide image catalog: the authority on whether a volume exists.

use std::collections::BTreeSet;

use tracing::info;

use super::{ClusterError, PoolContext};
use crate::blockdevice::BlockDeviceError;
use crate::command::ParseError;

/// Image operations against one open pool, translated into driver errors.
#[derive(Debug)]
pub struct ImageCatalog<'a, P: PoolContext> {
    pool: &'a P,
}

impl<'a, P: PoolContext> ImageCatalog<'a, P> {
    /// Wraps an open pool context.
    #[must_use]
    pub const fn new(pool: &'a P) -> Self {
        Self { pool }
    }

    /// Returns every image name in the pool.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::Parse`] when the listing is unreadable and
    /// [`BlockDeviceError::Cluster`] when it fails otherwise.
    pub fn list(&self) -> Result<BTreeSet<String>, BlockDeviceError> {
        let images = self.pool.list_images().map_err(lift)?;
        Ok(images.into_iter().collect())
    }

    /// Fails with [`BlockDeviceError::UnknownVolume`] unless the image exists.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnknownVolume`] when the image is absent.
    pub fn exists_or_fail(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError> {
        if self.list()?.contains(blockdevice_id) {
            return Ok(());
        }
        Err(BlockDeviceError::UnknownVolume {
            blockdevice_id: blockdevice_id.to_owned(),
        })
    }

    /// Creates an image of exactly `size_bytes`.
    ///
    /// The existence check and the create are separate calls; the cluster's
    /// own create is the final arbiter when two hosts race.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::ImageExists`] when the name is taken.
    pub fn create(&self, blockdevice_id: &str, size_bytes: u64) -> Result<(), BlockDeviceError> {
        if self.list()?.contains(blockdevice_id) {
            return Err(BlockDeviceError::ImageExists {
                blockdevice_id: blockdevice_id.to_owned(),
            });
        }
        self.pool
            .create_image(blockdevice_id, size_bytes)
            .map_err(|err| translate(err, blockdevice_id))?;
        info!(blockdevice_id, size_bytes, "created image");
        Ok(())
    }

    /// Removes an image.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnknownVolume`] when the image is absent.
    pub fn remove(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError> {
        self.pool
            .remove_image(blockdevice_id)
            .map_err(|err| translate(err, blockdevice_id))?;
        info!(blockdevice_id, "removed image");
        Ok(())
    }

    /// Returns the provisioned size of an image in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnknownVolume`] when the image is absent.
    pub fn stat(&self, blockdevice_id: &str) -> Result<u64, BlockDeviceError> {
        self.pool
            .image_size(blockdevice_id)
            .map_err(|err| translate(err, blockdevice_id))
    }
}

fn translate(err: ClusterError, blockdevice_id: &str) -> BlockDeviceError {
    match err {
        ClusterError::ImageNotFound { .. } => BlockDeviceError::UnknownVolume {
            blockdevice_id: blockdevice_id.to_owned(),
        },
        ClusterError::ImageExists { .. } => BlockDeviceError::ImageExists {
            blockdevice_id: blockdevice_id.to_owned(),
        },
        other => lift(other),
    }
}

fn lift(err: ClusterError) -> BlockDeviceError {
    match err {
        ClusterError::Parse { resource, message } => {
            BlockDeviceError::Parse(ParseError::new(resource, message))
        }
        other => BlockDeviceError::Cluster(other),
    }
}

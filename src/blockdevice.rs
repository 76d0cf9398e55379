//! The block-device capability consumed by the volume orchestrator.

use camino::Utf8PathBuf;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cluster::ClusterError;
use crate::command::{CommandError, ParseError};
use crate::config::ConfigError;
use crate::identifier::IdentifierError;

/// Granularity, in bytes, in which the cluster allocates image capacity.
pub const ALLOCATION_UNIT: u64 = 1_048_576;

/// A volume as reported to the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BlockDeviceVolume {
    /// Image name inside the pool.
    pub blockdevice_id: String,
    /// Provisioned size in bytes.
    pub size: u64,
    /// Instance holding the volume, if attached.
    pub attached_to: Option<String>,
    /// Orchestrator dataset the volume backs.
    pub dataset_id: Uuid,
}

/// Errors surfaced by block-device operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlockDeviceError {
    /// The volume is not in the pool's catalog.
    #[error("unknown volume {blockdevice_id}")]
    UnknownVolume {
        /// Volume that was requested.
        blockdevice_id: String,
    },
    /// A volume with this identifier already exists.
    #[error("volume {blockdevice_id} already exists")]
    ImageExists {
        /// Volume that was requested.
        blockdevice_id: String,
    },
    /// The volume is already attached somewhere in the cluster.
    #[error("volume {blockdevice_id} is already attached")]
    AlreadyAttachedVolume {
        /// Volume that was requested.
        blockdevice_id: String,
    },
    /// The volume has no mapping on this host.
    #[error("volume {blockdevice_id} is not attached to this host")]
    UnattachedVolume {
        /// Volume that was requested.
        blockdevice_id: String,
    },
    /// The identifier was not produced by this driver or is malformed.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Connection, pool or catalog failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// Tool output could not be interpreted, including unreadable catalog
    /// listings and image metadata. A pool lookup that cannot be read while
    /// connecting surfaces as [`BlockDeviceError::Cluster`].
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A host tool could not be started or exited non-zero.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The driver configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Operations a storage driver offers the orchestrator.
pub trait BlockDeviceApi {
    /// Returns the allocation granularity in bytes.
    fn allocation_unit(&self) -> u64;

    /// Returns the identity of this host.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError`] when the identity cannot be determined.
    fn compute_instance_id(&self) -> Result<String, BlockDeviceError>;

    /// Creates an unattached volume for `dataset_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::ImageExists`] when the dataset already has
    /// a volume.
    fn create_volume(&self, dataset_id: Uuid, size: u64)
    -> Result<BlockDeviceVolume, BlockDeviceError>;

    /// Destroys a volume.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnknownVolume`] when it does not exist.
    fn destroy_volume(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError>;

    /// Attaches a volume to `attach_to`. Returns `None` without side effects
    /// when `attach_to` is not this host.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::AlreadyAttachedVolume`] when the volume is
    /// in use anywhere and [`BlockDeviceError::UnknownVolume`] when it does
    /// not exist.
    fn attach_volume(
        &self,
        blockdevice_id: &str,
        attach_to: &str,
    ) -> Result<Option<BlockDeviceVolume>, BlockDeviceError>;

    /// Detaches a volume from this host; detaching an unmapped volume is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnknownVolume`] when it does not exist.
    fn detach_volume(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError>;

    /// Lists every volume managed by this driver.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError`] when the catalog or mappings cannot be
    /// read.
    fn list_volumes(&self) -> Result<Vec<BlockDeviceVolume>, BlockDeviceError>;

    /// Returns the local device path of an attached volume.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::UnattachedVolume`] when it is not mapped
    /// on this host.
    fn get_device_path(&self, blockdevice_id: &str) -> Result<Utf8PathBuf, BlockDeviceError>;
}

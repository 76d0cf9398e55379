//! Volume lifecycle on top of an RBD pool.
//!
//! Attachment state is never stored. Each call re-derives it from the pool
//! catalog, this host's `rbd showmapped` table and the image watchers.
//!
//! Nothing here is atomic across hosts. Two hosts racing to attach the same
//! volume can both pass the watcher check before either maps it; the
//! orchestrator is expected to serialise attaches per volume.

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blockdevice::{ALLOCATION_UNIT, BlockDeviceApi, BlockDeviceError, BlockDeviceVolume};
use crate::cluster::{
    ClusterClient, ClusterConnector, ClusterSession, ImageCatalog, RbdCliClient, RbdCliConnector,
};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::DriverConfig;
use crate::identifier::{self, IdentifierError};
use crate::instance;
use crate::mapping::LocalMapRegistry;
use crate::watchers;

/// Outcome of [`CephRbdBlockDeviceApi::destroy_all_volumes`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SweepSummary {
    /// Volumes unmapped from this host before removal.
    pub unmapped: usize,
    /// Volumes removed from the pool.
    pub destroyed: usize,
}

/// Block-device driver backed by one RBD pool.
#[derive(Debug)]
pub struct CephRbdBlockDeviceApi<C: ClusterClient, R: CommandRunner> {
    session: ClusterSession<C>,
    runner: R,
    rbd_bin: String,
    hostname_bin: String,
}

/// The driver as wired for production use.
pub type ProcessBlockDeviceApi =
    CephRbdBlockDeviceApi<RbdCliClient<ProcessCommandRunner>, ProcessCommandRunner>;

impl<C: ClusterClient, R: CommandRunner> CephRbdBlockDeviceApi<C, R> {
    /// Wraps an open session.
    #[must_use]
    pub fn new(
        session: ClusterSession<C>,
        runner: R,
        rbd_bin: impl Into<String>,
        hostname_bin: impl Into<String>,
    ) -> Self {
        Self {
            session,
            runner,
            rbd_bin: rbd_bin.into(),
            hostname_bin: hostname_bin.into(),
        }
    }

    /// Validates `config`, connects through `connector` and opens the pool.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::Config`] for an invalid configuration and
    /// [`BlockDeviceError::Cluster`] when the session cannot be opened.
    pub fn from_config<K>(
        config: &DriverConfig,
        connector: &K,
        runner: R,
    ) -> Result<Self, BlockDeviceError>
    where
        K: ClusterConnector<Client = C>,
    {
        config.validate()?;
        let session = ClusterSession::open(connector, &config.settings())?;
        Ok(Self::new(
            session,
            runner,
            &config.rbd_bin,
            &config.hostname_bin,
        ))
    }

    /// Name of the pool holding this driver's images.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        self.session.pool_name()
    }

    /// Closes the cluster session.
    pub fn close(self) {
        self.session.close();
    }

    const fn catalog(&self) -> ImageCatalog<'_, C::Pool> {
        ImageCatalog::new(self.session.pool())
    }

    fn mappings(&self) -> LocalMapRegistry<'_, R> {
        LocalMapRegistry::new(&self.runner, &self.rbd_bin, self.session.pool_name())
    }

    /// Unmaps and destroys every volume this driver manages. Images that do
    /// not carry the managed prefix are left alone.
    ///
    /// # Errors
    ///
    /// Stops at the first failure and returns it.
    pub fn destroy_all_volumes(&self) -> Result<SweepSummary, BlockDeviceError> {
        let volumes = self.list_volumes()?;
        let mut summary = SweepSummary::default();
        for volume in &volumes {
            if volume.attached_to.is_some() {
                self.mappings().unmap(&volume.blockdevice_id)?;
                summary.unmapped += 1;
            }
            self.destroy_volume(&volume.blockdevice_id)?;
            summary.destroyed += 1;
        }
        info!(
            unmapped = summary.unmapped,
            destroyed = summary.destroyed,
            "swept managed volumes"
        );
        Ok(summary)
    }
}

impl ProcessBlockDeviceApi {
    /// Connects using the `ceph`/`rbd` tools on this host.
    ///
    /// # Errors
    ///
    /// See [`CephRbdBlockDeviceApi::from_config`].
    pub fn connect(config: &DriverConfig) -> Result<Self, BlockDeviceError> {
        let connector =
            RbdCliConnector::new(ProcessCommandRunner, &config.ceph_bin, &config.rbd_bin);
        Self::from_config(config, &connector, ProcessCommandRunner)
    }
}

impl<C: ClusterClient, R: CommandRunner> BlockDeviceApi for CephRbdBlockDeviceApi<C, R> {
    fn allocation_unit(&self) -> u64 {
        ALLOCATION_UNIT
    }

    fn compute_instance_id(&self) -> Result<String, BlockDeviceError> {
        instance::compute_instance_id(&self.runner, &self.hostname_bin)
    }

    fn create_volume(
        &self,
        dataset_id: Uuid,
        size: u64,
    ) -> Result<BlockDeviceVolume, BlockDeviceError> {
        let blockdevice_id = identifier::blockdevice_id(dataset_id);
        self.catalog().create(&blockdevice_id, size)?;
        Ok(BlockDeviceVolume {
            blockdevice_id,
            size,
            attached_to: None,
            dataset_id,
        })
    }

    fn destroy_volume(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError> {
        let catalog = self.catalog();
        catalog.exists_or_fail(blockdevice_id)?;
        catalog.remove(blockdevice_id)
    }

    fn attach_volume(
        &self,
        blockdevice_id: &str,
        attach_to: &str,
    ) -> Result<Option<BlockDeviceVolume>, BlockDeviceError> {
        let catalog = self.catalog();
        catalog.exists_or_fail(blockdevice_id)?;
        if watchers::has_active_watcher(&self.runner, &self.rbd_bin, blockdevice_id)? {
            return Err(BlockDeviceError::AlreadyAttachedVolume {
                blockdevice_id: blockdevice_id.to_owned(),
            });
        }

        let instance_id = self.compute_instance_id()?;
        if attach_to != instance_id {
            warn!(
                blockdevice_id,
                attach_to,
                instance_id = %instance_id,
                "not attaching volume: target is not this host"
            );
            return Ok(None);
        }

        let dataset_id = identifier::dataset_id(blockdevice_id)?;
        self.mappings().map(blockdevice_id)?;
        let size = catalog.stat(blockdevice_id)?;
        Ok(Some(BlockDeviceVolume {
            blockdevice_id: blockdevice_id.to_owned(),
            size,
            attached_to: Some(attach_to.to_owned()),
            dataset_id,
        }))
    }

    fn detach_volume(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError> {
        self.catalog().exists_or_fail(blockdevice_id)?;
        let mappings = self.mappings();
        if !mappings.is_mapped(blockdevice_id)? {
            info!(blockdevice_id, "volume already detached");
            return Ok(());
        }
        mappings.unmap(blockdevice_id)
    }

    fn list_volumes(&self) -> Result<Vec<BlockDeviceVolume>, BlockDeviceError> {
        let catalog = self.catalog();
        let images = catalog.list()?;
        let mapped = self.mappings().list_mappings()?;
        let mut instance_id = None;
        let mut volumes = Vec::new();

        for image in images {
            let dataset_id = match identifier::dataset_id(&image) {
                Ok(dataset_id) => dataset_id,
                Err(IdentifierError::ExternalIdentifier { .. }) => continue,
                Err(err @ IdentifierError::MalformedDatasetId { .. }) => {
                    warn!(image = %image, error = %err, "skipping image with malformed name");
                    continue;
                }
            };
            let attached_to = if mapped.contains_key(&image) {
                if instance_id.is_none() {
                    instance_id = Some(self.compute_instance_id()?);
                }
                instance_id.clone()
            } else {
                None
            };
            volumes.push(BlockDeviceVolume {
                size: catalog.stat(&image)?,
                blockdevice_id: image,
                attached_to,
                dataset_id,
            });
        }
        Ok(volumes)
    }

    fn get_device_path(&self, blockdevice_id: &str) -> Result<Utf8PathBuf, BlockDeviceError> {
        self.catalog().exists_or_fail(blockdevice_id)?;
        self.mappings()
            .list_mappings()?
            .remove(blockdevice_id)
            .ok_or_else(|| BlockDeviceError::UnattachedVolume {
                blockdevice_id: blockdevice_id.to_owned(),
            })
    }
}

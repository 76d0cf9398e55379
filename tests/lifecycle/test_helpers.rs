//! Shared fixtures and helpers for volume lifecycle BDD scenarios.

use ceph_rbd_driver::identifier::blockdevice_id;
use ceph_rbd_driver::test_support::{
    MemoryClient, MemoryCluster, NO_WATCHERS, ScriptedRunner, driver_config, showmapped_output,
};
use ceph_rbd_driver::{BlockDeviceError, BlockDeviceVolume, CephRbdBlockDeviceApi, SweepSummary};
use rstest::fixture;
use uuid::Uuid;

pub type TestDriver = CephRbdBlockDeviceApi<MemoryClient, ScriptedRunner>;

#[derive(Clone, Debug)]
pub enum Outcome {
    Done,
    Volume(Option<BlockDeviceVolume>),
    Volumes(Vec<BlockDeviceVolume>),
    DevicePath(String),
    Swept(SweepSummary),
    Failed(BlockDeviceError),
}

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub pool: String,
    pub cluster: MemoryCluster,
    pub runner: ScriptedRunner,
    pub mapped: Vec<(String, String)>,
    pub outcome: Option<Outcome>,
    pub listing: Vec<BlockDeviceVolume>,
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        pool: String::from("rbd"),
        cluster: MemoryCluster::default(),
        runner: ScriptedRunner::new(),
        mapped: Vec::new(),
        outcome: None,
        listing: Vec::new(),
    }
}

impl LifecycleContext {
    /// Opens a fresh driver session over the shared cluster and runner.
    pub fn driver(&self) -> TestDriver {
        TestDriver::from_config(
            &driver_config(&self.pool),
            &self.cluster,
            self.runner.clone(),
        )
        .unwrap_or_else(|err| panic!("driver should connect: {err}"))
    }

    /// Re-registers `rbd showmapped` output from the recorded mappings.
    pub fn publish_mappings(&self) {
        let rows: Vec<(&str, &str, &str)> = self
            .mapped
            .iter()
            .map(|(image, device)| (self.pool.as_str(), image.as_str(), device.as_str()))
            .collect();
        self.runner.respond_success(
            "rbd",
            &["-p", self.pool.as_str(), "showmapped"],
            &showmapped_output(&rows),
        );
    }

    /// Stubs the per-image tool calls for a freshly created image.
    pub fn stub_image(&self, image: &str) {
        let pool = self.pool.as_str();
        self.runner
            .respond_success("rbd", &["status", image], NO_WATCHERS);
        self.runner
            .respond_success("rbd", &["-p", pool, "map", image], "/dev/rbd0\n");
        self.runner
            .respond_success("rbd", &["-p", pool, "unmap", image], "");
    }

    pub fn record<T>(&mut self, result: Result<T, BlockDeviceError>, wrap: fn(T) -> Outcome) {
        self.outcome = Some(result.map_or_else(Outcome::Failed, wrap));
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.runner
            .command_strings()
            .iter()
            .any(|line| line.contains(needle))
    }
}

pub fn image_for(dataset: &str) -> String {
    let id = Uuid::parse_str(dataset.trim())
        .unwrap_or_else(|err| panic!("dataset id should be a UUID: {err}"));
    blockdevice_id(id)
}

pub fn dataset_uuid(dataset: &str) -> Uuid {
    Uuid::parse_str(dataset.trim()).unwrap_or_else(|err| panic!("dataset id should be a UUID: {err}"))
}

/// Short label used by the feature file for each error kind.
pub const fn error_kind(err: &BlockDeviceError) -> &'static str {
    match err {
        BlockDeviceError::UnknownVolume { .. } => "unknown volume",
        BlockDeviceError::ImageExists { .. } => "image exists",
        BlockDeviceError::AlreadyAttachedVolume { .. } => "already attached",
        BlockDeviceError::UnattachedVolume { .. } => "unattached",
        BlockDeviceError::Identifier(_) => "external identifier",
        BlockDeviceError::Cluster(_) => "cluster",
        BlockDeviceError::Parse(_) => "parse",
        BlockDeviceError::Command(_) => "command",
        BlockDeviceError::Config(_) => "config",
    }
}

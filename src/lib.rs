//! Block-device volume lifecycle driver backed by Ceph RBD images.
//!
//! The crate exposes the [`BlockDeviceApi`] capability an orchestrator uses
//! to create, attach, detach, list and destroy volumes, and an RBD
//! implementation that keeps one image per dataset in a single pool. Host-local
//! state (kernel mappings, watchers, hostname) is read from the Ceph tools on
//! every call; nothing is cached.

pub mod blockdevice;
pub mod cluster;
pub mod command;
pub mod config;
pub mod driver;
pub mod identifier;
pub mod instance;
pub mod mapping;
pub mod test_support;
pub mod watchers;

pub use blockdevice::{ALLOCATION_UNIT, BlockDeviceApi, BlockDeviceError, BlockDeviceVolume};
pub use cluster::{
    ClusterClient, ClusterConnector, ClusterError, ClusterSession, ClusterSettings, PoolContext,
    RbdCliConnector,
};
pub use command::{CommandError, CommandOutput, CommandRunner, ParseError, ProcessCommandRunner};
pub use config::{ConfigError, DriverConfig};
pub use driver::{CephRbdBlockDeviceApi, ProcessBlockDeviceApi, SweepSummary};
pub use identifier::{BLOCKDEVICE_ID_PREFIX, IdentifierError};
pub use mapping::{LocalMapRegistry, LocalMappings};

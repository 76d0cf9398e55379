//! Command-line interface definitions for the `ceph-rbd-driver` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `ceph-rbd-driver` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ceph-rbd-driver",
    about = "Manage orchestrator volumes stored as Ceph RBD images",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Print this host's instance identity.
    #[command(name = "instance-id")]
    InstanceId,
    /// Print the allocation granularity in bytes.
    #[command(name = "allocation-unit")]
    AllocationUnit,
    /// Create a volume for a dataset.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Destroy a volume.
    #[command(name = "destroy")]
    Destroy(VolumeCommand),
    /// Map a volume on this host.
    #[command(name = "attach")]
    Attach(AttachCommand),
    /// Unmap a volume from this host.
    #[command(name = "detach")]
    Detach(VolumeCommand),
    /// Print every managed volume as JSON.
    #[command(name = "list")]
    List,
    /// Print the local device path of an attached volume.
    #[command(name = "device-path")]
    DevicePath(VolumeCommand),
    /// Unmap and destroy every managed volume.
    #[command(name = "sweep")]
    Sweep,
}

/// Arguments for `ceph-rbd-driver create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Dataset UUID the volume backs.
    #[arg(long, value_name = "UUID")]
    pub(crate) dataset_id: String,
    /// Volume size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub(crate) size: u64,
}

/// Arguments for subcommands that target one volume.
#[derive(Debug, Args)]
pub(crate) struct VolumeCommand {
    /// Block device identifier (image name).
    #[arg(value_name = "ID")]
    pub(crate) blockdevice_id: String,
}

/// Arguments for `ceph-rbd-driver attach`.
#[derive(Debug, Args)]
pub(crate) struct AttachCommand {
    /// Block device identifier (image name).
    #[arg(value_name = "ID")]
    pub(crate) blockdevice_id: String,
    /// Instance to attach to; defaults to this host.
    #[arg(long, value_name = "HOST")]
    pub(crate) to: Option<String>,
}

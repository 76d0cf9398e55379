//! Cluster-wide liveness of an image, read from `rbd status`.
//!
//! A watcher is registered by any client holding the image open, including a
//! kernel mapping on another host, so this is the only view of attachment
//! that is not limited to the local host.

use crate::blockdevice::BlockDeviceError;
use crate::command::{CommandRunner, ParseError, argv, run_checked};

const STATUS: &str = "rbd status";

/// Interprets `rbd status` output.
///
/// # Errors
///
/// Returns [`ParseError`] when the output neither reports `Watchers: none`
/// nor lists any `watcher=` entry.
pub fn parse_status(output: &str) -> Result<bool, ParseError> {
    if output.contains("Watchers: none") {
        return Ok(false);
    }
    if output
        .lines()
        .any(|line| line.trim_start().starts_with("watcher="))
    {
        return Ok(true);
    }
    Err(ParseError::new(
        STATUS,
        format!("no watcher information in {:?}", output.trim()),
    ))
}

/// Reports whether any client in the cluster is watching `blockdevice_id`.
///
/// Runs `rbd status <blockdevice_id>` exactly as the tool contract names it.
///
/// # Errors
///
/// Returns [`BlockDeviceError::Command`] when the tool fails and
/// [`BlockDeviceError::Parse`] when its output is unrecognised.
pub fn has_active_watcher<R>(
    runner: &R,
    rbd_bin: &str,
    blockdevice_id: &str,
) -> Result<bool, BlockDeviceError>
where
    R: CommandRunner + ?Sized,
{
    let output = run_checked(runner, rbd_bin, &argv(["status", blockdevice_id]))?;
    Ok(parse_status(&output.stdout)?)
}

//! Identity of the host the driver runs on.

use crate::blockdevice::BlockDeviceError;
use crate::command::{CommandRunner, ParseError, argv, run_checked};

/// Returns this host's short hostname, the identity Ceph uses for nodes.
///
/// # Errors
///
/// Returns [`BlockDeviceError::Command`] when `hostname -s` fails and
/// [`BlockDeviceError::Parse`] when it prints nothing.
pub fn compute_instance_id<R>(runner: &R, hostname_bin: &str) -> Result<String, BlockDeviceError>
where
    R: CommandRunner + ?Sized,
{
    let output = run_checked(runner, hostname_bin, &argv(["-s"]))?;
    let hostname = output.stdout.trim();
    if hostname.is_empty() {
        return Err(ParseError::new("hostname -s", "empty hostname").into());
    }
    Ok(hostname.to_owned())
}

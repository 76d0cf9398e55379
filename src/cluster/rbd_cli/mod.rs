//! Cluster client driven through the `ceph` and `rbd` administration tools.
//!
//! Every call authenticates with the configured identity and asks for JSON
//! output where the tool offers it. Nothing is held open between calls, so
//! `close`/`shutdown` only mark the handle as released.

use std::ffi::OsString;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use tracing::debug;

use super::{ClusterClient, ClusterConnector, ClusterError, ClusterSettings, PoolContext};
use crate::command::{CommandError, CommandRunner, run_checked};

/// Connector that shells out to `ceph` for the handshake and pool lookups.
#[derive(Clone, Debug)]
pub struct RbdCliConnector<R: CommandRunner + Clone> {
    runner: R,
    ceph_bin: String,
    rbd_bin: String,
}

impl<R: CommandRunner + Clone> RbdCliConnector<R> {
    /// Creates a connector using the given tool binaries.
    #[must_use]
    pub fn new(runner: R, ceph_bin: impl Into<String>, rbd_bin: impl Into<String>) -> Self {
        Self {
            runner,
            ceph_bin: ceph_bin.into(),
            rbd_bin: rbd_bin.into(),
        }
    }
}

impl<R: CommandRunner + Clone> ClusterConnector for RbdCliConnector<R> {
    type Client = RbdCliClient<R>;

    fn connect(&self, settings: &ClusterSettings) -> Result<Self::Client, ClusterError> {
        check_conf_file(&settings.conf_path)?;
        let auth = auth_args(settings);

        let mut args = auth.clone();
        args.push(OsString::from("fsid"));
        let output =
            run_checked(&self.runner, &self.ceph_bin, &args).map_err(|err| connection(&err))?;
        debug!(fsid = %output.stdout.trim(), "connected to cluster");

        Ok(RbdCliClient {
            runner: self.runner.clone(),
            ceph_bin: self.ceph_bin.clone(),
            rbd_bin: self.rbd_bin.clone(),
            auth,
            connected: true,
        })
    }
}

/// Connection handle produced by [`RbdCliConnector`].
#[derive(Clone, Debug)]
pub struct RbdCliClient<R: CommandRunner + Clone> {
    runner: R,
    ceph_bin: String,
    rbd_bin: String,
    auth: Vec<OsString>,
    connected: bool,
}

impl<R: CommandRunner + Clone> RbdCliClient<R> {
    /// Returns `true` until [`ClusterClient::shutdown`] is called.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }
}

impl<R: CommandRunner + Clone> ClusterClient for RbdCliClient<R> {
    type Pool = RbdCliPool<R>;

    fn pool_exists(&self, pool: &str) -> Result<bool, ClusterError> {
        let mut args = self.auth.clone();
        args.extend(["osd", "pool", "ls", "--format", "json"].map(OsString::from));
        let output = run_checked(&self.runner, &self.ceph_bin, &args)?;
        let pools: Vec<String> = parse_json(&output.stdout, "pool list")?;
        Ok(pools.iter().any(|name| name == pool))
    }

    fn open_pool(&self, pool: &str) -> Result<Self::Pool, ClusterError> {
        Ok(RbdCliPool {
            runner: self.runner.clone(),
            rbd_bin: self.rbd_bin.clone(),
            auth: self.auth.clone(),
            pool: pool.to_owned(),
            open: true,
        })
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }
}

/// Pool context that runs `rbd -p <pool> ...` for every image operation.
#[derive(Clone, Debug)]
pub struct RbdCliPool<R: CommandRunner + Clone> {
    runner: R,
    rbd_bin: String,
    auth: Vec<OsString>,
    pool: String,
    open: bool,
}

impl<R: CommandRunner + Clone> RbdCliPool<R> {
    /// Returns `true` until [`PoolContext::close`] is called.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    fn args(&self, tail: &[&str]) -> Vec<OsString> {
        let mut args = self.auth.clone();
        args.push(OsString::from("-p"));
        args.push(OsString::from(&self.pool));
        args.extend(tail.iter().map(OsString::from));
        args
    }

    fn image_error(&self, err: CommandError, image: &str) -> ClusterError {
        let CommandError::CommandFailure { ref stderr, .. } = err else {
            return ClusterError::Command(err);
        };
        if stderr.contains("No such file or directory") {
            return ClusterError::ImageNotFound {
                image: image.to_owned(),
                pool: self.pool.clone(),
            };
        }
        if stderr.contains("File exists") {
            return ClusterError::ImageExists {
                image: image.to_owned(),
                pool: self.pool.clone(),
            };
        }
        ClusterError::Command(err)
    }
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    size: u64,
}

impl<R: CommandRunner + Clone> PoolContext for RbdCliPool<R> {
    fn list_images(&self) -> Result<Vec<String>, ClusterError> {
        let output = run_checked(
            &self.runner,
            &self.rbd_bin,
            &self.args(&["ls", "--format", "json"]),
        )?;
        if output.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_json(&output.stdout, "image list")
    }

    fn create_image(&self, image: &str, size_bytes: u64) -> Result<(), ClusterError> {
        let size = format!("{size_bytes}B");
        run_checked(
            &self.runner,
            &self.rbd_bin,
            &self.args(&["create", "--size", size.as_str(), image]),
        )
        .map_err(|err| self.image_error(err, image))?;
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<(), ClusterError> {
        run_checked(
            &self.runner,
            &self.rbd_bin,
            &self.args(&["rm", "--no-progress", image]),
        )
        .map_err(|err| self.image_error(err, image))?;
        Ok(())
    }

    fn image_size(&self, image: &str) -> Result<u64, ClusterError> {
        let output = run_checked(
            &self.runner,
            &self.rbd_bin,
            &self.args(&["info", image, "--format", "json"]),
        )
        .map_err(|err| self.image_error(err, image))?;
        let info: ImageInfo = parse_json(&output.stdout, "image info")?;
        Ok(info.size)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

fn auth_args(settings: &ClusterSettings) -> Vec<OsString> {
    let mut args = Vec::new();
    if !settings.cluster_name.trim().is_empty() {
        args.push(OsString::from("--cluster"));
        args.push(OsString::from(&settings.cluster_name));
    }
    args.push(OsString::from("--conf"));
    args.push(OsString::from(settings.conf_path.as_str()));
    args.push(OsString::from("--id"));
    args.push(OsString::from(&settings.user_id));
    args
}

fn connection(err: &CommandError) -> ClusterError {
    ClusterError::Connection {
        message: err.to_string(),
    }
}

fn parse_json<T>(stdout: &str, resource: &str) -> Result<T, ClusterError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(stdout).map_err(|err| ClusterError::Parse {
        resource: resource.to_owned(),
        message: err.to_string(),
    })
}

/// Rejects configuration files that are missing, unreadable or carry no
/// `[section]` header.
fn check_conf_file(path: &Utf8Path) -> Result<(), ClusterError> {
    let content = read_to_string_ambient(path).map_err(|message| ClusterError::Connection {
        message: format!("cannot read cluster configuration {path}: {message}"),
    })?;
    let has_section = content.lines().map(str::trim).any(|line| {
        line.starts_with('[') && line.ends_with(']') && line.len() > 2
    });
    if has_section {
        return Ok(());
    }
    Err(ClusterError::Connection {
        message: format!("cluster configuration {path} has no sections"),
    })
}

fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path}"))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

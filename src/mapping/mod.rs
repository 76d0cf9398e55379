//! Host-local kernel mappings of RBD images.
//!
//! Which images are mapped on this host, and at which device path, is only
//! visible through `rbd showmapped`. The registry re-runs the tool on every
//! query; a mapping can disappear underneath us (explicit unmap elsewhere,
//! reboot) so nothing is cached.

use std::collections::BTreeMap;
use std::ffi::OsString;

use camino::Utf8PathBuf;
use tracing::info;

use crate::blockdevice::BlockDeviceError;
use crate::command::{CommandRunner, ParseError, run_checked};

const SHOWMAPPED: &str = "rbd showmapped";

/// Mapping of image name to device path for one pool on this host.
pub type LocalMappings = BTreeMap<String, Utf8PathBuf>;

/// Column positions located from the `showmapped` header row.
#[derive(Clone, Copy, Debug)]
struct Columns {
    width: usize,
    pool: usize,
    namespace: Option<usize>,
    image: usize,
    device: usize,
}

impl Columns {
    fn from_header(header: &[&str]) -> Option<Self> {
        if header.first() != Some(&"id") {
            return None;
        }
        let position = |name: &str| header.iter().position(|column| *column == name);
        Some(Self {
            width: header.len(),
            pool: position("pool")?,
            namespace: position("namespace"),
            image: position("image")?,
            device: position("device")?,
        })
    }

    /// Picks `(pool, image, device)` out of a row. Rows from the default
    /// namespace leave the namespace column blank, so they carry one field
    /// fewer than the header.
    fn pick<'row>(&self, fields: &[&'row str]) -> Option<(&'row str, &'row str, &'row str)> {
        let blank_namespace = match self.namespace {
            _ if fields.len() == self.width => None,
            Some(namespace) if fields.len() + 1 == self.width => Some(namespace),
            _ => return None,
        };
        let index = |column: usize| match blank_namespace {
            Some(namespace) if column > namespace => column - 1,
            _ => column,
        };
        Some((
            fields.get(index(self.pool)).copied()?,
            fields.get(index(self.image)).copied()?,
            fields.get(index(self.device)).copied()?,
        ))
    }
}

/// Parses `rbd showmapped` output, keeping only rows from `pool`.
///
/// Empty output and a lone header both mean "nothing mapped". The first line
/// must be the header; a single line that is not a header is rejected rather
/// than guessed at, as is any row whose field count does not fit the header.
///
/// # Errors
///
/// Returns [`ParseError`] when the output cannot be interpreted.
pub fn parse_showmapped(output: &str, pool: &str) -> Result<LocalMappings, ParseError> {
    let mut mappings = LocalMappings::new();
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Ok(mappings);
    };

    let header: Vec<&str> = header_line.split_whitespace().collect();
    let columns = Columns::from_header(&header).ok_or_else(|| {
        ParseError::new(
            SHOWMAPPED,
            format!("expected a header row, found {header_line:?}"),
        )
    })?;

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((row_pool, image, device)) = columns.pick(&fields) else {
            return Err(ParseError::new(
                SHOWMAPPED,
                format!(
                    "expected {} fields, found {} in {line:?}",
                    columns.width,
                    fields.len()
                ),
            ));
        };
        if row_pool != pool {
            continue;
        }
        mappings.insert(image.to_owned(), Utf8PathBuf::from(device));
    }

    Ok(mappings)
}

/// Queries and changes kernel mappings for images in one pool.
#[derive(Debug)]
pub struct LocalMapRegistry<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    rbd_bin: &'a str,
    pool: &'a str,
}

impl<'a, R: CommandRunner + ?Sized> LocalMapRegistry<'a, R> {
    /// Creates a registry for `pool` using the given `rbd` binary.
    #[must_use]
    pub const fn new(runner: &'a R, rbd_bin: &'a str, pool: &'a str) -> Self {
        Self {
            runner,
            rbd_bin,
            pool,
        }
    }

    fn pool_args(&self, tail: &[&str]) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(self.pool)];
        args.extend(tail.iter().map(OsString::from));
        args
    }

    /// Returns the current mappings for the pool on this host.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::Command`] when `rbd showmapped` fails and
    /// [`BlockDeviceError::Parse`] when its output is malformed.
    pub fn list_mappings(&self) -> Result<LocalMappings, BlockDeviceError> {
        let output = run_checked(self.runner, self.rbd_bin, &self.pool_args(&["showmapped"]))?;
        Ok(parse_showmapped(&output.stdout, self.pool)?)
    }

    /// Reports whether `blockdevice_id` is mapped on this host.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`LocalMapRegistry::list_mappings`].
    pub fn is_mapped(&self, blockdevice_id: &str) -> Result<bool, BlockDeviceError> {
        Ok(self.list_mappings()?.contains_key(blockdevice_id))
    }

    /// Maps `blockdevice_id` and returns the device path the tool printed,
    /// if any.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::Command`] when `rbd map` fails.
    pub fn map(&self, blockdevice_id: &str) -> Result<Option<Utf8PathBuf>, BlockDeviceError> {
        let output = run_checked(
            self.runner,
            self.rbd_bin,
            &self.pool_args(&["map", blockdevice_id]),
        )?;
        let device = output.stdout.trim();
        info!(blockdevice_id, device, pool = self.pool, "mapped image");
        Ok((!device.is_empty()).then(|| Utf8PathBuf::from(device)))
    }

    /// Unmaps `blockdevice_id` from this host.
    ///
    /// # Errors
    ///
    /// Returns [`BlockDeviceError::Command`] when `rbd unmap` fails.
    pub fn unmap(&self, blockdevice_id: &str) -> Result<(), BlockDeviceError> {
        run_checked(
            self.runner,
            self.rbd_bin,
            &self.pool_args(&["unmap", blockdevice_id]),
        )?;
        info!(blockdevice_id, pool = self.pool, "unmapped image");
        Ok(())
    }
}

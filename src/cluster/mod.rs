//! Cluster connection, pool context and image catalog.
//!
//! The driver talks to the storage cluster through three small traits so the
//! catalog logic can be exercised against an in-memory double:
//!
//! - [`ClusterConnector`] performs the connect handshake.
//! - [`ClusterClient`] is the live connection handle; it answers pool
//!   lookups and opens pool contexts.
//! - [`PoolContext`] performs image operations inside one pool.
//!
//! [`ClusterSession`] owns a client and one open pool for as long as the
//! driver lives and releases both exactly once.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::command::CommandError;

mod catalog;
mod rbd_cli;
mod session;

pub use catalog::ImageCatalog;
pub use rbd_cli::{RbdCliClient, RbdCliConnector, RbdCliPool};
pub use session::ClusterSession;

/// Connection parameters for a cluster and the pool holding driver images.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterSettings {
    /// Cluster identity label; empty selects the default cluster.
    pub cluster_name: String,
    /// Authentication identity (without the `client.` prefix).
    pub user_id: String,
    /// Location of the cluster configuration file.
    pub conf_path: Utf8PathBuf,
    /// Pool in which images are created.
    pub pool: String,
}

/// Errors raised by cluster clients and pool contexts.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterError {
    /// Raised when the configuration is unusable or the handshake fails.
    #[error("failed to connect to cluster: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },
    /// Raised when the configured pool does not exist.
    #[error("pool {pool} does not exist")]
    PoolNotFound {
        /// Pool that was requested.
        pool: String,
    },
    /// Raised when creating an image whose name is already taken.
    #[error("image {image} already exists in pool {pool}")]
    ImageExists {
        /// Image that was requested.
        image: String,
        /// Pool that was searched.
        pool: String,
    },
    /// Raised when an image operation targets a missing image.
    #[error("image {image} not found in pool {pool}")]
    ImageNotFound {
        /// Image that was requested.
        image: String,
        /// Pool that was searched.
        pool: String,
    },
    /// Raised when a cluster response cannot be interpreted.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource being parsed (for example `image info`).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when a cluster tool invocation fails.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Establishes connections to a cluster.
pub trait ClusterConnector {
    /// Connection handle produced by a successful handshake.
    type Client: ClusterClient;

    /// Connects using `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Connection`] when the configuration is
    /// malformed or the handshake fails.
    fn connect(&self, settings: &ClusterSettings) -> Result<Self::Client, ClusterError>;
}

/// Live connection to a cluster.
pub trait ClusterClient {
    /// Pool context type opened by this client.
    type Pool: PoolContext;

    /// Reports whether `pool` exists.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] when the lookup itself fails.
    fn pool_exists(&self, pool: &str) -> Result<bool, ClusterError>;

    /// Opens an I/O context on `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] when the context cannot be opened.
    fn open_pool(&self, pool: &str) -> Result<Self::Pool, ClusterError>;

    /// Releases the connection. Called exactly once by [`ClusterSession`].
    fn shutdown(&mut self);
}

/// Image operations scoped to a single pool.
pub trait PoolContext {
    /// Lists every image name in the pool.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] when the listing fails.
    fn list_images(&self) -> Result<Vec<String>, ClusterError>;

    /// Creates `image` with exactly `size_bytes` of capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::ImageExists`] when the name is taken.
    fn create_image(&self, image: &str, size_bytes: u64) -> Result<(), ClusterError>;

    /// Removes `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::ImageNotFound`] when the image is absent.
    fn remove_image(&self, image: &str) -> Result<(), ClusterError>;

    /// Returns the provisioned size of `image` in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::ImageNotFound`] when the image is absent.
    fn image_size(&self, image: &str) -> Result<u64, ClusterError>;

    /// Releases the pool context. Called exactly once by [`ClusterSession`].
    fn close(&mut self);
}

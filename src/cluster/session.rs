//! Scoped ownership of a cluster connection and its pool context.

use std::fmt;

use tracing::{debug, info};

use super::{ClusterClient, ClusterConnector, ClusterError, ClusterSettings, PoolContext};

/// An open connection plus an open context on the driver's pool.
///
/// Dropping the session (or calling [`ClusterSession::close`]) closes the pool
/// context and then shuts the client down. The release runs once no matter
/// how many times either path is taken.
pub struct ClusterSession<C: ClusterClient> {
    client: C,
    pool: C::Pool,
    pool_name: String,
    released: bool,
}

impl<C: ClusterClient> ClusterSession<C> {
    /// Connects to the cluster and opens the configured pool.
    ///
    /// When anything fails after the handshake the client is shut down before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Connection`] when the handshake fails and
    /// [`ClusterError::PoolNotFound`] when the pool is missing.
    pub fn open<K>(connector: &K, settings: &ClusterSettings) -> Result<Self, ClusterError>
    where
        K: ClusterConnector<Client = C>,
    {
        let mut client = connector.connect(settings)?;
        match Self::open_pool(&client, &settings.pool) {
            Ok(pool) => {
                info!(pool = %settings.pool, "cluster session opened");
                Ok(Self {
                    client,
                    pool,
                    pool_name: settings.pool.clone(),
                    released: false,
                })
            }
            Err(err) => {
                client.shutdown();
                Err(err)
            }
        }
    }

    fn open_pool(client: &C, pool: &str) -> Result<C::Pool, ClusterError> {
        if !client.pool_exists(pool)? {
            return Err(ClusterError::PoolNotFound {
                pool: pool.to_owned(),
            });
        }
        client.open_pool(pool)
    }

    /// Returns the open pool context.
    #[must_use]
    pub const fn pool(&self) -> &C::Pool {
        &self.pool
    }

    /// Returns the name of the open pool.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// Closes the pool context and the connection.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pool.close();
        self.client.shutdown();
        debug!(pool = %self.pool_name, "cluster session closed");
    }
}

impl<C: ClusterClient> fmt::Debug for ClusterSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSession")
            .field("pool_name", &self.pool_name)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<C: ClusterClient> Drop for ClusterSession<C> {
    fn drop(&mut self) {
        self.release();
    }
}

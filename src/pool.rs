//! The connection-pooling interface this crate consumes.
//!
//! The monitoring core does not open TCP connections itself. Deployments
//! supply a pool implementation through
//! [`ClusterSettings::pool_factory`](crate::options::ClusterSettings); the
//! cluster creates two pools per server address, one reserved for its
//! monitor and one for application traffic.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{error::Result, options::ServerAddress};

/// Creates a [`ConnectionPool`] for a server address. Invoked by the cluster
/// whenever a server joins the topology.
pub type PoolFactory = Arc<dyn Fn(&ServerAddress) -> Arc<dyn ConnectionPool> + Send + Sync>;

/// A pool of sockets connected to a single server.
#[async_trait]
pub trait ConnectionPool: Send + Sync + fmt::Debug {
    /// Check out a socket, establishing a new connection if necessary.
    async fn get_socket(&self) -> Result<Box<dyn Socket>>;

    /// Return a socket to the pool. The pool may discard it, e.g. if the
    /// pool was reset while the socket was checked out.
    async fn maybe_return_socket(&self, socket: Box<dyn Socket>);

    /// Invalidate every socket belonging to this pool, including ones
    /// currently checked out. A checked-out socket that was invalidated must
    /// fail its next use.
    async fn reset(&self);
}

/// A single established connection.
#[async_trait]
pub trait Socket: Send + fmt::Debug {
    /// Write one wire-protocol message.
    async fn send_message(&mut self, message: &[u8]) -> Result<()>;

    /// Read the one reply message matching `response_to`.
    async fn receive_message(&mut self, response_to: i32) -> Result<Vec<u8>>;

    /// Close the underlying connection.
    async fn close(&mut self);
}

use std::sync::{Arc, RwLock};

use super::{description::server::ServerDescription, monitor::MonitorHandle};
use crate::{
    error::Result,
    options::ServerAddress,
    pool::ConnectionPool,
    runtime,
};

/// Contains the state for a given server in the cluster: its most recent
/// description, the connection pool used for application traffic, and the
/// handle to its monitor.
#[derive(Debug)]
pub struct Server {
    address: ServerAddress,
    description: RwLock<ServerDescription>,
    pool: Arc<dyn ConnectionPool>,
    monitor: MonitorHandle,
}

impl Server {
    pub(crate) fn new(
        description: ServerDescription,
        pool: Arc<dyn ConnectionPool>,
        monitor: MonitorHandle,
    ) -> Self {
        Self {
            address: description.address().clone(),
            description: RwLock::new(description),
            pool,
            monitor,
        }
    }

    /// The address of this server.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// A snapshot of the most recent description of this server.
    pub fn description(&self) -> ServerDescription {
        self.description.read().unwrap().clone()
    }

    /// The connection pool used for application traffic against this
    /// server. Never used by the server's monitor.
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub(crate) fn update_description(&self, description: ServerDescription) {
        debug_assert_eq!(description.address(), &self.address);
        *self.description.write().unwrap() = description;
    }

    pub(crate) fn request_check(&self) {
        self.monitor.request_check();
    }

    /// Stop this server's monitor and invalidate both of its pools. Pool
    /// resets run off task; see [`MonitorHandle::close`].
    pub(crate) fn close(&self) {
        self.monitor.close();

        let pool = self.pool.clone();
        runtime::spawn(async move {
            pool.reset().await;
        });
    }

    /// Send one message on a pooled socket and return the reply matching
    /// `request_id`. The socket is closed rather than reused if anything
    /// goes wrong mid-exchange.
    pub async fn send_message_with_response(
        &self,
        message: &[u8],
        request_id: i32,
    ) -> Result<Vec<u8>> {
        let mut socket = self.pool.get_socket().await?;

        let result = async {
            socket.send_message(message).await?;
            socket.receive_message(request_id).await
        }
        .await;

        if result.is_err() {
            socket.close().await;
        }
        self.pool.maybe_return_socket(socket).await;

        result
    }
}

//! Contains the events and functionality for observing cluster monitoring.

use std::time::Duration;

use bson::{oid::ObjectId, Document};

use crate::{
    error::Error,
    options::ServerAddress,
    sdam::{ClusterDescription, ServerDescription},
};

/// Published when a server description changes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerDescriptionChangedEvent {
    /// The address of the server.
    pub address: ServerAddress,

    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,

    /// The server's previous description.
    pub previous_description: ServerDescription,

    /// The server's new description.
    pub new_description: ServerDescription,
}

/// Published when a server is added to the cluster.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerOpeningEvent {
    /// The address of the server.
    pub address: ServerAddress,

    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,
}

/// Published when a server is removed from the cluster.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerClosedEvent {
    /// The address of the server.
    pub address: ServerAddress,

    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,
}

/// Published when the cluster description changes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ClusterDescriptionChangedEvent {
    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,

    /// The cluster's previous description.
    pub previous_description: ClusterDescription,

    /// The cluster's new description.
    pub new_description: ClusterDescription,
}

/// Published when a cluster is created.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ClusterOpeningEvent {
    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,
}

/// Published when a cluster is closed.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ClusterClosedEvent {
    /// The unique ID of the cluster.
    pub cluster_id: ObjectId,
}

/// Published when a monitor's `ismaster` call is started.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerHeartbeatStartedEvent {
    /// The address of the server.
    pub server_address: ServerAddress,
}

/// Published when a monitor's `ismaster` call succeeds.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerHeartbeatSucceededEvent {
    /// The execution time of the call.
    pub duration: Duration,

    /// The reply to the call.
    pub reply: Document,

    /// The address of the server.
    pub server_address: ServerAddress,
}

/// Published when a monitor's `ismaster` call fails.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServerHeartbeatFailedEvent {
    /// The execution time of the call.
    pub duration: Duration,

    /// The failure that occurred.
    pub failure: Error,

    /// The address of the server.
    pub server_address: ServerAddress,
}

/// Applications can implement this trait to specify custom logic to run on
/// each monitoring event sent by the cluster.
///
/// ```rust
/// # use std::sync::Arc;
/// #
/// # use mongodb_cluster::event::{SdamEventHandler, ServerHeartbeatFailedEvent};
/// #
/// struct FailedHeartbeatLogger;
///
/// impl SdamEventHandler for FailedHeartbeatLogger {
///     fn handle_server_heartbeat_failed_event(&self, event: ServerHeartbeatFailedEvent) {
///         eprintln!("Failed server heartbeat: {:?}", event);
///     }
/// }
/// ```
pub trait SdamEventHandler: Send + Sync {
    /// Called when a server description changes.
    fn handle_server_description_changed_event(&self, _event: ServerDescriptionChangedEvent) {}

    /// Called when a server is added to the cluster.
    fn handle_server_opening_event(&self, _event: ServerOpeningEvent) {}

    /// Called when a server is removed from the cluster.
    fn handle_server_closed_event(&self, _event: ServerClosedEvent) {}

    /// Called when the cluster description changes.
    fn handle_cluster_description_changed_event(&self, _event: ClusterDescriptionChangedEvent) {}

    /// Called when the cluster is created.
    fn handle_cluster_opening_event(&self, _event: ClusterOpeningEvent) {}

    /// Called when the cluster is closed.
    fn handle_cluster_closed_event(&self, _event: ClusterClosedEvent) {}

    /// Called when a server heartbeat begins.
    fn handle_server_heartbeat_started_event(&self, _event: ServerHeartbeatStartedEvent) {}

    /// Called when a server heartbeat succeeds.
    fn handle_server_heartbeat_succeeded_event(&self, _event: ServerHeartbeatSucceededEvent) {}

    /// Called when a server heartbeat fails.
    fn handle_server_heartbeat_failed_event(&self, _event: ServerHeartbeatFailedEvent) {}
}

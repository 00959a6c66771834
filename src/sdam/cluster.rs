use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{
    description::{
        cluster::{ClusterDescription, ClusterType},
        server::ServerDescription,
    },
    message_manager::ClusterMessageManager,
    monitor::Monitor,
    server::Server,
};
use crate::{
    error::{Error, Result},
    event::{
        ClusterClosedEvent,
        ClusterDescriptionChangedEvent,
        ClusterOpeningEvent,
        SdamEventHandler,
        ServerClosedEvent,
        ServerDescriptionChangedEvent,
        ServerOpeningEvent,
    },
    options::{ClusterSettings, ServerAddress},
    selection_criteria::SelectionCriteria,
};

/// Monitors a cluster of one or more servers and routes server selection
/// against the most recent view of it.
///
/// A `Cluster` is a cheaply cloneable handle; clones share the same
/// underlying state. Monitors hold only a [`WeakCluster`], so dropping every
/// handle shuts the background tasks down even if [`close`](Cluster::close)
/// was never called.
#[derive(Clone, Debug)]
pub struct Cluster {
    state: Arc<RwLock<ClusterState>>,
    common: Common,
}

/// A weak reference to the cluster. Upgrading fails once every strong
/// handle has been dropped.
#[derive(Clone, Debug)]
pub(crate) struct WeakCluster {
    state: Weak<RwLock<ClusterState>>,
    common: Common,
}

/// Encapsulates the elements shared between `Cluster` and `WeakCluster`
/// that don't keep the cluster alive.
#[derive(Clone, Debug)]
struct Common {
    message_manager: ClusterMessageManager,
    settings: ClusterSettings,
    id: ObjectId,
}

/// The current state of the cluster: the immutable description snapshot and
/// the set of live servers. All mutation happens under the one lock
/// guarding this struct.
#[derive(Debug)]
struct ClusterState {
    description: ClusterDescription,
    servers: HashMap<ServerAddress, Arc<Server>>,
    opened: bool,
    closed: bool,
}

impl Cluster {
    /// Creates a new `Cluster` from the given settings. Monitoring does not
    /// begin until [`open`](Cluster::open) is called.
    pub fn new(settings: ClusterSettings) -> Result<Self> {
        settings.validate()?;

        let description = ClusterDescription::from_settings(&settings);
        let id = ObjectId::new();

        let common = Common {
            message_manager: ClusterMessageManager::new(),
            settings,
            id,
        };

        let state = ClusterState {
            description,
            servers: HashMap::new(),
            opened: false,
            closed: false,
        };

        let cluster = Cluster {
            state: Arc::new(RwLock::new(state)),
            common,
        };
        cluster
            .common
            .emit(|handler| handler.handle_cluster_opening_event(ClusterOpeningEvent { cluster_id: id }));

        Ok(cluster)
    }

    /// Start monitoring: create a server (with its pools and monitor) for
    /// every seed address. May be called at most once.
    pub async fn open(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.opened {
            return Err(Error::invalid_state("cluster already opened"));
        }

        state.opened = true;
        state.sync_servers(&self.common, &self.downgrade());

        Ok(())
    }

    /// Stop monitoring and close every server. May be called at most once.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::invalid_state("cluster already closed"));
        }

        state.closed = true;
        for server in state.servers.values() {
            server.close();
        }
        state.servers.clear();
        drop(state);

        self.common.emit(|handler| {
            handler.handle_cluster_closed_event(ClusterClosedEvent {
                cluster_id: self.common.id,
            })
        });

        Ok(())
    }

    /// A snapshot of the current cluster description.
    pub async fn description(&self) -> ClusterDescription {
        self.state.read().await.description.clone()
    }

    /// Whether a server for `address` currently exists.
    pub async fn has_server(&self, address: &ServerAddress) -> bool {
        self.state.read().await.servers.contains_key(address)
    }

    /// The server at `address`, if one currently exists.
    pub async fn get_server_by_address(&self, address: &ServerAddress) -> Option<Arc<Server>> {
        self.state.read().await.servers.get(address).cloned()
    }

    /// Return all servers matching `criteria`, waiting up to `timeout` (the
    /// configured selection timeout if `None`) for the cluster to produce
    /// one.
    ///
    /// Fails with a `Configuration` error if any known server's wire
    /// version is incompatible with this driver, and with a
    /// `ConnectionFailure` error if the timeout expires with no match.
    pub async fn select_servers(
        &self,
        criteria: &SelectionCriteria,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<Vec<Arc<Server>>> {
        let timeout = timeout
            .into()
            .unwrap_or_else(|| self.common.settings.server_selection_timeout());
        let start = Instant::now();

        // Subscribing before the first check means an update applied at any
        // point after a check is buffered for the wait that follows it: a
        // change can never slip between seeing no match and going to sleep.
        let mut subscriber = self.common.message_manager.subscribe_to_cluster_changes();

        loop {
            {
                let state = self.state.read().await;
                if state.closed {
                    return Err(Error::invalid_state("the cluster has been closed"));
                }

                state.description.check_compatible()?;

                let matching = state.apply_criteria(criteria);
                if !matching.is_empty() {
                    return Ok(matching
                        .iter()
                        .filter_map(|sd| state.servers.get(sd.address()).cloned())
                        .collect());
                }
            }

            // No suitable server; hurry every monitor along rather than
            // waiting out their heartbeats.
            self.request_check_all().await;

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() || !subscriber.wait_for_message(remaining).await {
                return Err(Error::connection_failure("No suitable servers available"));
            }
        }
    }

    /// Process a new `ServerDescription` after an `ismaster` check
    /// completes: fold it into the description, reconcile the server map,
    /// and wake every waiting selection. No I/O happens under the lock.
    pub(crate) async fn on_change(&self, server_description: ServerDescription) {
        let mut state = self.state.write().await;
        if state.closed {
            return;
        }
        if !state.description.has_server(server_description.address()) {
            // The server was once in the cluster description, otherwise we
            // wouldn't have been monitoring it, but an intervening update
            // removed it. E.g., we got a host list from the primary that
            // didn't include this server.
            return;
        }

        let previous_server_description = state
            .description
            .get_server_description(server_description.address())
            .cloned();
        let previous_description = state.description.clone();

        state.description = previous_description.updated_with(server_description.clone());
        state.sync_servers(&self.common, &self.downgrade());

        if previous_server_description.as_ref() != Some(&server_description) {
            self.common.emit(|handler| {
                handler.handle_server_description_changed_event(ServerDescriptionChangedEvent {
                    address: server_description.address().clone(),
                    cluster_id: self.common.id,
                    previous_description: previous_server_description
                        .unwrap_or_else(|| ServerDescription::new(server_description.address().clone())),
                    new_description: server_description,
                })
            });
        }
        self.common.emit(|handler| {
            handler.handle_cluster_description_changed_event(ClusterDescriptionChangedEvent {
                cluster_id: self.common.id,
                previous_description,
                new_description: state.description.clone(),
            })
        });

        // Wake waiters in select_servers.
        self.common.message_manager.notify_cluster_changed();
    }

    /// Reset the application connection pool for `address`, purging any
    /// broken connections. Called by a monitor after a failed check; the
    /// monitor's own pool is not touched.
    pub(crate) async fn reset_pool(&self, address: &ServerAddress) {
        let server = self.state.read().await.servers.get(address).cloned();
        if let Some(server) = server {
            server.pool().reset().await;
        }
    }

    /// Request an immediate check from every monitor.
    pub(crate) async fn request_check_all(&self) {
        let state = self.state.read().await;
        for server in state.servers.values() {
            server.request_check();
        }
    }

    pub(crate) fn downgrade(&self) -> WeakCluster {
        WeakCluster {
            state: Arc::downgrade(&self.state),
            common: self.common.clone(),
        }
    }
}

impl WeakCluster {
    pub(crate) fn upgrade(&self) -> Option<Cluster> {
        self.state.upgrade().map(|state| Cluster {
            state,
            common: self.common.clone(),
        })
    }
}

impl Common {
    fn emit(&self, emit: impl FnOnce(&Arc<dyn SdamEventHandler>)) {
        if let Some(ref handler) = self.settings.sdam_event_handler {
            emit(handler);
        }
    }
}

impl ClusterState {
    /// Sync the set of servers with the set of addresses in the current
    /// description, creating a monitor and pools for every new address and
    /// closing servers whose addresses were removed.
    ///
    /// Hold the lock while calling this.
    fn sync_servers(&mut self, common: &Common, cluster: &WeakCluster) {
        for server_description in self.description.server_descriptions() {
            let address = server_description.address();
            match self.servers.get(address) {
                Some(server) => server.update_description(server_description.clone()),
                None => {
                    common.emit(|handler| {
                        handler.handle_server_opening_event(ServerOpeningEvent {
                            address: address.clone(),
                            cluster_id: common.id,
                        })
                    });

                    let monitor_pool = (common.settings.pool_factory)(address);
                    let application_pool = (common.settings.pool_factory)(address);
                    let monitor = Monitor::start(
                        address.clone(),
                        cluster.clone(),
                        monitor_pool,
                        common.settings.clone(),
                    );

                    self.servers.insert(
                        address.clone(),
                        Arc::new(Server::new(
                            server_description.clone(),
                            application_pool,
                            monitor,
                        )),
                    );
                }
            }
        }

        let removed: Vec<ServerAddress> = self
            .servers
            .keys()
            .filter(|address| !self.description.has_server(address))
            .cloned()
            .collect();
        for address in removed {
            if let Some(server) = self.servers.remove(&address) {
                server.close();
            }
            common.emit(|handler| {
                handler.handle_server_closed_event(ServerClosedEvent {
                    address: address.clone(),
                    cluster_id: common.id,
                })
            });
        }
    }

    /// The descriptions matching `criteria` among the currently known
    /// servers. For a direct connection the criteria is bypassed: the
    /// single server is the only sensible answer.
    fn apply_criteria(&self, criteria: &SelectionCriteria) -> Vec<ServerDescription> {
        let known_servers: Vec<ServerDescription> =
            self.description.known_servers().cloned().collect();

        if self.description.cluster_type() == ClusterType::Single {
            known_servers
        } else {
            criteria.apply(known_servers)
        }
    }
}

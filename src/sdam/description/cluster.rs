use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    options::{ClusterSettings, ServerAddress},
    sdam::description::server::{ServerDescription, ServerType},
};

/// The lowest wire version this driver can speak.
pub(crate) const MIN_SUPPORTED_WIRE_VERSION: i32 = 0;

/// The highest wire version this driver can speak.
pub(crate) const MAX_SUPPORTED_WIRE_VERSION: i32 = 6;

/// The possible types for a cluster.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Default)]
#[non_exhaustive]
pub enum ClusterType {
    /// A direct connection to a single server. A cluster of this type never
    /// changes type, regardless of what the server reports.
    Single,

    /// A sharded cluster of mongos routers.
    Sharded,

    /// A replica set with no known primary.
    ReplicaSetNoPrimary,

    /// A replica set with a known primary.
    ReplicaSetWithPrimary,

    /// A cluster whose type has not yet been determined.
    #[default]
    Unknown,
}

/// An immutable snapshot of the driver's view of the whole deployment: the
/// cluster type, the replica set name (once learned), and a description of
/// every server currently considered part of the cluster.
#[derive(Debug, Clone)]
pub struct ClusterDescription {
    cluster_type: ClusterType,
    set_name: Option<String>,
    servers: HashMap<ServerAddress, ServerDescription>,
}

impl ClusterDescription {
    pub(crate) fn new(
        cluster_type: ClusterType,
        set_name: Option<String>,
        seeds: impl IntoIterator<Item = ServerAddress>,
    ) -> Self {
        let servers = seeds
            .into_iter()
            .map(|address| (address.clone(), ServerDescription::new(address)))
            .collect();

        Self {
            cluster_type,
            set_name,
            servers,
        }
    }

    pub(crate) fn from_settings(settings: &ClusterSettings) -> Self {
        Self::new(
            settings.initial_cluster_type(),
            settings.set_name.clone(),
            settings.seeds.iter().cloned(),
        )
    }

    /// The current type of the cluster.
    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    /// The replica set name, either configured or learned from a member.
    pub fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref()
    }

    /// Whether `address` is part of the cluster.
    pub fn has_server(&self, address: &ServerAddress) -> bool {
        self.servers.contains_key(address)
    }

    /// The description of the server at `address`, if it is part of the
    /// cluster.
    pub fn get_server_description(&self, address: &ServerAddress) -> Option<&ServerDescription> {
        self.servers.get(address)
    }

    /// The descriptions of every server in the cluster.
    pub fn server_descriptions(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values()
    }

    /// The addresses of every server in the cluster.
    pub fn addresses(&self) -> impl Iterator<Item = &ServerAddress> {
        self.servers.keys()
    }

    /// The descriptions of the servers whose type has been determined.
    pub fn known_servers(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values().filter(|sd| sd.is_known())
    }

    /// The lowest wire version supported across the cluster, or `None` for
    /// an empty cluster.
    pub fn min_wire_version(&self) -> Option<i32> {
        self.servers
            .values()
            .map(ServerDescription::min_wire_version)
            .min()
    }

    /// The highest wire version supported across the cluster, or `None` for
    /// an empty cluster.
    pub fn max_wire_version(&self) -> Option<i32> {
        self.servers
            .values()
            .map(ServerDescription::max_wire_version)
            .max()
    }

    /// Verify that every known server's wire-protocol range overlaps the
    /// driver's. A server outside the range makes the whole deployment
    /// unusable, so this fails rather than filtering the server out.
    pub(crate) fn check_compatible(&self) -> Result<()> {
        for server in self.known_servers() {
            let server_too_new = server.min_wire_version() > MAX_SUPPORTED_WIRE_VERSION;
            let server_too_old = server.max_wire_version() < MIN_SUPPORTED_WIRE_VERSION;

            if server_too_new || server_too_old {
                return Err(Error::configuration(format!(
                    "Server at {} uses wire protocol versions {} through {}, but this driver \
                     only supports {} through {}",
                    server.address(),
                    server.min_wire_version(),
                    server.max_wire_version(),
                    MIN_SUPPORTED_WIRE_VERSION,
                    MAX_SUPPORTED_WIRE_VERSION,
                )));
            }
        }

        Ok(())
    }

    /// The transition function of topology discovery: fold a freshly
    /// produced server description into this snapshot, producing the next
    /// snapshot. Total over all inputs; a description for an address that is
    /// no longer part of the cluster leaves the snapshot unchanged.
    pub(crate) fn updated_with(&self, server_description: ServerDescription) -> ClusterDescription {
        let mut new_description = self.clone();
        new_description.update(server_description);
        new_description
    }

    fn update(&mut self, server_description: ServerDescription) {
        // The server was removed by an intervening state change; its reply
        // is no longer relevant.
        if !self.servers.contains_key(server_description.address()) {
            return;
        }

        let server_type = server_description.server_type();

        // Replace the old info about the server with the new info.
        self.servers.insert(
            server_description.address().clone(),
            server_description.clone(),
        );

        match self.cluster_type {
            ClusterType::Single => {}
            ClusterType::Unknown => match server_type {
                ServerType::Unknown | ServerType::RsGhost => {}
                ServerType::Standalone => {
                    self.servers.remove(server_description.address());
                }
                ServerType::Mongos => self.cluster_type = ClusterType::Sharded,
                ServerType::RsPrimary => {
                    self.cluster_type = ClusterType::ReplicaSetWithPrimary;
                    self.update_rs_from_primary(&server_description);
                }
                ServerType::RsSecondary | ServerType::RsArbiter | ServerType::RsOther => {
                    self.cluster_type = ClusterType::ReplicaSetNoPrimary;
                    self.update_rs_without_primary(&server_description);
                }
            },
            ClusterType::Sharded => match server_type {
                ServerType::Unknown | ServerType::Mongos => {}
                _ => {
                    self.servers.remove(server_description.address());
                }
            },
            ClusterType::ReplicaSetNoPrimary => match server_type {
                ServerType::Unknown | ServerType::RsGhost => {}
                ServerType::Standalone | ServerType::Mongos => {
                    self.servers.remove(server_description.address());
                }
                ServerType::RsPrimary => {
                    self.cluster_type = ClusterType::ReplicaSetWithPrimary;
                    self.update_rs_from_primary(&server_description);
                }
                ServerType::RsSecondary | ServerType::RsArbiter | ServerType::RsOther => {
                    self.update_rs_without_primary(&server_description);
                }
            },
            ClusterType::ReplicaSetWithPrimary => match server_type {
                // Did we just lose the primary?
                ServerType::Unknown | ServerType::RsGhost => self.check_has_primary(),
                ServerType::Standalone | ServerType::Mongos => {
                    self.servers.remove(server_description.address());
                    self.check_has_primary();
                }
                ServerType::RsPrimary => self.update_rs_from_primary(&server_description),
                ServerType::RsSecondary | ServerType::RsArbiter | ServerType::RsOther => {
                    self.update_rs_with_primary_from_member(&server_description);
                }
            },
        }
    }

    /// Update the replica set topology from an RSPrimary's reply. The
    /// primary is authoritative about membership: hosts it doesn't report
    /// are removed.
    fn update_rs_from_primary(&mut self, server_description: &ServerDescription) {
        if self.set_name.is_none() {
            self.set_name = server_description.set_name().map(String::from);
        } else if self.set_name.as_deref() != server_description.set_name() {
            // We found a primary, but it doesn't belong to the replica set
            // we were told to use.
            self.servers.remove(server_description.address());
            self.cluster_type = ClusterType::ReplicaSetNoPrimary;
            return;
        }

        // If another server was the primary, reset its type to Unknown so a
        // fresh check re-establishes what it is now. There can be at most
        // one prior primary.
        let prior_primary = self
            .servers
            .iter()
            .find(|(address, server)| {
                *address != server_description.address()
                    && server.server_type() == ServerType::RsPrimary
            })
            .map(|(address, _)| address.clone());
        if let Some(address) = prior_primary {
            self.servers
                .insert(address.clone(), ServerDescription::new(address));
        }

        // Discover new hosts from this primary's reply.
        for new_address in server_description.all_hosts() {
            if !self.servers.contains_key(new_address) {
                self.servers.insert(
                    new_address.clone(),
                    ServerDescription::new(new_address.clone()),
                );
            }
        }

        // Remove hosts the primary doesn't report.
        let all_hosts = server_description.all_hosts();
        self.servers.retain(|address, _| all_hosts.contains(address));
    }

    /// Update the replica set topology from a non-primary member's reply
    /// when no primary is known. Non-primaries aren't authoritative about
    /// membership, so no servers are removed, only added.
    fn update_rs_without_primary(&mut self, server_description: &ServerDescription) {
        if self.set_name.is_none() {
            self.set_name = server_description.set_name().map(String::from);
        } else if self.set_name.as_deref() != server_description.set_name() {
            self.servers.remove(server_description.address());
            return;
        }

        for address in server_description.all_hosts() {
            if !self.servers.contains_key(address) {
                self.servers
                    .insert(address.clone(), ServerDescription::new(address.clone()));
            }
        }
    }

    /// Update the replica set topology from a non-primary member's reply
    /// when a primary is known.
    fn update_rs_with_primary_from_member(&mut self, server_description: &ServerDescription) {
        if self.set_name.as_deref() != server_description.set_name() {
            self.servers.remove(server_description.address());
        }

        // Had this member been the primary?
        self.check_has_primary();
    }

    /// Inspect the topology for a primary server, and record whether one is
    /// present in the cluster type.
    ///
    /// This should only be called on a replica set topology.
    fn check_has_primary(&mut self) {
        self.cluster_type = if self
            .servers
            .values()
            .any(|server| server.server_type() == ServerType::RsPrimary)
        {
            ClusterType::ReplicaSetWithPrimary
        } else {
            ClusterType::ReplicaSetNoPrimary
        };
    }
}

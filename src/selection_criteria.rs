//! Criteria for selecting servers from a cluster.

use std::{collections::HashMap, sync::Arc};

use derive_where::derive_where;

use crate::sdam::ServerDescription;

/// Describes which servers are suitable for a given operation.
///
/// Criteria are applied to the currently known servers (those whose type has
/// been determined); the servers they return are always a subset of the
/// servers they are given. A criteria is applied while the cluster's
/// internal lock is held, so it must not block.
#[derive(Clone)]
#[derive_where(Debug)]
#[non_exhaustive]
pub enum SelectionCriteria {
    /// Servers that accept writes: a replica set primary, a standalone, or
    /// a mongos.
    Writable,

    /// Servers that serve reads: any writable server or a replica set
    /// secondary.
    Readable,

    /// A predicate used to filter servers that are considered suitable. A
    /// `server` will be considered suitable by a `predicate` if
    /// `predicate(server)` returns true.
    Predicate(#[derive_where(skip)] Predicate),

    /// An arbitrary selection function over the full list of known servers.
    /// Unlike [`Predicate`](SelectionCriteria::Predicate), a selector sees
    /// every candidate at once and so can also rank or de-duplicate, e.g.
    /// to implement a mongos pinning policy.
    Selector(#[derive_where(skip)] Selector),
}

/// A predicate used to filter servers that are considered suitable.
pub type Predicate = Arc<dyn Fn(&ServerDescription) -> bool + Send + Sync>;

/// A function that chooses a subset of the known servers.
pub type Selector = Arc<dyn Fn(&[ServerDescription]) -> Vec<ServerDescription> + Send + Sync>;

/// A replica set member tag set, mapping tag names to values.
pub type TagSet = HashMap<String, String>;

impl SelectionCriteria {
    /// Apply this criteria to a list of known servers.
    pub(crate) fn apply(&self, servers: Vec<ServerDescription>) -> Vec<ServerDescription> {
        match self {
            Self::Writable => servers.into_iter().filter(|sd| sd.is_writable()).collect(),
            Self::Readable => servers.into_iter().filter(|sd| sd.is_readable()).collect(),
            Self::Predicate(predicate) => servers.into_iter().filter(|sd| predicate(sd)).collect(),
            Self::Selector(selector) => selector(&servers),
        }
    }

    /// A criteria that matches only the server at the given address.
    pub fn from_address(address: crate::options::ServerAddress) -> Self {
        Self::Predicate(Arc::new(move |server| server.address() == &address))
    }
}

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    is_master::IsMasterCommandResponse,
    options::ServerAddress,
    selection_criteria::TagSet,
};

const DEFAULT_MAX_BSON_OBJECT_SIZE: i64 = 16 * 1024 * 1024;
const DEFAULT_MAX_WRITE_BATCH_SIZE: i64 = 1000;

/// The number of round-trip samples retained when averaging.
const SAMPLE_WINDOW: usize = 5;

/// Enum representing the possible types of servers that the driver can
/// connect to.
#[derive(Debug, Deserialize, Clone, Copy, Eq, PartialEq, Serialize, Default)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replica set mongod.
    Standalone,

    /// A router used in sharded deployments.
    Mongos,

    /// The primary node in a replica set.
    #[serde(rename = "RSPrimary")]
    RsPrimary,

    /// A secondary node in a replica set.
    #[serde(rename = "RSSecondary")]
    RsSecondary,

    /// A non-data bearing node in a replica set which can participate in
    /// elections.
    #[serde(rename = "RSArbiter")]
    RsArbiter,

    /// Hidden, starting up, or recovering nodes in a replica set.
    #[serde(rename = "RSOther")]
    RsOther,

    /// A member of an uninitialized replica set or a member that has been
    /// removed from the replica set config.
    #[serde(rename = "RSGhost")]
    RsGhost,

    /// A server that the driver hasn't yet communicated with or can't
    /// connect to.
    #[default]
    Unknown,
}

impl ServerType {
    /// Whether a server of this type accepts writes.
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            ServerType::RsPrimary | ServerType::Standalone | ServerType::Mongos
        )
    }

    /// Whether a server of this type serves reads.
    pub fn is_readable(self) -> bool {
        self.is_writable() || self == ServerType::RsSecondary
    }

    /// Whether the driver has determined what kind of server this is.
    pub fn is_known(self) -> bool {
        self != ServerType::Unknown
    }
}

/// A streaming average of round-trip times. Adding a sample produces a new
/// value; prior samples are never mutated, so averages can be shared across
/// description snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovingAverage {
    samples: Vec<Duration>,
}

impl MovingAverage {
    pub(crate) fn new(sample: Duration) -> Self {
        Self {
            samples: vec![sample],
        }
    }

    /// A new average extended with `sample`, retaining at most the last
    /// `SAMPLE_WINDOW` samples.
    pub(crate) fn clone_with(&self, sample: Duration) -> Self {
        let start = (self.samples.len() + 1).saturating_sub(SAMPLE_WINDOW);
        let mut samples = self.samples[start.min(self.samples.len())..].to_vec();
        samples.push(sample);
        Self { samples }
    }

    /// The current average duration.
    pub fn average(&self) -> Duration {
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }
}

/// An immutable snapshot of the most up-to-date information known about one
/// server. A new reply from the server (or a failure to obtain one) produces
/// a new snapshot; existing snapshots are never modified.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerDescription {
    address: ServerAddress,
    server_type: ServerType,
    all_hosts: HashSet<ServerAddress>,
    set_name: Option<String>,
    primary: Option<ServerAddress>,
    tags: TagSet,
    max_bson_object_size: i64,
    max_message_size_bytes: i64,
    max_write_batch_size: i64,
    min_wire_version: i32,
    max_wire_version: i32,
    round_trip_times: Option<MovingAverage>,
}

impl ServerDescription {
    /// A placeholder description for a server the driver hasn't communicated
    /// with yet or couldn't reach.
    pub(crate) fn new(address: ServerAddress) -> Self {
        Self {
            address,
            server_type: ServerType::Unknown,
            all_hosts: HashSet::new(),
            set_name: None,
            primary: None,
            tags: TagSet::new(),
            max_bson_object_size: DEFAULT_MAX_BSON_OBJECT_SIZE,
            max_message_size_bytes: 2 * DEFAULT_MAX_BSON_OBJECT_SIZE,
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
            min_wire_version: 0,
            max_wire_version: 0,
            round_trip_times: None,
        }
    }

    /// Build a description from a successfully decoded `ismaster` reply.
    ///
    /// `previous_round_trip_times` is the average from the last successful
    /// check of the same server, if any; `round_trip_time` is folded into
    /// it.
    pub(crate) fn from_is_master(
        address: ServerAddress,
        response: &IsMasterCommandResponse,
        round_trip_time: Duration,
        previous_round_trip_times: Option<&MovingAverage>,
    ) -> Result<Self> {
        let max_bson_object_size = response
            .max_bson_object_size
            .unwrap_or(DEFAULT_MAX_BSON_OBJECT_SIZE);

        let round_trip_times = match previous_round_trip_times {
            Some(previous) => previous.clone_with(round_trip_time),
            None => MovingAverage::new(round_trip_time),
        };

        Ok(Self {
            server_type: response.server_type(),
            all_hosts: response.all_hosts()?,
            set_name: response.set_name.clone(),
            primary: response.primary_address()?,
            tags: response.tags.clone().unwrap_or_default(),
            max_bson_object_size,
            max_message_size_bytes: response
                .max_message_size_bytes
                .unwrap_or(2 * max_bson_object_size),
            max_write_batch_size: response
                .max_write_batch_size
                .unwrap_or(DEFAULT_MAX_WRITE_BATCH_SIZE),
            min_wire_version: response.min_wire_version.unwrap_or(0),
            max_wire_version: response.max_wire_version.unwrap_or(0),
            round_trip_times: Some(round_trip_times),
            address,
        })
    }

    /// The address of this server. The one field that is identical across
    /// every snapshot of the same server.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// The type of this server.
    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    /// Hosts, passives, and arbiters this server reports as its peers.
    /// Empty for anything that isn't a replica set member.
    pub fn all_hosts(&self) -> &HashSet<ServerAddress> {
        &self.all_hosts
    }

    /// The replica set name this server claims, if any.
    pub fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref()
    }

    /// This server's opinion of who the primary is, if any.
    pub fn primary(&self) -> Option<&ServerAddress> {
        self.primary.as_ref()
    }

    /// The member tags reported by this server.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// The maximum permitted size of a BSON object in bytes.
    pub fn max_bson_object_size(&self) -> i64 {
        self.max_bson_object_size
    }

    /// The maximum permitted size of a wire protocol message.
    pub fn max_message_size_bytes(&self) -> i64 {
        self.max_message_size_bytes
    }

    /// The maximum number of write operations permitted in a write batch.
    pub fn max_write_batch_size(&self) -> i64 {
        self.max_write_batch_size
    }

    /// The minimum wire version that the server supports.
    pub fn min_wire_version(&self) -> i32 {
        self.min_wire_version
    }

    /// The maximum wire version that the server supports.
    pub fn max_wire_version(&self) -> i32 {
        self.max_wire_version
    }

    /// The running average of this server's `ismaster` round-trip times, or
    /// `None` if it has never been successfully checked.
    pub fn round_trip_times(&self) -> Option<&MovingAverage> {
        self.round_trip_times.as_ref()
    }

    /// Whether this server accepts writes.
    pub fn is_writable(&self) -> bool {
        self.server_type.is_writable()
    }

    /// Whether this server serves reads.
    pub fn is_readable(&self) -> bool {
        self.server_type.is_readable()
    }

    /// Whether the type of this server has been determined.
    pub fn is_known(&self) -> bool {
        self.server_type.is_known()
    }
}

//! Contains the types needed to configure a [`Cluster`](crate::sdam::Cluster).

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use derive_where::derive_where;
use serde::{Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, ErrorKind, Result},
    event::SdamEventHandler,
    message::MessageCodec,
    pool::PoolFactory,
    sdam::ClusterType,
};

/// The default port a MongoDB server listens on.
pub const DEFAULT_PORT: u16 = 27017;

const DEFAULT_HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(10);

const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// An enum representing the address of a MongoDB server.
///
/// Currently this just supports addresses that can be connected to over TCP,
/// but alternative address types may be supported in the future (e.g. Unix
/// Domain Socket paths).
#[derive(Clone, Debug, Eq, Serialize)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address where the MongoDB server can be found.
        ///
        /// Compared case-sensitively: two addresses naming the same machine
        /// with different casing are distinct.
        host: String,

        /// The TCP port that the MongoDB server is listening on.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl<'de> Deserialize<'de> for ServerAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(s.as_str()).map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Tcp { host, port },
                Self::Tcp {
                    host: other_host,
                    port: other_port,
                },
            ) => {
                host == other_host
                    && port.unwrap_or(DEFAULT_PORT) == other_port.unwrap_or(DEFAULT_PORT)
            }
        }
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        match self {
            Self::Tcp { host, port } => {
                host.hash(state);
                port.unwrap_or(DEFAULT_PORT).hash(state);
            }
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;
    fn from_str(address: &str) -> Result<Self> {
        ServerAddress::parse(address)
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let mut parts = address.split(':');
        let hostname = match parts.next() {
            Some(part) => {
                if part.is_empty() {
                    return Err(ErrorKind::InvalidArgument {
                        message: format!(
                            "invalid server address: \"{}\"; hostname cannot be empty",
                            address
                        ),
                    }
                    .into());
                }
                part
            }
            None => {
                return Err(ErrorKind::InvalidArgument {
                    message: format!("invalid server address: \"{}\"", address),
                }
                .into())
            }
        };

        let port = match parts.next() {
            Some(part) => {
                let port = u16::from_str(part).map_err(|_| ErrorKind::InvalidArgument {
                    message: format!(
                        "port must be valid 16-bit unsigned integer, instead got: {}",
                        part
                    ),
                })?;

                if port == 0 {
                    return Err(ErrorKind::InvalidArgument {
                        message: format!(
                            "invalid server address: \"{}\"; port must be non-zero",
                            address
                        ),
                    }
                    .into());
                }
                if parts.next().is_some() {
                    return Err(ErrorKind::InvalidArgument {
                        message: format!(
                            "address \"{}\" contains more than one unescaped ':'",
                            address
                        ),
                    }
                    .into());
                }

                Some(port)
            }
            None => None,
        };

        Ok(ServerAddress::Tcp {
            host: hostname.to_string(),
            port,
        })
    }

    pub(crate) fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    pub(crate) fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => *port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => {
                write!(fmt, "{}:{}", host, port.unwrap_or(DEFAULT_PORT))
            }
        }
    }
}

/// Contains the options that can be used to configure cluster monitoring.
#[derive(Clone, TypedBuilder)]
#[derive_where(Debug)]
#[non_exhaustive]
pub struct ClusterSettings {
    /// The initial list of server addresses used to bootstrap discovery.
    /// Must be non-empty.
    pub seeds: Vec<ServerAddress>,

    /// The name of the replica set that the cluster is expected to be a
    /// member of, if any.
    #[builder(default, setter(into, strip_option))]
    pub set_name: Option<String>,

    /// The amount of time each monitor should wait between periodic server
    /// checks.
    ///
    /// The default value is 10 seconds.
    #[builder(default, setter(strip_option))]
    pub heartbeat_frequency: Option<Duration>,

    /// The amount of time
    /// [`Cluster::select_servers`](crate::sdam::Cluster::select_servers)
    /// waits for a suitable server before failing.
    ///
    /// The default value is 5 seconds.
    #[builder(default, setter(strip_option))]
    pub server_selection_timeout: Option<Duration>,

    /// Creates the connection pools used to talk to each server. Each
    /// server gets two pools from this factory: one reserved for its
    /// monitor and one for application traffic.
    #[derive_where(skip)]
    pub pool_factory: PoolFactory,

    /// Encodes the `ismaster` command and decodes server replies.
    #[derive_where(skip)]
    pub message_codec: Arc<dyn MessageCodec>,

    /// The handler that should process monitoring events.
    #[builder(default, setter(strip_option))]
    #[derive_where(skip)]
    pub sdam_event_handler: Option<Arc<dyn SdamEventHandler>>,
}

impl ClusterSettings {
    /// Whether the settings describe a direct connection to a single server
    /// rather than deployment discovery: one seed and no replica set name.
    pub fn direct(&self) -> bool {
        self.seeds.len() == 1 && self.set_name.is_none()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(Error::invalid_argument(
                "the seed list must contain at least one address",
            ));
        }

        Ok(())
    }

    pub(crate) fn initial_cluster_type(&self) -> ClusterType {
        if self.direct() {
            ClusterType::Single
        } else if self.set_name.is_some() {
            ClusterType::ReplicaSetNoPrimary
        } else {
            ClusterType::Unknown
        }
    }

    pub(crate) fn heartbeat_frequency(&self) -> Duration {
        self.heartbeat_frequency
            .unwrap_or(DEFAULT_HEARTBEAT_FREQUENCY)
    }

    pub(crate) fn server_selection_timeout(&self) -> Duration {
        self.server_selection_timeout
            .unwrap_or(DEFAULT_SERVER_SELECTION_TIMEOUT)
    }
}

#[cfg(test)]
mod test {
    use super::ServerAddress;

    #[test]
    fn parse_defaults_port() {
        let address = ServerAddress::parse("db.example.com").unwrap();
        assert_eq!(address.host(), "db.example.com");
        assert_eq!(address.port(), None);
        assert_eq!(address.to_string(), "db.example.com:27017");
    }

    #[test]
    fn parse_with_port() {
        let address = ServerAddress::parse("db.example.com:12345").unwrap();
        assert_eq!(address.host(), "db.example.com");
        assert_eq!(address.port(), Some(12345));
    }

    #[test]
    fn default_port_is_structural() {
        assert_eq!(
            ServerAddress::parse("a").unwrap(),
            ServerAddress::parse("a:27017").unwrap()
        );
    }

    #[test]
    fn host_comparison_is_case_sensitive() {
        assert_ne!(
            ServerAddress::parse("A").unwrap(),
            ServerAddress::parse("a").unwrap()
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse("host:0").is_err());
        assert!(ServerAddress::parse("host:notaport").is_err());
        assert!(ServerAddress::parse("host:123:456").is_err());
    }
}

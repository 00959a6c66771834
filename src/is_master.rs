//! Parsing of the response to the `ismaster` command.

use std::collections::HashSet;

use bson::Document;
use serde::Deserialize;

use crate::{
    error::Result,
    options::ServerAddress,
    sdam::ServerType,
    selection_criteria::TagSet,
};

/// The value of the `msg` field that identifies a mongos.
const MONGOS_MSG: &str = "isdbgrid";

/// The response to an `ismaster` command.
///
/// See the documentation [here](https://www.mongodb.com/docs/manual/reference/command/hello/)
/// for more details.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IsMasterCommandResponse {
    /// Whether the command completed successfully. Anything other than 1
    /// means the reply carries no usable topology information.
    pub ok: Option<f64>,

    #[serde(rename = "ismaster")]
    /// Whether the server is writable. If true, this instance is a primary
    /// in a replica set, a mongos instance, or a standalone mongod.
    pub is_master: Option<bool>,

    /// Whether the server is a secondary.
    pub secondary: Option<bool>,

    /// Whether the server is an arbiter.
    pub arbiter_only: Option<bool>,

    /// Whether the server is hidden.
    pub hidden: Option<bool>,

    #[serde(rename = "isreplicaset")]
    /// Whether the server is a member of an uninitialized replica set.
    pub is_replica_set: Option<bool>,

    /// The name of the replica set the server belongs to.
    pub set_name: Option<String>,

    /// An optional message. This contains the value "isdbgrid" when returned
    /// from a mongos.
    pub msg: Option<String>,

    /// The address of the current primary member of the replica set, as the
    /// server believes it.
    pub primary: Option<String>,

    /// The list of all data-bearing, non-hidden members.
    pub hosts: Option<Vec<String>>,

    /// The list of all passive members.
    pub passives: Option<Vec<String>>,

    /// The list of all arbiters.
    pub arbiters: Option<Vec<String>>,

    /// User-defined tags for a replica set member.
    pub tags: Option<TagSet>,

    /// The maximum permitted size of a BSON object in bytes.
    pub max_bson_object_size: Option<i64>,

    /// The maximum permitted size of a wire protocol message.
    pub max_message_size_bytes: Option<i64>,

    /// The maximum number of write operations permitted in a write batch.
    pub max_write_batch_size: Option<i64>,

    /// The minimum wire version that the server supports.
    pub min_wire_version: Option<i32>,

    /// The maximum wire version that the server supports.
    pub max_wire_version: Option<i32>,
}

impl IsMasterCommandResponse {
    pub(crate) fn parse(doc: Document) -> Result<Self> {
        bson::from_document(doc).map_err(Into::into)
    }

    /// Classify the server that produced this reply.
    pub(crate) fn server_type(&self) -> ServerType {
        if self.ok != Some(1.0) {
            ServerType::Unknown
        } else if self.is_replica_set == Some(true) {
            ServerType::RsGhost
        } else if self.set_name.is_some() {
            if self.hidden == Some(true) {
                ServerType::RsOther
            } else if self.is_master == Some(true) {
                ServerType::RsPrimary
            } else if self.secondary == Some(true) {
                ServerType::RsSecondary
            } else if self.arbiter_only == Some(true) {
                ServerType::RsArbiter
            } else {
                ServerType::RsOther
            }
        } else if self.msg.as_deref() == Some(MONGOS_MSG) {
            ServerType::Mongos
        } else {
            ServerType::Standalone
        }
    }

    /// The hosts, passives, and arbiters known to this server, as a set.
    pub(crate) fn all_hosts(&self) -> Result<HashSet<ServerAddress>> {
        self.hosts
            .iter()
            .flatten()
            .chain(self.passives.iter().flatten())
            .chain(self.arbiters.iter().flatten())
            .map(ServerAddress::parse)
            .collect()
    }

    /// This server's opinion of who the primary is, if any.
    pub(crate) fn primary_address(&self) -> Result<Option<ServerAddress>> {
        self.primary.as_deref().map(ServerAddress::parse).transpose()
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::IsMasterCommandResponse;
    use crate::{options::ServerAddress, sdam::ServerType};

    fn parse(doc: bson::Document) -> IsMasterCommandResponse {
        IsMasterCommandResponse::parse(doc).unwrap()
    }

    #[test]
    fn not_ok_is_unknown() {
        // Even a reply that names a set carries no information without ok: 1.
        let response = parse(doc! { "ok": 0, "ismaster": true, "setName": "rs" });
        assert_eq!(response.server_type(), ServerType::Unknown);

        let response = parse(doc! { "ismaster": true });
        assert_eq!(response.server_type(), ServerType::Unknown);
    }

    #[test]
    fn ok_as_integer() {
        let response = parse(doc! { "ok": 1_i32, "ismaster": true });
        assert_eq!(response.server_type(), ServerType::Standalone);
    }

    #[test]
    fn ghost_precedes_set_name() {
        let response = parse(doc! { "ok": 1, "isreplicaset": true, "setName": "rs" });
        assert_eq!(response.server_type(), ServerType::RsGhost);
    }

    #[test]
    fn replica_set_member_types() {
        let cases = [
            (doc! { "ok": 1, "setName": "rs", "ismaster": true }, ServerType::RsPrimary),
            (doc! { "ok": 1, "setName": "rs", "secondary": true }, ServerType::RsSecondary),
            (doc! { "ok": 1, "setName": "rs", "arbiterOnly": true }, ServerType::RsArbiter),
            (
                doc! { "ok": 1, "setName": "rs", "ismaster": true, "hidden": true },
                ServerType::RsOther,
            ),
            (doc! { "ok": 1, "setName": "rs" }, ServerType::RsOther),
        ];

        for (reply, expected) in cases {
            assert_eq!(parse(reply.clone()).server_type(), expected, "reply: {}", reply);
        }
    }

    #[test]
    fn mongos() {
        let response = parse(doc! { "ok": 1, "msg": "isdbgrid" });
        assert_eq!(response.server_type(), ServerType::Mongos);
    }

    #[test]
    fn bare_reply_is_standalone() {
        let response = parse(doc! { "ok": 1 });
        assert_eq!(response.server_type(), ServerType::Standalone);
    }

    #[test]
    fn all_hosts_unions_and_defaults_ports() {
        let response = parse(doc! {
            "ok": 1,
            "setName": "rs",
            "secondary": true,
            "hosts": ["a:27017", "b:27018"],
            "passives": ["c"],
            "arbiters": ["d:30000"],
        });

        let all_hosts = response.all_hosts().unwrap();
        assert_eq!(all_hosts.len(), 4);
        assert!(all_hosts.contains(&ServerAddress::parse("c:27017").unwrap()));
        assert!(all_hosts.contains(&ServerAddress::parse("d:30000").unwrap()));
    }

    #[test]
    fn primary_address_parsed() {
        let response = parse(doc! { "ok": 1, "setName": "rs", "secondary": true, "primary": "a" });
        assert_eq!(
            response.primary_address().unwrap(),
            Some(ServerAddress::parse("a:27017").unwrap())
        );
    }
}

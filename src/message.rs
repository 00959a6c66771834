//! The wire-protocol encoding interface this crate consumes.
//!
//! Message framing is owned by the driver's messaging layer; the monitoring
//! core only needs to encode one command and decode its reply. A codec
//! implementation is supplied through
//! [`ClusterSettings::message_codec`](crate::options::ClusterSettings).

use std::fmt;

use bson::Document;

use crate::error::Result;

/// An encoded request together with the id used to match its reply.
#[derive(Clone, Debug)]
pub struct Query {
    /// The request id to pass to [`Socket::receive_message`](crate::pool::Socket::receive_message).
    pub request_id: i32,

    /// The encoded message bytes.
    pub bytes: Vec<u8>,
}

/// Encodes the monitoring command and decodes server replies.
pub trait MessageCodec: Send + Sync + fmt::Debug {
    /// Encode a query against the `admin.$cmd` virtual collection with body
    /// `{ismaster: 1}` and `numberToReturn` of -1.
    fn is_master_query(&self) -> Result<Query>;

    /// Decode a reply into its single response document.
    fn decode_reply(&self, response: &[u8]) -> Result<Document>;
}

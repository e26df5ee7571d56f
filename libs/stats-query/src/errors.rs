use std::{io, num::ParseFloatError, time::Duration};

use hickory_proto::ProtoError;

/// Failure to get a reply envelope back from dnsmasq
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("no addresses found for {0}")]
    NoAddress(String),
    #[error("io error: {0:?}")]
    Io(#[from] io::Error),
    #[error("failed to encode stats request: {0}")]
    Encode(#[source] ProtoError),
    #[error("malformed reply: {0}")]
    Decode(#[source] ProtoError),
    #[error("connection closed before a reply was received")]
    Closed,
    #[error("reply id {got} does not match request id {expected}")]
    IdMismatch { expected: u16, got: u16 },
    #[error("timed out waiting for reply after {0:?}")]
    Timeout(Duration),
}

/// Failure of a stats query, either getting the reply or decoding its answers
#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid stats record name: {0}")]
    Name(#[from] ProtoError),
    #[error("stats DNS record {name:?}: unexpected number of replies: got {got}, want {want}")]
    UnexpectedReplies {
        name: String,
        got: usize,
        want: usize,
    },
    #[error(
        "stats DNS record servers.bind.: unexpected number of fields in record: got {got}, want {want}"
    )]
    UnexpectedFields { got: usize, want: usize },
    #[error("stats DNS record {name:?}: invalid value {value:?}")]
    ParseValue {
        name: String,
        value: String,
        #[source]
        source: ParseFloatError,
    },
}

pub type Result<T> = std::result::Result<T, StatsError>;

//! Sending a request to dnsmasq over UDP or TCP
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hickory_proto::op::Message;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::errors::TransportError;

/// largest reply we will read off a datagram socket
const MAX_UDP_LEN: usize = 65_535;

/// How the request is carried to dnsmasq
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// datagram
    #[default]
    Udp,
    /// stream, messages are prefixed with a 2 byte length
    Tcp,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            other => Err(format!("unknown transport {other:?}, expected udp or tcp")),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        })
    }
}

/// Send `request` to `addr` (`host:port`) and wait for the reply
pub async fn exchange(
    addr: &str,
    transport: Transport,
    request: &Message,
) -> Result<Message, TransportError> {
    let target = resolve(addr).await?;
    let payload = request.to_vec().map_err(TransportError::Encode)?;
    debug!(%target, %transport, len = payload.len(), "sending stats request");

    match transport {
        Transport::Udp => udp_exchange(target, &payload, request.id()).await,
        Transport::Tcp => tcp_exchange(target, payload, request.id()).await,
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, TransportError> {
    lookup_host(addr)
        .await
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_owned(),
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::NoAddress(addr.to_owned()))
}

async fn udp_exchange(
    target: SocketAddr,
    payload: &[u8],
    id: u16,
) -> Result<Message, TransportError> {
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    socket.send(payload).await?;

    let mut buf = vec![0u8; MAX_UDP_LEN];
    loop {
        let len = socket.recv(&mut buf).await?;
        let reply = Message::from_vec(&buf[..len]).map_err(TransportError::Decode)?;
        if reply.id() != id {
            debug!(expected = id, got = reply.id(), "discarding reply for another request");
            continue;
        }
        if reply.truncated() {
            debug!("stats reply truncated, consider --transport tcp");
        }
        return Ok(reply);
    }
}

async fn tcp_exchange(
    target: SocketAddr,
    payload: Vec<u8>,
    id: u16,
) -> Result<Message, TransportError> {
    let stream = TcpStream::connect(target).await?;
    let mut framed = Framed::new(stream, dns_codec());
    framed.send(Bytes::from(payload)).await?;

    // one request per connection, so any other id is a broken peer
    let frame = framed.next().await.ok_or(TransportError::Closed)??;
    let reply = Message::from_vec(&frame).map_err(TransportError::Decode)?;
    if reply.id() != id {
        return Err(TransportError::IdMismatch {
            expected: id,
            got: reply.id(),
        });
    }
    Ok(reply)
}

/// DNS over TCP framing, RFC 1035 4.2.2
pub(crate) fn dns_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(2)
        .new_codec()
}

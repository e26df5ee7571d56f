//! An in-process stand-in for dnsmasq that answers every stats request with
//! a fixed set of answers.
use std::{io, net::SocketAddr};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hickory_proto::{
    op::{Message, MessageType, OpCode, ResponseCode},
    rr::{DNSClass, Name, RData, rdata::TXT},
};
pub use hickory_proto::rr::Record;
use tokio::{
    net::{TcpListener, UdpSocket},
    task::JoinHandle,
};
use tokio_util::codec::Framed;

use crate::transport::dns_codec;

/// Serves stats replies until dropped
#[derive(Debug)]
pub struct FakeDaemon {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeDaemon {
    /// answer over UDP on an ephemeral localhost port
    pub async fn udp(answers: Vec<Record>) -> io::Result<Self> {
        Self::serve_udp(answers, false).await
    }

    /// like [`FakeDaemon::udp`], but each real reply is preceded by one
    /// carrying another request's id
    pub async fn udp_stale(answers: Vec<Record>) -> io::Result<Self> {
        Self::serve_udp(answers, true).await
    }

    /// answer over TCP on an ephemeral localhost port
    pub async fn tcp(answers: Vec<Record>) -> io::Result<Self> {
        Self::serve_tcp(answers, false).await
    }

    /// answer over TCP, but always with the wrong id
    pub async fn tcp_stale(answers: Vec<Record>) -> io::Result<Self> {
        Self::serve_tcp(answers, true).await
    }

    /// reads one TCP request, then closes the connection without replying
    pub async fn hangup() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                // unread data would turn the close into a reset
                let mut framed = Framed::new(stream, dns_codec());
                let _ = framed.next().await;
            }
        });
        Ok(Self { addr, task })
    }

    async fn serve_udp(answers: Vec<Record>, stale: bool) -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                if stale {
                    let reply = respond_as(&query, &answers, query.id().wrapping_add(1));
                    if let Ok(bytes) = reply.to_vec() {
                        let _ = socket.send_to(&bytes, peer).await;
                    }
                }
                if let Ok(bytes) = respond(&query, &answers).to_vec() {
                    let _ = socket.send_to(&bytes, peer).await;
                }
            }
        });
        Ok(Self { addr, task })
    }

    async fn serve_tcp(answers: Vec<Record>, stale: bool) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let answers = answers.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, dns_codec());
                    while let Some(Ok(frame)) = framed.next().await {
                        let Ok(query) = Message::from_vec(&frame) else {
                            return;
                        };
                        let id = if stale {
                            query.id().wrapping_add(1)
                        } else {
                            query.id()
                        };
                        let Ok(bytes) = respond_as(&query, &answers, id).to_vec() else {
                            return;
                        };
                        if framed.send(Bytes::from(bytes)).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        Ok(Self { addr, task })
    }

    /// receives requests over UDP but never replies
    pub async fn silent() -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            while socket.recv_from(&mut buf).await.is_ok() {}
        });
        Ok(Self { addr, task })
    }

    /// the address to query
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// a CHAOS TXT answer record
///
/// # Panics
/// if `name` is not a valid domain name
pub fn txt(name: &str, strings: &[&str]) -> Record {
    let name = Name::from_ascii(name).expect("valid record name");
    let mut record = Record::from_rdata(
        name,
        0,
        RData::TXT(TXT::new(strings.iter().map(|s| s.to_string()).collect())),
    );
    record.set_dns_class(DNSClass::CH);
    record
}

/// build the reply dnsmasq would send for `query`
pub fn respond(query: &Message, answers: &[Record]) -> Message {
    respond_as(query, answers, query.id())
}

fn respond_as(query: &Message, answers: &[Record], id: u16) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(id)
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(query.recursion_desired())
        .set_response_code(ResponseCode::NoError);
    reply.add_queries(query.queries().to_vec());
    reply.add_answers(answers.to_vec());
    reply
}

//! # stats-query
//!
//! dnsmasq publishes its cache statistics as answers to queries of class
//! CHAOS and type TXT in the domain `bind.`: `cachesize.bind`,
//! `insertions.bind`, `evictions.bind`, `misses.bind`, `hits.bind`,
//! `auth.bind` and `servers.bind`. The same data can be fetched by hand with
//!
//! ```text
//! dig +short chaos txt cachesize.bind
//! ```
//!
//! [`StatsQuerier`] asks for all of them in one request and decodes the reply
//! into [`Reading`]s.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity)]

use std::time::Duration;

use hickory_proto::op::ResponseCode;
use tracing::debug;

pub mod decode;
pub mod errors;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod stat;
pub mod transport;

pub use crate::{
    decode::{decode_reply, stats_request},
    errors::{StatsError, TransportError},
    stat::{Reading, ServerStat, Stat, StatRecord},
    transport::Transport,
};

/// Queries one dnsmasq instance for its statistics
#[derive(Debug, Clone)]
pub struct StatsQuerier {
    addr: String,
    transport: Transport,
    timeout: Duration,
}

impl StatsQuerier {
    /// `addr` is a `host:port` pair, resolved on every query
    pub fn new(addr: impl Into<String>, transport: Transport, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            transport,
            timeout,
        }
    }

    /// dnsmasq address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one stats request and decode the reply. Each value is passed to
    /// `on_value` as it is decoded, so values decoded before an error has
    /// occurred have already been delivered when `Err` is returned.
    pub async fn query<F>(&self, on_value: F) -> errors::Result<()>
    where
        F: FnMut(Reading),
    {
        let request = stats_request()?;
        let reply = tokio::time::timeout(
            self.timeout,
            transport::exchange(&self.addr, self.transport, &request),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.timeout))??;

        if reply.response_code() != ResponseCode::NoError {
            debug!(code = ?reply.response_code(), addr = %self.addr, "stats reply was not NOERROR");
        }
        decode_reply(&reply, on_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::SERVERS;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn query_all(querier: &StatsQuerier) -> (Vec<Reading>, errors::Result<()>) {
        let mut readings = Vec::new();
        let res = querier.query(|r| readings.push(r)).await;
        (readings, res)
    }

    #[tokio::test]
    async fn test_query_udp() -> anyhow::Result<()> {
        let daemon = fake::FakeDaemon::udp(vec![
            fake::txt("cachesize.bind.", &["666"]),
            fake::txt("hits.bind.", &["5"]),
            fake::txt(SERVERS, &["ns1.example 10 2"]),
        ])
        .await?;
        let querier = StatsQuerier::new(daemon.addr().to_string(), Transport::Udp, TIMEOUT);
        let (readings, res) = query_all(&querier).await;
        res?;
        assert_eq!(
            readings,
            vec![
                Reading::Stat(StatRecord {
                    stat: Stat::CacheSize,
                    value: 666.,
                }),
                Reading::Stat(StatRecord {
                    stat: Stat::Hits,
                    value: 5.,
                }),
                Reading::Server(ServerStat {
                    server: "ns1.example".into(),
                    queries: 10.,
                    queries_failed: 2.,
                }),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_query_tcp() -> anyhow::Result<()> {
        let daemon = fake::FakeDaemon::tcp(vec![fake::txt("auth.bind.", &["3"])]).await?;
        let querier = StatsQuerier::new(daemon.addr().to_string(), Transport::Tcp, TIMEOUT);
        let (readings, res) = query_all(&querier).await;
        res?;
        assert_eq!(
            readings,
            vec![Reading::Stat(StatRecord {
                stat: Stat::Auth,
                value: 3.,
            })]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_query_timeout() -> anyhow::Result<()> {
        let daemon = fake::FakeDaemon::silent().await?;
        let timeout = Duration::from_millis(100);
        let querier = StatsQuerier::new(daemon.addr().to_string(), Transport::Udp, timeout);
        let (readings, res) = query_all(&querier).await;
        assert!(readings.is_empty());
        assert!(
            matches!(res, Err(StatsError::Transport(TransportError::Timeout(t))) if t == timeout),
            "{res:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_query_partial() -> anyhow::Result<()> {
        let daemon = fake::FakeDaemon::udp(vec![
            fake::txt("cachesize.bind.", &["666"]),
            fake::txt(SERVERS, &["ns1.example 10"]),
        ])
        .await?;
        let querier = StatsQuerier::new(daemon.addr().to_string(), Transport::Udp, TIMEOUT);
        let (readings, res) = query_all(&querier).await;
        assert!(matches!(res, Err(StatsError::UnexpectedFields { .. })));
        assert_eq!(
            readings,
            vec![Reading::Stat(StatRecord {
                stat: Stat::CacheSize,
                value: 666.,
            })]
        );
        Ok(())
    }
}

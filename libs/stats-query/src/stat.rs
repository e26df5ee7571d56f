//! The statistics dnsmasq publishes in the `bind.` CHAOS domain and the
//! values decoded from them.
use std::fmt;

/// record name holding per-upstream server counters
pub const SERVERS: &str = "servers.bind.";

/// Every name asked for in a stats request, in question order
pub const QUESTIONS: [&str; 7] = [
    Stat::CacheSize.record_name(),
    Stat::Insertions.record_name(),
    Stat::Evictions.record_name(),
    Stat::Misses.record_name(),
    Stat::Hits.record_name(),
    Stat::Auth.record_name(),
    SERVERS,
];

/// A scalar statistic, answered with a single TXT string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    /// configured size of the cache
    CacheSize,
    /// cache insertions
    Insertions,
    /// entries which replaced an unexpired cache entry
    Evictions,
    /// queries which had to be forwarded
    Misses,
    /// queries answered from the cache
    Hits,
    /// queries for authoritative zones
    Auth,
}

impl Stat {
    /// all scalar stats
    pub const ALL: [Stat; 6] = [
        Stat::CacheSize,
        Stat::Insertions,
        Stat::Evictions,
        Stat::Misses,
        Stat::Hits,
        Stat::Auth,
    ];

    /// the fully qualified record name dnsmasq answers for this stat
    pub const fn record_name(self) -> &'static str {
        match self {
            Stat::CacheSize => "cachesize.bind.",
            Stat::Insertions => "insertions.bind.",
            Stat::Evictions => "evictions.bind.",
            Stat::Misses => "misses.bind.",
            Stat::Hits => "hits.bind.",
            Stat::Auth => "auth.bind.",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_name())
    }
}

/// How the TXT strings of an answer are turned into values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// exactly one string holding a number
    Scalar(Stat),
    /// one `address queries failed` string per upstream server
    Servers,
}

static STRATEGIES: [(&str, Strategy); 7] = [
    (Stat::CacheSize.record_name(), Strategy::Scalar(Stat::CacheSize)),
    (Stat::Insertions.record_name(), Strategy::Scalar(Stat::Insertions)),
    (Stat::Evictions.record_name(), Strategy::Scalar(Stat::Evictions)),
    (Stat::Misses.record_name(), Strategy::Scalar(Stat::Misses)),
    (Stat::Hits.record_name(), Strategy::Scalar(Stat::Hits)),
    (Stat::Auth.record_name(), Strategy::Scalar(Stat::Auth)),
    (SERVERS, Strategy::Servers),
];

/// look up the decode strategy for an answer name, names are case-insensitive
pub(crate) fn strategy(name: &str) -> Option<Strategy> {
    STRATEGIES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, strategy)| *strategy)
}

/// A decoded scalar statistic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatRecord {
    /// which statistic
    pub stat: Stat,
    /// its current value
    pub value: f64,
}

/// Counters for one upstream server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStat {
    /// server address as printed by dnsmasq, ex. `1.1.1.1#53`
    pub server: String,
    /// queries sent to the server
    pub queries: f64,
    /// queries that failed on the server
    pub queries_failed: f64,
}

/// A value decoded from a stats reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// a scalar statistic
    Stat(StatRecord),
    /// per-server counters
    Server(ServerStat),
}

//! # metrics
//!
//! Descriptors for the dnsmasq metrics produced on every scrape, and the
//! exporter's own metrics registered in the default registry.
use std::{collections::HashMap, time::Instant};

use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounterVec, IntGauge, IntGaugeVec, core::Desc, register_histogram,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
};
use stats_query::Stat;

/// exporter version, reported in the build info metric
pub static VERSION: &str = env!("CARGO_PKG_VERSION");

fn desc(name: &str, help: &str, labels: &[&str]) -> Desc {
    Desc::new(
        name.to_owned(),
        help.to_owned(),
        labels.iter().map(|l| l.to_string()).collect(),
        HashMap::new(),
    )
    .unwrap()
}

lazy_static! {
    /// When the exporter started
    pub static ref START_TIME: Instant = Instant::now();

    // dnsmasq cache stats

    /// `cachesize.bind.`
    pub static ref CACHESIZE: Desc = desc("dnsmasq_cachesize", "configured size of the DNS cache", &[]);
    /// `insertions.bind.`
    pub static ref INSERTIONS: Desc = desc("dnsmasq_insertions", "DNS cache insertions", &[]);
    /// `evictions.bind.`
    pub static ref EVICTIONS: Desc = desc(
        "dnsmasq_evictions",
        "DNS cache evictions: numbers of entries which replaced an unexpired cache entry",
        &[]
    );
    /// `misses.bind.`
    pub static ref MISSES: Desc = desc("dnsmasq_misses", "DNS cache misses: queries which had to be forwarded", &[]);
    /// `hits.bind.`
    pub static ref HITS: Desc = desc("dnsmasq_hits", "DNS queries answered locally (cache hits)", &[]);
    /// `auth.bind.`
    pub static ref AUTH: Desc = desc("dnsmasq_auth", "DNS queries for authoritative zones", &[]);

    // upstream servers, from `servers.bind.`

    /// queries sent upstream
    pub static ref SERVERS_QUERIES: Desc = desc("dnsmasq_servers_queries", "DNS queries on upstream server", &["server"]);
    /// queries failed upstream
    pub static ref SERVERS_QUERIES_FAILED: Desc = desc(
        "dnsmasq_servers_queries_failed",
        "DNS queries failed on upstream server",
        &["server"]
    );

    // DHCP leases

    /// # of leases in the lease file
    pub static ref LEASES: Desc = desc("dnsmasq_leases", "Number of DHCP leases handed out", &[]);
    /// one series per lease, only produced when leases are exposed
    pub static ref LEASE_EXPIRY: Desc = desc(
        "dnsmasq_lease_expiry",
        "Expiry time for active DHCP leases",
        &["mac_addr", "ip_addr", "computer_name", "client_id"]
    );

    // exporter metrics

    /// always 1, labeled with the exporter version
    pub static ref BUILD_INFO: IntGaugeVec = register_int_gauge_vec!(
        "dnsmasq_exporter_build_info",
        "dnsmasq exporter build info",
        &["version"]
    )
    .unwrap();
    /// exporter uptime
    pub static ref UPTIME: IntGauge = register_int_gauge!("dnsmasq_exporter_uptime", "exporter uptime (seconds)").unwrap();
    /// histogram of scrape durations
    pub static ref SCRAPE_DURATION: Histogram = register_histogram!(
        "dnsmasq_exporter_scrape_duration",
        "time to collect dnsmasq stats and leases (seconds)"
    )
    .unwrap();
    /// count of failed scrape subtasks
    pub static ref SCRAPE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "dnsmasq_exporter_scrape_errors",
        "count of scrape subtasks that ended in an error",
        &["subtask"]
    )
    .unwrap();
}

/// Descriptor for a scalar cache statistic
pub fn scalar_desc(stat: Stat) -> &'static Desc {
    match stat {
        Stat::CacheSize => &*CACHESIZE,
        Stat::Insertions => &*INSERTIONS,
        Stat::Evictions => &*EVICTIONS,
        Stat::Misses => &*MISSES,
        Stat::Hits => &*HITS,
        Stat::Auth => &*AUTH,
    }
}

/// Every dnsmasq metric descriptor, in exposition order
pub fn descriptors() -> [&'static Desc; 10] {
    [
        &*CACHESIZE,
        &*INSERTIONS,
        &*EVICTIONS,
        &*MISSES,
        &*HITS,
        &*AUTH,
        &*SERVERS_QUERIES,
        &*SERVERS_QUERIES_FAILED,
        &*LEASES,
        &*LEASE_EXPIRY,
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use prometheus::gather;

    use super::*;

    #[test]
    fn descriptors_are_unique() {
        let names = descriptors()
            .iter()
            .map(|d| d.fq_name.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), descriptors().len());
        assert_eq!(
            LEASE_EXPIRY.variable_labels,
            ["mac_addr", "ip_addr", "computer_name", "client_id"]
        );
        assert_eq!(SERVERS_QUERIES.variable_labels, ["server"]);
        assert!(HITS.variable_labels.is_empty());
    }

    #[test]
    fn scalar_descriptors_are_distinct() {
        let names = Stat::ALL
            .iter()
            .map(|s| scalar_desc(*s).fq_name.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), Stat::ALL.len());
        assert_eq!(scalar_desc(Stat::CacheSize).fq_name, "dnsmasq_cachesize");
    }

    #[test]
    fn exporter_metrics_are_registered() {
        BUILD_INFO.with_label_values(&[VERSION]).set(1);
        SCRAPE_DURATION.observe(0.001);
        SCRAPE_ERRORS.with_label_values(&["stats"]).inc();
        UPTIME.set(1);

        let names = gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect::<HashSet<_>>();
        for name in [
            "dnsmasq_exporter_build_info",
            "dnsmasq_exporter_scrape_duration",
            "dnsmasq_exporter_scrape_errors",
            "dnsmasq_exporter_uptime",
        ] {
            assert!(names.contains(name), "registered metric families: {names:?}");
        }
    }
}

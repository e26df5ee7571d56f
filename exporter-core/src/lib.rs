//! # exporter-core
//!
//! Turns dnsmasq's cache statistics and DHCP lease table into prometheus
//! metrics. See [`Collector`] for how a scrape is run.
//!
//! [`Collector`]: crate::collector::Collector
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use lease_file;
pub use prometheus;
pub use stats_query;
pub use tokio;
pub use tracing;

pub use crate::collector::Collector;

pub mod collector;
pub mod config;
pub mod metrics;
pub mod prelude;

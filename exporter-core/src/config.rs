//! exporter configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default listen address for the HTTP api
    pub static DEFAULT_LISTEN: &str = "localhost:9153";
    /// Default path metrics are served under
    pub static DEFAULT_METRICS_PATH: &str = "/metrics";
    /// Default dnsmasq address, dnsmasq answers stats queries on its DNS port
    pub static DEFAULT_DNSMASQ_ADDR: &str = "localhost:53";
    /// Default lease file location for debian/ubuntu packages
    pub static DEFAULT_LEASES_PATH: &str = "/var/lib/misc/dnsmasq.leases";
    /// Default timeout (seconds) for a stats query. Kept below prometheus'
    /// default scrape timeout of 10s
    pub const DEFAULT_TIMEOUT: u64 = 5;
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "dnsmasq-exporter-worker";
    /// default log level. Can use this argument or EXPORTER_LOG env var
    pub const DEFAULT_EXPORTER_LOG: &str = "info";

    use std::{path::PathBuf, time::Duration};

    pub use clap::Parser;
    use stats_query::Transport;

    use super::trace::LogFormat;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "dnsmasq_exporter", bin_name = "dnsmasq_exporter", about, long_about = None)]
    /// parses from cli & environment var. `.env` in the working dir is loaded as well
    pub struct Config {
        /// listen address
        #[clap(long, env, value_parser, default_value = DEFAULT_LISTEN)]
        pub listen: String,
        /// path under which metrics are served
        #[clap(long, env, value_parser, default_value = DEFAULT_METRICS_PATH)]
        pub metrics_path: String,
        /// dnsmasq host:port address
        #[clap(long, env, value_parser, default_value = DEFAULT_DNSMASQ_ADDR)]
        pub dnsmasq: String,
        /// transport for stats queries, udp or tcp
        #[clap(long, env, value_parser, default_value_t = Transport::Udp)]
        pub transport: Transport,
        /// path to the dnsmasq leases file
        #[clap(long, env, value_parser, default_value = DEFAULT_LEASES_PATH)]
        pub leases_path: PathBuf,
        /// expose dnsmasq leases as metrics (high cardinality)
        #[clap(long, env)]
        pub expose_leases: bool,
        /// stats query timeout (seconds), a scrape waits at most this long on dnsmasq
        #[clap(long, env, value_parser, default_value_t = DEFAULT_TIMEOUT)]
        pub timeout: u64,
        /// number of worker threads, defaults to the number of logical CPUs
        #[clap(long, env, value_parser)]
        pub threads: Option<usize>,
        /// Worker thread name
        #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_EXPORTER_LOG)]
        pub exporter_log: String,
        /// log output format
        #[clap(long, env, value_enum, default_value_t = LogFormat::Standard)]
        pub log_format: LogFormat,
    }

    impl Config {
        /// stats query timeout as `Duration`
        pub fn timeout(&self) -> Duration {
            Duration::from_secs(self.timeout)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parse_defaults() {
            let cfg = Config::try_parse_from(["dnsmasq_exporter"]).expect("cli should parse");
            assert_eq!(cfg.listen, DEFAULT_LISTEN);
            assert_eq!(cfg.metrics_path, DEFAULT_METRICS_PATH);
            assert_eq!(cfg.dnsmasq, DEFAULT_DNSMASQ_ADDR);
            assert_eq!(cfg.transport, Transport::Udp);
            assert_eq!(cfg.leases_path, PathBuf::from(DEFAULT_LEASES_PATH));
            assert!(!cfg.expose_leases);
            assert_eq!(cfg.timeout(), Duration::from_secs(5));
            assert_eq!(cfg.log_format, LogFormat::Standard);
        }

        #[test]
        fn parse_flags() {
            let cfg = Config::try_parse_from([
                "dnsmasq_exporter",
                "--dnsmasq",
                "10.0.0.1:5353",
                "--transport",
                "tcp",
                "--leases-path",
                "/tmp/dnsmasq.leases",
                "--expose-leases",
                "--timeout",
                "2",
                "--log-format",
                "json",
            ])
            .expect("cli should parse");
            assert_eq!(cfg.dnsmasq, "10.0.0.1:5353");
            assert_eq!(cfg.transport, Transport::Tcp);
            assert!(cfg.expose_leases);
            assert_eq!(cfg.timeout(), Duration::from_secs(2));
            assert_eq!(cfg.log_format, LogFormat::Json);
        }

        #[test]
        fn reject_unknown_transport() {
            let err = Config::try_parse_from(["dnsmasq_exporter", "--transport", "quic"])
                .expect_err("expected transport validation error");
            assert!(err.to_string().contains("quic"));
        }
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use clap::ValueEnum;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// log as "json", "pretty" or "standard" (unstructured)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
    pub enum LogFormat {
        /// single line, human readable
        #[default]
        Standard,
        /// multi line, human readable
        Pretty,
        /// one json object per line
        Json,
    }

    /// Configuration for `tracing`
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: LogFormat,
    }

    impl Config {
        /// install the global subscriber
        pub fn parse(exporter_log: &str, log_frmt: LogFormat) -> Result<Self> {
            // Log level comes from EXPORTER_LOG
            let filter = EnvFilter::try_new(exporter_log)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?);

            match log_frmt {
                LogFormat::Json => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                LogFormat::Standard => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self { log_frmt })
        }
    }
}

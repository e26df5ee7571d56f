//! # collector
//!
//! A scrape runs two subtasks side by side: a stats query to dnsmasq and a
//! read of the lease file. Both push [`Sample`]s into a shared [`Sink`] as
//! they decode them. The scrape waits for both, logs whichever failed, and
//! returns everything that was delivered. A failed subtask never fails the
//! scrape, missing series are the signal that something upstream is wrong.
use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use lease_file::LeaseFileError;
use prometheus::{GaugeVec, Opts, core::Collector as _, core::Desc, proto::MetricFamily};
use stats_query::{Reading, StatRecord, StatsError, StatsQuerier, Transport};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinError};
use tracing::{debug, error, trace};

use crate::{
    config::cli,
    metrics::{
        self, BUILD_INFO, LEASE_EXPIRY, LEASES, SCRAPE_DURATION, SCRAPE_ERRORS, SERVERS_QUERIES,
        SERVERS_QUERIES_FAILED, START_TIME, VERSION,
    },
};

/// What the collector reads and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// dnsmasq `host:port`
    pub dnsmasq_addr: String,
    /// transport for the stats query
    pub transport: Transport,
    /// lease file location
    pub leases_path: PathBuf,
    /// produce one series per lease
    pub expose_leases: bool,
    /// upper bound on the stats query
    pub timeout: Duration,
}

impl From<&cli::Config> for Config {
    fn from(cfg: &cli::Config) -> Self {
        Self {
            dnsmasq_addr: cfg.dnsmasq.clone(),
            transport: cfg.transport,
            leases_path: cfg.leases_path.clone(),
            expose_leases: cfg.expose_leases,
            timeout: cfg.timeout(),
        }
    }
}

/// One value for one series
#[derive(Debug, Clone)]
pub struct Sample {
    /// the metric this belongs to
    pub desc: &'static Desc,
    /// values for `desc.variable_labels`, in the same order
    pub label_values: Vec<String>,
    /// the value
    pub value: f64,
}

impl Sample {
    /// a sample for an unlabeled metric
    pub fn gauge(desc: &'static Desc, value: f64) -> Self {
        Self::labeled(desc, Vec::new(), value)
    }

    /// a sample for a labeled metric
    pub fn labeled(desc: &'static Desc, label_values: Vec<String>, value: f64) -> Self {
        Self {
            desc,
            label_values,
            value,
        }
    }

    /// metric name
    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }
}

/// Append-only destination for samples, cloned into each subtask
#[derive(Debug, Clone)]
pub struct Sink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl Sink {
    /// deliver a sample to the scrape
    pub fn deliver(&self, sample: Sample) {
        if self.tx.send(sample).is_err() {
            trace!("scrape already finished, dropping sample");
        }
    }
}

/// The two halves of a scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtask {
    /// dnsmasq stats query
    Stats,
    /// lease file read
    Leases,
}

impl Subtask {
    /// label value for this subtask
    pub fn as_str(self) -> &'static str {
        match self {
            Subtask::Stats => "stats",
            Subtask::Leases => "leases",
        }
    }
}

impl fmt::Display for Subtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a subtask stopped early
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// the stats query could not be sent or its reply could not be decoded
    #[error("stats query failed: {0}")]
    Stats(#[from] StatsError),
    /// the lease file exists but could not be read
    #[error(transparent)]
    Leases(#[from] LeaseFileError),
    /// the subtask panicked
    #[error("{subtask} task did not complete: {source}")]
    Join {
        /// which subtask
        subtask: Subtask,
        /// join failure
        #[source]
        source: JoinError,
    },
}

impl ScrapeError {
    /// which subtask failed
    pub fn subtask(&self) -> Subtask {
        match self {
            ScrapeError::Stats(_) => Subtask::Stats,
            ScrapeError::Leases(_) => Subtask::Leases,
            ScrapeError::Join { subtask, .. } => *subtask,
        }
    }
}

/// Everything one scrape produced
#[derive(Debug, Default)]
pub struct ScrapeResult {
    /// delivered samples, in delivery order within each subtask
    pub samples: Vec<Sample>,
    /// subtasks that ended in an error
    pub errors: Vec<ScrapeError>,
}

impl ScrapeResult {
    /// the value of the series `name{label_values}`, if it was delivered
    pub fn value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.name() == name && s.label_values == label_values)
            .map(|s| s.value)
    }

    /// all samples delivered for `name`
    pub fn samples_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sample> + 'a {
        self.samples.iter().filter(move |s| s.name() == name)
    }

    /// Turn the samples into gauge families, one per descriptor with at least
    /// one sample, in descriptor order.
    pub fn into_families(self) -> prometheus::Result<Vec<MetricFamily>> {
        let descs = metrics::descriptors();
        let vecs = descs
            .iter()
            .map(|desc| {
                let labels = desc
                    .variable_labels
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>();
                GaugeVec::new(Opts::new(desc.fq_name.clone(), desc.help.clone()), &labels)
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        for sample in &self.samples {
            let Some(pos) = descs.iter().position(|d| d.fq_name == sample.desc.fq_name) else {
                continue;
            };
            let values = sample
                .label_values
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>();
            vecs[pos]
                .get_metric_with_label_values(&values)?
                .set(sample.value);
        }

        Ok(vecs
            .iter()
            .flat_map(|vec| vec.collect())
            .filter(|family| !family.get_metric().is_empty())
            .collect())
    }
}

/// Collects dnsmasq metrics. Holds no state between scrapes, every call
/// queries dnsmasq and reads the lease file again.
#[derive(Debug)]
pub struct Collector {
    cfg: Arc<Config>,
    querier: StatsQuerier,
}

impl Collector {
    /// Create a new collector
    pub fn new(cfg: Config) -> Self {
        // uptime counts from here, not from the first scrape
        lazy_static::initialize(&START_TIME);
        BUILD_INFO.with_label_values(&[VERSION]).set(1);
        let querier = StatsQuerier::new(cfg.dnsmasq_addr.clone(), cfg.transport, cfg.timeout);
        Self {
            cfg: Arc::new(cfg),
            querier,
        }
    }

    /// collector config
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Every metric this collector can produce, whether or not a scrape has
    /// data for it
    pub fn describe(&self) -> Vec<&'static Desc> {
        metrics::descriptors().to_vec()
    }

    /// Run both subtasks and wait for both to finish
    pub async fn scrape(&self) -> ScrapeResult {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Sink { tx };

        let stats = tokio::spawn(query_stats(self.querier.clone(), sink.clone()));
        let leases = tokio::spawn(read_leases(Arc::clone(&self.cfg), sink));
        let (stats, leases) = tokio::join!(stats, leases);

        let mut errors = Vec::new();
        for (subtask, res) in [(Subtask::Stats, stats), (Subtask::Leases, leases)] {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(source) => errors.push(ScrapeError::Join { subtask, source }),
            }
        }
        for err in &errors {
            SCRAPE_ERRORS.with_label_values(&[err.subtask().as_str()]).inc();
            error!(
                subtask = %err.subtask(),
                dnsmasq = %self.querier.addr(),
                leases_path = %self.cfg.leases_path.display(),
                ?err,
                "could not complete scrape"
            );
        }

        // every sender went away with its task
        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        debug!(samples = samples.len(), errors = errors.len(), "scrape finished");

        ScrapeResult { samples, errors }
    }

    /// Scrape and build metric families for exposition
    pub async fn collect(&self) -> Vec<MetricFamily> {
        let timer = SCRAPE_DURATION.start_timer();
        let families = match self.scrape().await.into_families() {
            Ok(families) => families,
            Err(err) => {
                error!(?err, "failed to build metric families");
                Vec::new()
            }
        };
        timer.observe_duration();
        families
    }
}

async fn query_stats(querier: StatsQuerier, sink: Sink) -> Result<(), ScrapeError> {
    querier
        .query(|reading| match reading {
            Reading::Stat(StatRecord { stat, value }) => {
                sink.deliver(Sample::gauge(metrics::scalar_desc(stat), value))
            }
            Reading::Server(server) => {
                sink.deliver(Sample::labeled(
                    &SERVERS_QUERIES,
                    vec![server.server.clone()],
                    server.queries,
                ));
                sink.deliver(Sample::labeled(
                    &SERVERS_QUERIES_FAILED,
                    vec![server.server],
                    server.queries_failed,
                ));
            }
        })
        .await?;
    Ok(())
}

async fn read_leases(cfg: Arc<Config>, sink: Sink) -> Result<(), ScrapeError> {
    let leases = lease_file::read_lease_file(&cfg.leases_path).await?;
    sink.deliver(Sample::gauge(&LEASES, leases.len() as f64));

    // high cardinality, opt in only
    if cfg.expose_leases {
        for lease in leases {
            sink.deliver(Sample::labeled(
                &LEASE_EXPIRY,
                vec![
                    lease.mac_address,
                    lease.ip_address,
                    lease.computer_name,
                    lease.client_id,
                ],
                lease.expiry as f64,
            ));
        }
    }
    Ok(())
}

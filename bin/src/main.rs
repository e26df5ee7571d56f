#![allow(clippy::cognitive_complexity)]
use exporter_core::{
    collector,
    config::{
        cli::{self, Parser},
        trace,
    },
    prelude::*,
    tokio::{runtime::Builder, signal},
};
use external_api::ExternalApi;

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;
use tokio_util::sync::CancellationToken;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    // .env has to be in the environment before clap reads it
    let dotenv = dotenv::dotenv();
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.exporter_log, config.log_format)?;
    debug!(?config, ?trace_config);
    if let Err(err) = dotenv {
        debug!(?err, ".env file not loaded");
    }

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    // if we have a configured value here, set it
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    // build the runtime
    let rt = builder.build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => error!(?err, "failed to start exporter"),
            Ok(Err(err)) => error!(?err, "exited with error"),
            Ok(_) => debug!("exiting..."),
        }
    });

    Ok(())
}

async fn start(config: cli::Config) -> Result<()> {
    let collector = Arc::new(Collector::new(collector::Config::from(&config)));
    info!(
        dnsmasq = %config.dnsmasq,
        transport = %config.transport,
        leases_path = %config.leases_path.display(),
        expose_leases = config.expose_leases,
        "starting dnsmasq exporter"
    );
    let api = ExternalApi::new(config.listen, config.metrics_path, collector);

    let token = CancellationToken::new();
    let api_task = api.start(token.clone());
    let signal_task = tokio::spawn(shutdown_signal(token.clone()));

    // the api only returns early on a bind/route error, or once cancelled
    if let Err(err) = api_task.await {
        error!(?err, "error waiting for web server API");
    }
    token.cancel();
    signal_task.abort();
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow::anyhow!(err));
    info!("shutdown signal received");
    token.cancel();
    ret
}

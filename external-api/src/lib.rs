//! # Metrics & API
//!
//! This crate provides the http api prometheus scrapes.
//! It exposes the following endpoints:
//!
//! /          index page linking to the metrics path
//! /metrics   dnsmasq and exporter metrics (path is configurable)
//! /ping
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity)]

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::{Router, extract::Extension, response::Html, routing};
use exporter_core::Collector;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{debug, error, info, trace};

/// Serves collected metrics over HTTP
#[derive(Debug)]
pub struct ExternalApi {
    listen: String,
    metrics_path: String,
    collector: Arc<Collector>,
}

impl ExternalApi {
    /// Create a new ExternalApi instance
    pub fn new(listen: String, metrics_path: String, collector: Arc<Collector>) -> Self {
        trace!("creating external api");
        Self {
            listen,
            metrics_path,
            collector,
        }
    }

    /// Build the router. Fails if the metrics path would not be routable or
    /// would shadow another endpoint.
    fn router(&self) -> Result<Router> {
        let path = self.metrics_path.as_str();
        if !path.starts_with('/') {
            bail!("metrics path {path:?} must start with '/'");
        }
        if path == "/" || path == "/ping" {
            bail!("metrics path {path:?} conflicts with a built-in endpoint");
        }
        let index = handlers::index_page(path);

        // Provides:
        // /
        // /ping
        // <metrics_path>
        Ok(Router::new()
            .route(
                "/",
                routing::get(move || {
                    let page = index.clone();
                    async move { Html(page) }
                }),
            )
            .route("/ping", routing::get(handlers::ping))
            .route(path, routing::get(handlers::metrics))
            .layer(Extension(Arc::clone(&self.collector)))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::default().include_headers(false)),
            ))
    }

    /// serve `app` on `tcp` until `token` is cancelled
    async fn run(tcp: TcpListener, app: Router, token: CancellationToken) -> Result<()> {
        debug!(addr = ?tcp.local_addr()?, "external API listening");
        axum::serve(tcp, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        info!("external API shut down");
        Ok(())
    }

    /// bind the listen address and serve until `token` is cancelled
    pub async fn serve(self, token: CancellationToken) -> Result<()> {
        let app = self.router()?;
        let tcp = TcpListener::bind(&self.listen)
            .await
            .with_context(|| format!("failed to bind external API to {}", self.listen))?;
        info!(
            listen = %self.listen,
            metrics_path = %self.metrics_path,
            expose_leases = self.collector.config().expose_leases,
            "serving metrics"
        );
        ExternalApi::run(tcp, app, token).await
    }

    /// Kick off the HTTP service
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.serve(token).await {
                error!(?err, "external API returned with error");
            }
        })
    }
}

mod handlers {

    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::Extension,
        http::header,
        http::{Response, StatusCode},
        response::IntoResponse,
    };
    use exporter_core::{
        Collector,
        metrics::{START_TIME, UPTIME},
    };
    use prometheus::{Encoder, TextEncoder};
    use tracing::error;

    use crate::models::ServerResult;

    pub(crate) fn index_page(metrics_path: &str) -> String {
        format!(
            "<html>\n\
             <head><title>dnsmasq exporter</title></head>\n\
             <body>\n\
             <h1>dnsmasq exporter</h1>\n\
             <p><a href=\"{metrics_path}\">Metrics</a></p>\n\
             </body>\n\
             </html>\n"
        )
    }

    pub(crate) async fn metrics(
        Extension(collector): Extension<Arc<Collector>>,
    ) -> ServerResult<impl IntoResponse> {
        UPTIME.set(START_TIME.elapsed().as_secs() as i64);
        // scrape first, so this scrape's duration is in the exporter metrics
        let mut mf = collector.collect().await;
        mf.extend(prometheus::gather());

        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        let resp = Response::builder().header(header::CONTENT_TYPE, encoder.format_type());

        match encoder.encode(&mf, &mut buf) {
            Err(err) => {
                error!(?err, "error text encoding prometheus metrics");
                Ok(resp
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())?)
            }
            Ok(_) => Ok(resp.status(StatusCode::OK).body(Body::from(buf))?),
        }
    }

    pub(crate) async fn ping() -> impl IntoResponse {
        StatusCode::OK
    }
}

/// Various models for API responses
pub mod models {
    use axum::response::IntoResponse;

    // error type
    /// Make our own error that wraps `anyhow::Error`.
    #[derive(Debug)]
    pub struct ServerError(anyhow::Error);
    /// return error result
    pub type ServerResult<T> = Result<T, ServerError>;

    impl IntoResponse for ServerError {
        fn into_response(self) -> axum::response::Response {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}", self.0),
            )
                .into_response()
        }
    }

    impl<E> From<E> for ServerError
    where
        E: Into<anyhow::Error>,
    {
        fn from(err: E) -> Self {
            Self(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, net::SocketAddr, path::PathBuf, time::Duration};

    use exporter_core::{
        collector,
        stats_query::{
            Transport,
            fake::{self, FakeDaemon},
        },
    };
    use tempfile::NamedTempFile;

    use super::*;

    struct TestApi {
        addr: SocketAddr,
        token: CancellationToken,
        handle: JoinHandle<Result<()>>,
    }

    fn lease_file() -> anyhow::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "1625595932 00:00:00:00:00:00 10.10.10.10 host-1 00:00:00:00:00:00"
        )?;
        Ok(file)
    }

    async fn serve(
        daemon: &FakeDaemon,
        leases_path: PathBuf,
        metrics_path: &str,
        timeout: Duration,
    ) -> anyhow::Result<TestApi> {
        let collector = Arc::new(Collector::new(collector::Config {
            dnsmasq_addr: daemon.addr().to_string(),
            transport: Transport::Udp,
            leases_path,
            expose_leases: true,
            timeout,
        }));
        let api = ExternalApi::new("127.0.0.1:0".into(), metrics_path.into(), collector);
        let app = api.router()?;
        let tcp = TcpListener::bind("127.0.0.1:0").await?;
        let addr = tcp.local_addr()?;
        let token = CancellationToken::new();
        let handle = tokio::spawn(ExternalApi::run(tcp, app, token.clone()));
        Ok(TestApi {
            addr,
            token,
            handle,
        })
    }

    #[tokio::test]
    async fn test_metrics() -> anyhow::Result<()> {
        let daemon = FakeDaemon::udp(vec![
            fake::txt("cachesize.bind.", &["666"]),
            fake::txt("servers.bind.", &["ns1.example 10 2"]),
        ])
        .await?;
        let leases = lease_file()?;
        let api = serve(
            &daemon,
            leases.path().to_owned(),
            "/metrics",
            Duration::from_secs(2),
        )
        .await?;

        let resp = reqwest::get(format!("http://{}/metrics", api.addr))
            .await?
            .error_for_status()?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        assert_eq!(content_type.as_deref(), Some(prometheus::TEXT_FORMAT));
        let body = resp.text().await?;
        assert!(body.contains("dnsmasq_cachesize 666"), "{body}");
        assert!(body.contains("dnsmasq_servers_queries_failed{server=\"ns1.example\"} 2"));
        assert!(body.contains("dnsmasq_leases 1"));
        assert!(body.contains("dnsmasq_lease_expiry{"));
        assert!(body.contains("dnsmasq_exporter_build_info"));
        assert!(body.contains("dnsmasq_exporter_scrape_duration"));
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_daemon_unresponsive() -> anyhow::Result<()> {
        let daemon = FakeDaemon::silent().await?;
        let leases = lease_file()?;
        let api = serve(
            &daemon,
            leases.path().to_owned(),
            "/metrics",
            Duration::from_millis(100),
        )
        .await?;

        // stats failed, the scrape itself still succeeds
        let body = reqwest::get(format!("http://{}/metrics", api.addr))
            .await?
            .error_for_status()?
            .text()
            .await?;
        assert!(body.contains("dnsmasq_leases 1"), "{body}");
        assert!(!body.contains("dnsmasq_cachesize"));
        assert!(body.contains("dnsmasq_exporter_scrape_errors{subtask=\"stats\"}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_metrics_path() -> anyhow::Result<()> {
        let daemon = FakeDaemon::udp(vec![fake::txt("hits.bind.", &["5"])]).await?;
        let leases = lease_file()?;
        let api = serve(
            &daemon,
            leases.path().to_owned(),
            "/stats",
            Duration::from_secs(2),
        )
        .await?;

        let body = reqwest::get(format!("http://{}/stats", api.addr))
            .await?
            .error_for_status()?
            .text()
            .await?;
        assert!(body.contains("dnsmasq_hits 5"));

        let resp = reqwest::get(format!("http://{}/metrics", api.addr)).await?;
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let index = reqwest::get(format!("http://{}/", api.addr))
            .await?
            .error_for_status()?
            .text()
            .await?;
        assert!(index.contains("<a href=\"/stats\">"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ping_and_shutdown() -> anyhow::Result<()> {
        let daemon = FakeDaemon::silent().await?;
        let api = serve(
            &daemon,
            PathBuf::from("/nonexistent/dnsmasq.leases"),
            "/metrics",
            Duration::from_millis(100),
        )
        .await?;

        let resp = reqwest::get(format!("http://{}/ping", api.addr)).await?;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        api.token.cancel();
        tokio::time::timeout(Duration::from_secs(5), api.handle).await???;
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_metrics_path() -> anyhow::Result<()> {
        let daemon = FakeDaemon::silent().await?;
        for path in ["metrics", "/", "/ping"] {
            let collector = Arc::new(Collector::new(collector::Config {
                dnsmasq_addr: daemon.addr().to_string(),
                transport: Transport::Udp,
                leases_path: PathBuf::from("/nonexistent/dnsmasq.leases"),
                expose_leases: false,
                timeout: Duration::from_millis(100),
            }));
            let api = ExternalApi::new("127.0.0.1:0".into(), path.into(), collector);
            assert!(api.router().is_err(), "{path} should be rejected");
        }
        Ok(())
    }
}

//! exporter prelude

pub use crate::{
    anyhow::{self, Context, Result},
    collector::{Collector, ScrapeResult},
    tokio,
    tracing::{self, debug, error, info, instrument, trace, warn},
};

pub use std::sync::Arc;

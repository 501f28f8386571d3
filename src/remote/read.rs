//! Routing of read queries to remote backends.
//!
//! [`RemoteQuerierFactory`] builds queriers that send every select to a
//! [`ReadClient`], injecting this process's external labels as equality
//! matchers and stripping them again from the results. [`PreferLocalFilter`]
//! narrows or skips remote queries whose range the local storage covers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::client::{ReadClient, TimeoutClient};
use super::codec::{from_query_result, to_query};
use super::filter::SeriesSetFilter;
use crate::config::{ExternalLabels, RemoteReadConfig};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::Matcher;
use crate::storage::{ErrSeriesSet, NoopQuerier, Querier, QuerierFactory, SeriesSet};

/// Returns the earliest timestamp held by the local storage.
pub type StartTimeFn = Arc<dyn Fn() -> Result<i64> + Send + Sync>;

/// Adds an equality matcher for every external label the caller does not
/// match on already.
///
/// Returns the matchers to send and the external labels that were added;
/// the latter must be stripped from the returned series. A user matcher on
/// an external label name wins: that label is neither forced nor stripped.
pub fn add_external_labels(
    external_labels: &ExternalLabels,
    matchers: &[Matcher],
) -> (Vec<Matcher>, ExternalLabels) {
    let mut added = external_labels.clone();
    for m in matchers {
        added.remove(m.name());
    }
    let mut out = Vec::with_capacity(matchers.len() + added.len());
    out.extend_from_slice(matchers);
    out.extend(added.iter().map(|(name, value)| Matcher::equal(name, value)));
    (out, added)
}

/// Skips or narrows remote queries for ranges the local storage holds.
///
/// Queries starting after the local start time get a [`NoopQuerier`]. Ranges
/// reaching past it are clamped so only the older part is read remotely.
pub struct PreferLocalFilter {
    start_time: StartTimeFn,
    next: Arc<dyn QuerierFactory>,
    metrics: Arc<Metrics>,
}

impl PreferLocalFilter {
    pub fn new(
        start_time: StartTimeFn,
        next: Arc<dyn QuerierFactory>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            start_time,
            next,
            metrics,
        }
    }
}

#[async_trait]
impl QuerierFactory for PreferLocalFilter {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn querier(
        &self,
        ctx: CancellationToken,
        mint: i64,
        maxt: i64,
    ) -> Result<Box<dyn Querier>> {
        let local_start = (self.start_time)()?;
        if mint > local_start {
            self.metrics.remote_read_skipped.inc();
            tracing::trace!(mint, local_start, "range served locally, skipping remote");
            return Ok(Box::new(NoopQuerier));
        }
        let maxt = if maxt > local_start { local_start } else { maxt };
        self.next.querier(ctx, mint, maxt).await
    }
}

/// Builds [`RemoteQuerier`]s over one backend.
pub struct RemoteQuerierFactory {
    client: Arc<dyn ReadClient>,
    external_labels: Arc<ExternalLabels>,
    metrics: Arc<Metrics>,
}

impl RemoteQuerierFactory {
    pub fn new(
        client: Arc<dyn ReadClient>,
        external_labels: Arc<ExternalLabels>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            external_labels,
            metrics,
        }
    }
}

#[async_trait]
impl QuerierFactory for RemoteQuerierFactory {
    async fn querier(
        &self,
        ctx: CancellationToken,
        mint: i64,
        maxt: i64,
    ) -> Result<Box<dyn Querier>> {
        Ok(Box::new(RemoteQuerier {
            ctx,
            mint,
            maxt,
            client: self.client.clone(),
            external_labels: self.external_labels.clone(),
            metrics: self.metrics.clone(),
        }))
    }
}

/// Querier reading `[mint, maxt]` from a remote backend.
pub struct RemoteQuerier {
    ctx: CancellationToken,
    mint: i64,
    maxt: i64,
    client: Arc<dyn ReadClient>,
    external_labels: Arc<ExternalLabels>,
    metrics: Arc<Metrics>,
}

#[async_trait]
impl Querier for RemoteQuerier {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn select(&self, matchers: &[Matcher]) -> Box<dyn SeriesSet> {
        let (matchers, added) = add_external_labels(&self.external_labels, matchers);
        let query = to_query(self.mint, self.maxt, &matchers);

        self.metrics.remote_read_queries.inc();
        match self.client.read(&self.ctx, query).await {
            Ok(result) => Box::new(SeriesSetFilter::new(
                Box::new(from_query_result(result)),
                added.names(),
            )),
            Err(err) => {
                self.metrics.remote_read_failures.inc();
                tracing::warn!(remote = self.client.name(), "remote read failed: {}", err);
                Box::new(ErrSeriesSet::new(err))
            }
        }
    }

    /// Not supported by the remote read protocol; always empty.
    async fn label_values(&self, _name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds the querier factory for a configured remote read endpoint.
///
/// Reads are bounded by `remote_timeout`. Unless `read_recent` is set, the
/// factory prefers local data for ranges after `start_time`.
pub fn querier_factory(
    config: &RemoteReadConfig,
    client: Arc<dyn ReadClient>,
    external_labels: Arc<ExternalLabels>,
    start_time: StartTimeFn,
    metrics: Arc<Metrics>,
) -> Arc<dyn QuerierFactory> {
    let client: Arc<dyn ReadClient> = Arc::new(TimeoutClient::new(client, config.remote_timeout));
    let remote: Arc<dyn QuerierFactory> =
        Arc::new(RemoteQuerierFactory::new(client, external_labels, metrics.clone()));
    if config.read_recent {
        return remote;
    }
    Arc::new(PreferLocalFilter::new(start_time, remote, metrics))
}

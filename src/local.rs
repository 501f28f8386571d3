//! Local storage adapter over the embedded engine.
//!
//! [`LocalStorage`] exposes an [`engine::Db`] through the [`Storage`]
//! contract. Matchers and labels are translated at the boundary and engine
//! errors are mapped onto the stable [`Error`] taxonomy by
//! [`map_engine_error`]; nothing past this module sees an [`EngineError`].
//! Series sets stream lazily from the engine and sample iterators are handed
//! out unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::convert::{from_engine_labels, to_engine_labels, to_engine_matchers};
use crate::engine::{self, EngineAppender, EngineError, EngineQuerier, EngineSeriesSet};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::model::{Labels, Matcher, SeriesRef};
use crate::storage::{
    Appender, ErrSeriesSet, Querier, QuerierFactory, Series, SeriesIterator, SeriesSet, Storage,
};

/// Maps an engine error onto the stable taxonomy. Errors without a stable
/// counterpart pass through as [`Error::Storage`].
pub fn map_engine_error(err: EngineError) -> Error {
    match err.cause() {
        EngineError::NotFound => Error::NotFound,
        EngineError::OutOfOrderSample => Error::OutOfOrderSample,
        EngineError::AmendSample => Error::DuplicateSampleForTimestamp,
        EngineError::OutOfBounds => Error::OutOfBounds,
        _ => Error::Storage(err.to_string()),
    }
}

/// [`Storage`] backed by the embedded engine.
#[derive(Clone)]
pub struct LocalStorage {
    db: Arc<dyn engine::Db>,
    metrics: Option<Arc<Metrics>>,
}

impl LocalStorage {
    pub fn new(db: Arc<dyn engine::Db>) -> Self {
        Self { db, metrics: None }
    }

    /// Counts rejected appends in the given metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl QuerierFactory for LocalStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn querier(
        &self,
        ctx: CancellationToken,
        mint: i64,
        maxt: i64,
    ) -> Result<Box<dyn Querier>> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let querier = self.db.querier(mint, maxt).map_err(map_engine_error)?;
        Ok(Box::new(LocalQuerier { q: querier }))
    }
}

impl Storage for LocalStorage {
    fn appender(&self) -> Result<Box<dyn Appender>> {
        Ok(Box::new(LocalAppender {
            a: Some(self.db.appender()),
            metrics: self.metrics.clone(),
        }))
    }

    fn start_time(&self) -> Result<i64> {
        self.db.start_time().map_err(map_engine_error)
    }

    fn close(&self) -> Result<()> {
        self.db.close().map_err(map_engine_error)
    }
}

struct LocalQuerier {
    q: Box<dyn EngineQuerier>,
}

#[async_trait]
impl Querier for LocalQuerier {
    async fn select(&self, matchers: &[Matcher]) -> Box<dyn SeriesSet> {
        match to_engine_matchers(matchers) {
            Ok(ms) => Box::new(LocalSeriesSet {
                set: self.q.select(&ms),
                err: None,
            }),
            Err(err) => Box::new(ErrSeriesSet::new(err)),
        }
    }

    async fn label_values(&self, name: &str) -> Result<Vec<String>> {
        self.q.label_values(name).map_err(map_engine_error)
    }

    async fn close(&self) -> Result<()> {
        self.q.close().map_err(map_engine_error)
    }
}

struct LocalSeriesSet {
    set: Box<dyn EngineSeriesSet>,
    // engine error translated once the set is exhausted
    err: Option<Error>,
}

impl SeriesSet for LocalSeriesSet {
    fn next(&mut self) -> bool {
        if self.set.next() {
            return true;
        }
        if self.err.is_none() {
            self.err = self.set.err().cloned().map(map_engine_error);
        }
        false
    }

    fn at(&self) -> Box<dyn Series + '_> {
        Box::new(LocalSeries { s: self.set.at() })
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}

struct LocalSeries<'a> {
    s: &'a dyn engine::EngineSeries,
}

impl Series for LocalSeries<'_> {
    fn labels(&self) -> Labels {
        from_engine_labels(self.s.labels().to_vec())
    }

    fn iterator(&self) -> Box<dyn SeriesIterator + '_> {
        self.s.iterator()
    }
}

/// Appender over an engine transaction. Dropping it without a terminal call
/// rolls the transaction back.
struct LocalAppender {
    a: Option<Box<dyn EngineAppender>>,
    metrics: Option<Arc<Metrics>>,
}

impl LocalAppender {
    fn engine(&mut self) -> Result<&mut Box<dyn EngineAppender>> {
        self.a
            .as_mut()
            .ok_or_else(|| Error::Internal("appender already finished".to_string()))
    }

    fn observe<T>(&self, result: std::result::Result<T, EngineError>) -> Result<T> {
        result.map_err(|e| {
            let err = map_engine_error(e);
            if let Some(metrics) = &self.metrics {
                metrics.record_append_failure(&err);
            }
            err
        })
    }
}

impl Appender for LocalAppender {
    fn add(&mut self, labels: &Labels, t: i64, v: f64) -> Result<SeriesRef> {
        let result = self.engine()?.add(to_engine_labels(labels.clone()), t, v);
        self.observe(result).map(SeriesRef::new)
    }

    fn add_fast(&mut self, series: SeriesRef, t: i64, v: f64) -> Result<()> {
        let result = self.engine()?.add_fast(series.id(), t, v);
        self.observe(result)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let mut a = self
            .a
            .take()
            .ok_or_else(|| Error::Internal("appender already finished".to_string()))?;
        a.commit().map_err(map_engine_error)
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        let mut a = self
            .a
            .take()
            .ok_or_else(|| Error::Internal("appender already finished".to_string()))?;
        a.rollback().map_err(map_engine_error)
    }
}

impl Drop for LocalAppender {
    fn drop(&mut self) {
        if let Some(mut a) = self.a.take() {
            tracing::warn!("appender dropped without commit or rollback, rolling back");
            if let Err(e) = a.rollback() {
                tracing::error!("rollback of dropped appender failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOptions;
    use crate::engine::memory::MemoryDb;
    use crate::logging::DiscardSink;
    use crate::model::MatchType;
    use crate::storage::{append_with_ref, collect_series};
    use rstest::rstest;

    fn storage() -> LocalStorage {
        let db = MemoryDb::open(&StorageOptions::default(), Arc::new(DiscardSink));
        LocalStorage::new(db)
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        Labels::from_pairs(pairs.iter().copied())
    }

    #[rstest]
    #[case::not_found(EngineError::NotFound, "not found")]
    #[case::out_of_order(EngineError::OutOfOrderSample, "out of order sample")]
    #[case::amend(EngineError::AmendSample, "duplicate sample for timestamp")]
    #[case::bounds(EngineError::OutOfBounds, "out of bounds")]
    #[case::wrapped(
        EngineError::context("series 1", EngineError::AmendSample),
        "duplicate sample for timestamp"
    )]
    #[case::other(EngineError::Other("disk full".to_string()), "storage error: disk full")]
    fn should_map_engine_errors(#[case] err: EngineError, #[case] expected: &str) {
        // when
        let mapped = map_engine_error(err);

        // then
        assert_eq!(mapped.to_string(), expected);
    }

    #[tokio::test]
    async fn should_write_and_select_through_adapter() {
        // given
        let storage = storage();
        let mut app = storage.appender().unwrap();
        app.add(&labels(&[("job", "api"), ("instance", "h1")]), 100, 1.0)
            .unwrap();
        app.add(&labels(&[("job", "web"), ("instance", "h2")]), 100, 2.0)
            .unwrap();
        app.commit().unwrap();

        // when
        let querier = storage
            .querier(CancellationToken::new(), 0, 1000)
            .await
            .unwrap();
        let matcher = Matcher::new(MatchType::NotEqual, "job", "web").unwrap();
        let mut set = querier.select(&[matcher]).await;
        let series = collect_series(set.as_mut()).unwrap();

        // then
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels(), labels(&[("instance", "h1"), ("job", "api")]));
        assert_eq!(series[0].samples()[0].value, 1.0);
        assert_eq!(storage.start_time().unwrap(), 100);
    }

    #[tokio::test]
    async fn should_fall_back_to_full_add_after_stale_reference() {
        // given
        let storage = storage();
        let series = labels(&[("job", "api")]);
        let mut app = storage.appender().unwrap();
        let r = app.add(&series, 100, 1.0).unwrap();
        app.commit().unwrap();
        let db = MemoryDb::open(&StorageOptions::default(), Arc::new(DiscardSink));
        let storage = LocalStorage::new(db);

        // when
        let mut app = storage.appender().unwrap();
        let stale = app.add_fast(r, 200, 2.0);
        let fresh = append_with_ref(app.as_mut(), Some(r), &series, 200, 2.0).unwrap();
        app.commit().unwrap();

        // then
        assert!(matches!(stale, Err(Error::NotFound)));
        assert_eq!(storage.start_time().unwrap(), 200);
        let mut app = storage.appender().unwrap();
        app.add_fast(fresh, 300, 3.0).unwrap();
        app.commit().unwrap();
    }

    #[tokio::test]
    async fn should_count_rejected_appends() {
        // given
        let metrics = Arc::new(Metrics::new());
        let storage = storage().with_metrics(metrics.clone());
        let mut app = storage.appender().unwrap();
        let r = app.add(&labels(&[("job", "api")]), 100, 1.0).unwrap();

        // when
        let result = app.add_fast(r, 50, 1.0);
        app.rollback().unwrap();

        // then
        assert!(matches!(result, Err(Error::OutOfOrderSample)));
        assert!(metrics.encode().contains("reason=\"OutOfOrder\""));
    }

    #[tokio::test]
    async fn should_roll_back_dropped_appender() {
        // given
        let storage = storage();

        // when
        {
            let mut app = storage.appender().unwrap();
            app.add(&labels(&[("job", "api")]), 100, 1.0).unwrap();
        }
        let mut app = storage.appender().unwrap();
        app.add(&labels(&[("job", "web")]), 100, 1.0).unwrap();
        app.commit().unwrap();

        // then
        let querier = storage
            .querier(CancellationToken::new(), 0, 1000)
            .await
            .unwrap();
        let mut set = querier.select(&[]).await;
        let series = collect_series(set.as_mut()).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels().get("job"), Some("web"));
    }

    #[test]
    fn should_roll_back_appender_without_samples() {
        // given
        let storage = storage();
        let app = storage.appender().unwrap();

        // when
        let result = app.rollback();

        // then
        assert!(result.is_ok());
        let mut app = storage.appender().unwrap();
        app.add(&labels(&[("job", "api")]), 100, 1.0).unwrap();
        app.commit().unwrap();
        assert_eq!(storage.start_time().unwrap(), 100);
    }

    #[tokio::test]
    async fn should_refuse_querier_for_cancelled_context() {
        // given
        let storage = storage();
        let ctx = CancellationToken::new();
        ctx.cancel();

        // when
        let result = storage.querier(ctx, 0, 1000).await;

        // then
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

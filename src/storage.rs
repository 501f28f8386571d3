//! The storage capability contract shared by the local and remote adapters.
//!
//! A query engine talks to any backend through [`Querier`], reads results
//! through [`SeriesSet`] / [`Series`] / [`SeriesIterator`] cursors and writes
//! through an [`Appender`]. Local and remote queriers are interchangeable
//! from the caller's perspective.
//!
//! # Iteration protocol
//!
//! `SeriesSet::next` must be called before every `SeriesSet::at`. Cursors
//! are forward only and must be confined to one task at a time. Errors
//! discovered while producing a set are reported by `err()` once `next()`
//! returns false, never raised mid-iteration.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{Labels, Matcher, Sample, SeriesRef};

/// Cursor over the samples of one series, ordered by increasing timestamp.
pub trait SeriesIterator: Send {
    /// Advances to the first sample with a timestamp `>= t`. Returns false
    /// if no such sample exists. Never moves backwards.
    fn seek(&mut self, t: i64) -> bool;

    /// The current `(timestamp, value)` pair.
    fn at(&self) -> (i64, f64);

    /// Advances to the next sample.
    fn next(&mut self) -> bool;

    fn err(&self) -> Option<&Error>;
}

/// A series exposes its label set and its samples.
pub trait Series: Send {
    fn labels(&self) -> Labels;

    fn iterator(&self) -> Box<dyn SeriesIterator + '_>;
}

/// A lazy, forward-only sequence of series produced by one query.
pub trait SeriesSet: Send {
    fn next(&mut self) -> bool;

    /// The current series. Only valid after `next()` returned true.
    fn at(&self) -> Box<dyn Series + '_>;

    fn err(&self) -> Option<&Error>;
}

/// Read access to a fixed time range of a backend.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Returns the series matching all of the given matchers. Failures are
    /// carried on the returned set's `err()`.
    async fn select(&self, matchers: &[Matcher]) -> Box<dyn SeriesSet>;

    /// Returns all potential values for a label name.
    async fn label_values(&self, name: &str) -> Result<Vec<String>>;

    /// Releases the resources of the querier.
    async fn close(&self) -> Result<()>;
}

/// Creates queriers for a time range.
#[async_trait]
pub trait QuerierFactory: Send + Sync {
    async fn querier(
        &self,
        ctx: CancellationToken,
        mint: i64,
        maxt: i64,
    ) -> Result<Box<dyn Querier>>;
}

/// A write transaction against a storage.
///
/// Exactly one of [`commit`](Appender::commit) or
/// [`rollback`](Appender::rollback) ends the transaction; both consume the
/// appender.
pub trait Appender: Send {
    /// Adds a sample for the series identified by `labels` and returns a
    /// reference usable with [`add_fast`](Appender::add_fast).
    fn add(&mut self, labels: &Labels, t: i64, v: f64) -> Result<SeriesRef>;

    /// Adds a sample for a previously referenced series. Returns
    /// [`Error::NotFound`] when the reference is no longer valid.
    fn add_fast(&mut self, series: SeriesRef, t: i64, v: f64) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A full read/write storage.
pub trait Storage: QuerierFactory {
    /// Opens a new write transaction.
    fn appender(&self) -> Result<Box<dyn Appender>>;

    /// The earliest timestamp retained by the storage.
    fn start_time(&self) -> Result<i64>;

    fn close(&self) -> Result<()>;
}

/// Appends a sample using the cached reference if there is one, falling back
/// to a full add when the reference went stale.
///
/// Returns the reference to cache for the next sample of the series.
pub fn append_with_ref(
    app: &mut dyn Appender,
    series: Option<SeriesRef>,
    labels: &Labels,
    t: i64,
    v: f64,
) -> Result<SeriesRef> {
    if let Some(series) = series {
        match app.add_fast(series, t, v) {
            Ok(()) => return Ok(series),
            Err(Error::NotFound) => {
                tracing::debug!(series = series.id(), "stale series reference, re-adding");
            }
            Err(e) => return Err(e),
        }
    }
    app.add(labels, t, v)
}

/// A querier that never returns any data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQuerier;

#[async_trait]
impl Querier for NoopQuerier {
    async fn select(&self, _matchers: &[Matcher]) -> Box<dyn SeriesSet> {
        Box::new(EmptySeriesSet)
    }

    async fn label_values(&self, _name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A series set without series.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySeriesSet;

impl SeriesSet for EmptySeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Box<dyn Series + '_> {
        Box::new(ConcreteSeries::default())
    }

    fn err(&self) -> Option<&Error> {
        None
    }
}

/// A series set that yields no series and reports an error.
#[derive(Debug)]
pub struct ErrSeriesSet {
    err: Error,
}

impl ErrSeriesSet {
    pub fn new(err: Error) -> Self {
        Self { err }
    }
}

impl SeriesSet for ErrSeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Box<dyn Series + '_> {
        Box::new(ConcreteSeries::default())
    }

    fn err(&self) -> Option<&Error> {
        Some(&self.err)
    }
}

/// A fully materialized series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcreteSeries {
    labels: Labels,
    samples: Vec<Sample>,
}

impl ConcreteSeries {
    /// Creates a series. Samples must be sorted by timestamp.
    pub fn new(labels: Labels, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }

    pub fn labels_ref(&self) -> &Labels {
        &self.labels
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Series for ConcreteSeries {
    fn labels(&self) -> Labels {
        self.labels.clone()
    }

    fn iterator(&self) -> Box<dyn SeriesIterator + '_> {
        Box::new(ListSeriesIterator::new(&self.samples))
    }
}

/// A series set over already decoded series.
#[derive(Debug, Clone, Default)]
pub struct ConcreteSeriesSet {
    series: Vec<ConcreteSeries>,
    // index of the next series to yield
    pos: usize,
}

impl ConcreteSeriesSet {
    pub fn new(series: Vec<ConcreteSeries>) -> Self {
        Self { series, pos: 0 }
    }
}

impl SeriesSet for ConcreteSeriesSet {
    fn next(&mut self) -> bool {
        if self.pos >= self.series.len() {
            return false;
        }
        self.pos += 1;
        true
    }

    fn at(&self) -> Box<dyn Series + '_> {
        match self.pos.checked_sub(1).and_then(|i| self.series.get(i)) {
            Some(series) => Box::new(SeriesView(series)),
            None => Box::new(ConcreteSeries::default()),
        }
    }

    fn err(&self) -> Option<&Error> {
        None
    }
}

/// Borrowed view handed out by [`ConcreteSeriesSet::at`].
struct SeriesView<'a>(&'a ConcreteSeries);

impl Series for SeriesView<'_> {
    fn labels(&self) -> Labels {
        self.0.labels.clone()
    }

    fn iterator(&self) -> Box<dyn SeriesIterator + '_> {
        Box::new(ListSeriesIterator::new(&self.0.samples))
    }
}

/// Iterator over a sorted slice of samples.
#[derive(Debug, Clone)]
pub struct ListSeriesIterator<'a> {
    samples: &'a [Sample],
    // None before the first call to next/seek
    cur: Option<usize>,
}

impl<'a> ListSeriesIterator<'a> {
    pub fn new(samples: &'a [Sample]) -> Self {
        Self { samples, cur: None }
    }
}

impl SeriesIterator for ListSeriesIterator<'_> {
    fn seek(&mut self, t: i64) -> bool {
        let start = self.cur.unwrap_or(0);
        if let Some(cur) = self.cur
            && cur < self.samples.len()
            && self.samples[cur].timestamp >= t
        {
            return true;
        }
        let offset = self.samples[start.min(self.samples.len())..]
            .partition_point(|s| s.timestamp < t);
        let idx = start + offset;
        self.cur = Some(idx);
        idx < self.samples.len()
    }

    fn at(&self) -> (i64, f64) {
        let sample = self.samples[self.cur.unwrap_or(0)];
        (sample.timestamp, sample.value)
    }

    fn next(&mut self) -> bool {
        let next = self.cur.map_or(0, |c| c + 1);
        self.cur = Some(next.min(self.samples.len()));
        next < self.samples.len()
    }

    fn err(&self) -> Option<&Error> {
        None
    }
}

/// Drains a series set into memory, returning its error if it had one.
pub fn collect_series(set: &mut dyn SeriesSet) -> Result<Vec<ConcreteSeries>> {
    let mut out = Vec::new();
    while set.next() {
        let series = set.at();
        let mut samples = Vec::new();
        let mut it = series.iterator();
        while it.next() {
            let (timestamp, value) = it.at();
            samples.push(Sample { timestamp, value });
        }
        if let Some(err) = it.err() {
            return Err(err.clone());
        }
        out.push(ConcreteSeries::new(series.labels(), samples));
    }
    match set.err() {
        Some(err) => Err(err.clone()),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(ts: &[i64]) -> Vec<Sample> {
        ts.iter().map(|&t| Sample::new(t, t as f64)).collect()
    }

    #[test]
    fn should_iterate_samples_in_order() {
        // given
        let samples = samples(&[1, 2, 3]);
        let mut it = ListSeriesIterator::new(&samples);

        // when
        let mut seen = Vec::new();
        while it.next() {
            seen.push(it.at().0);
        }

        // then
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(!it.next());
    }

    #[test]
    fn should_seek_forward_only() {
        // given
        let samples = samples(&[10, 20, 30]);
        let mut it = ListSeriesIterator::new(&samples);

        // when/then
        assert!(it.seek(15));
        assert_eq!(it.at().0, 20);
        assert!(it.seek(5));
        assert_eq!(it.at().0, 20);
        assert!(it.next());
        assert_eq!(it.at().0, 30);
        assert!(!it.seek(31));
    }

    #[test]
    fn should_yield_each_concrete_series_once() {
        // given
        let mut set = ConcreteSeriesSet::new(vec![
            ConcreteSeries::new(Labels::from_pairs([("a", "1")]), samples(&[1])),
            ConcreteSeries::new(Labels::from_pairs([("a", "2")]), samples(&[2])),
        ]);

        // when
        let collected = collect_series(&mut set).unwrap();

        // then
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].labels().get("a"), Some("2"));
        assert!(!set.next());
    }

    #[test]
    fn should_report_error_without_series() {
        // given
        let mut set = ErrSeriesSet::new(Error::RemoteUnavailable("boom".to_string()));

        // when/then
        assert!(!set.next());
        assert!(matches!(set.err(), Some(Error::RemoteUnavailable(_))));
    }

    #[tokio::test]
    async fn should_return_nothing_from_noop_querier() {
        // given
        let querier = NoopQuerier;

        // when
        let mut set = querier.select(&[Matcher::equal("job", "api")]).await;

        // then
        assert!(!set.next());
        assert!(set.err().is_none());
        assert!(querier.label_values("job").await.unwrap().is_empty());
    }

    struct StaleAppender {
        added: Vec<(Labels, i64)>,
    }

    impl Appender for StaleAppender {
        fn add(&mut self, labels: &Labels, t: i64, _v: f64) -> Result<SeriesRef> {
            self.added.push((labels.clone(), t));
            Ok(SeriesRef::new(7))
        }

        fn add_fast(&mut self, _series: SeriesRef, _t: i64, _v: f64) -> Result<()> {
            Err(Error::NotFound)
        }

        fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }

        fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn should_fall_back_to_add_on_stale_reference() {
        // given
        let mut app = StaleAppender { added: Vec::new() };
        let labels = Labels::from_pairs([("job", "api")]);

        // when
        let series = append_with_ref(&mut app, Some(SeriesRef::new(1)), &labels, 100, 1.0).unwrap();

        // then
        assert_eq!(series, SeriesRef::new(7));
        assert_eq!(app.added, vec![(labels, 100)]);
    }
}

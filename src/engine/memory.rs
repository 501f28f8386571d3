//! In-memory implementation of the engine contract.
//!
//! All data lives in a single head. Committed samples of a series are kept in
//! a copy-on-write vector so that queriers see a stable view while appenders
//! keep committing. Series sets are produced lazily: matching and range
//! filtering happen as the caller advances the cursor.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::StorageOptions;
use crate::engine::labels::{Label, Labels, Matcher};
use crate::engine::{
    Db, EngineAppender, EngineError, EngineQuerier, EngineResult, EngineSeries, EngineSeriesSet,
};
use crate::logging::LogSink;
use crate::model::Sample;
use crate::storage::{ListSeriesIterator, SeriesIterator};

struct MemSeries {
    labels: Arc<Labels>,
    samples: Arc<Vec<Sample>>,
}

impl MemSeries {
    fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }
}

#[derive(Default)]
struct Head {
    series: HashMap<u64, MemSeries>,
    refs: HashMap<Arc<Labels>, u64>,
    // newest committed timestamp, i64::MIN while empty
    max_time: i64,
    closed: bool,
}

impl Head {
    fn new() -> Self {
        Self {
            max_time: i64::MIN,
            ..Default::default()
        }
    }

    /// Drops samples with a timestamp before `mint` and garbage collects
    /// series left without samples. Returns the number of removed series.
    fn truncate(&mut self, mint: i64) -> usize {
        self.retain_samples(|_, s| s.timestamp >= mint)
    }

    fn retain_samples(&mut self, mut keep: impl FnMut(&[Label], &Sample) -> bool) -> usize {
        let mut removed = Vec::new();
        for (id, series) in self.series.iter_mut() {
            let labels = Arc::clone(&series.labels);
            if series.samples.iter().all(|s| keep(labels.as_slice(), s)) {
                continue;
            }
            Arc::make_mut(&mut series.samples).retain(|s| keep(labels.as_slice(), s));
            if series.samples.is_empty() {
                removed.push(*id);
            }
        }
        for id in &removed {
            if let Some(series) = self.series.remove(id) {
                self.refs.remove(&series.labels);
            }
        }
        removed.len()
    }
}

/// An in-memory database.
pub struct MemoryDb {
    head: Arc<RwLock<Head>>,
    next_ref: Arc<AtomicU64>,
    // width of the writable window behind the newest sample, in ms
    block_range: i64,
    // zero disables retention
    retention: i64,
    log: Arc<dyn LogSink>,
}

impl MemoryDb {
    /// Opens an empty database.
    pub fn open(options: &StorageOptions, log: Arc<dyn LogSink>) -> Arc<Self> {
        let block_range = i64::try_from(options.min_block_duration.as_millis()).unwrap_or(i64::MAX);
        let retention = i64::try_from(options.retention.as_millis()).unwrap_or(i64::MAX);
        log.record(&[
            ("msg", "opened in-memory db".to_string()),
            ("block_range", block_range.to_string()),
            ("retention", retention.to_string()),
        ]);
        Arc::new(Self {
            head: Arc::new(RwLock::new(Head::new())),
            next_ref: Arc::new(AtomicU64::new(1)),
            block_range,
            retention,
            log,
        })
    }

    /// Drops all samples older than `mint`. References to series that lose
    /// all their samples become invalid.
    pub fn truncate(&self, mint: i64) -> EngineResult<()> {
        let mut head = write(&self.head)?;
        let removed = head.truncate(mint);
        self.log.record(&[
            ("msg", "head truncated".to_string()),
            ("mint", mint.to_string()),
            ("removed_series", removed.to_string()),
        ]);
        Ok(())
    }

    /// Number of series currently held.
    pub fn num_series(&self) -> usize {
        self.head.read().map(|h| h.series.len()).unwrap_or(0)
    }
}

fn read(head: &RwLock<Head>) -> EngineResult<RwLockReadGuard<'_, Head>> {
    let guard = head
        .read()
        .map_err(|_| EngineError::Other("head lock poisoned".to_string()))?;
    if guard.closed {
        return Err(EngineError::Closed);
    }
    Ok(guard)
}

fn write(head: &RwLock<Head>) -> EngineResult<RwLockWriteGuard<'_, Head>> {
    let guard = head
        .write()
        .map_err(|_| EngineError::Other("head lock poisoned".to_string()))?;
    if guard.closed {
        return Err(EngineError::Closed);
    }
    Ok(guard)
}

impl Db for MemoryDb {
    fn querier(&self, mint: i64, maxt: i64) -> EngineResult<Box<dyn EngineQuerier>> {
        let head = read(&self.head)?;
        let mut series: Vec<SnapshotSeries> = head
            .series
            .values()
            .map(|s| SnapshotSeries {
                labels: Arc::clone(&s.labels),
                samples: Arc::clone(&s.samples),
            })
            .collect();
        series.sort_by(|a, b| a.labels.cmp(&b.labels));
        Ok(Box::new(MemQuerier {
            series: Arc::new(series),
            mint,
            maxt,
        }))
    }

    fn appender(&self) -> Box<dyn EngineAppender> {
        let min_valid_time = match self.head.read() {
            Ok(head) if head.max_time != i64::MIN => head.max_time.saturating_sub(self.block_range / 2),
            _ => i64::MIN,
        };
        Box::new(MemAppender {
            head: Arc::clone(&self.head),
            next_ref: Arc::clone(&self.next_ref),
            log: Arc::clone(&self.log),
            retention: self.retention,
            min_valid_time,
            created: Vec::new(),
            pending: Vec::new(),
        })
    }

    fn start_time(&self) -> EngineResult<i64> {
        let head = read(&self.head)?;
        Ok(head
            .series
            .values()
            .filter_map(|s| s.samples.first().map(|f| f.timestamp))
            .min()
            .unwrap_or(i64::MAX))
    }

    fn close(&self) -> EngineResult<()> {
        let mut head = write(&self.head)?;
        head.closed = true;
        head.series.clear();
        head.refs.clear();
        self.log.record(&[("msg", "db closed".to_string())]);
        Ok(())
    }

    fn delete(&self, mint: i64, maxt: i64, matchers: &[Matcher]) -> EngineResult<()> {
        let mut head = write(&self.head)?;
        let removed = head.retain_samples(|labels, s| {
            !(s.timestamp >= mint
                && s.timestamp <= maxt
                && matchers.iter().all(|m| m.matches_labels(labels)))
        });
        self.log.record(&[
            ("msg", "series deleted".to_string()),
            ("mint", mint.to_string()),
            ("maxt", maxt.to_string()),
            ("removed_series", removed.to_string()),
        ]);
        Ok(())
    }
}

struct SnapshotSeries {
    labels: Arc<Labels>,
    samples: Arc<Vec<Sample>>,
}

struct MemQuerier {
    series: Arc<Vec<SnapshotSeries>>,
    mint: i64,
    maxt: i64,
}

impl MemQuerier {
    fn in_range(&self, samples: &[Sample]) -> (usize, usize) {
        let start = samples.partition_point(|s| s.timestamp < self.mint);
        let end = samples.partition_point(|s| s.timestamp <= self.maxt);
        (start, end.max(start))
    }
}

impl EngineQuerier for MemQuerier {
    fn select(&self, matchers: &[Matcher]) -> Box<dyn EngineSeriesSet> {
        Box::new(MemSeriesSet {
            series: Arc::clone(&self.series),
            matchers: matchers.to_vec(),
            mint: self.mint,
            maxt: self.maxt,
            pos: 0,
            current: RangeSeries::default(),
        })
    }

    fn label_values(&self, name: &str) -> EngineResult<Vec<String>> {
        let values: BTreeSet<&str> = self
            .series
            .iter()
            .filter(|s| {
                let (start, end) = self.in_range(&s.samples);
                start < end
            })
            .filter_map(|s| super::labels::get(&s.labels, name))
            .collect();
        Ok(values.into_iter().map(str::to_string).collect())
    }

    fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

struct MemSeriesSet {
    series: Arc<Vec<SnapshotSeries>>,
    matchers: Vec<Matcher>,
    mint: i64,
    maxt: i64,
    pos: usize,
    current: RangeSeries,
}

impl EngineSeriesSet for MemSeriesSet {
    fn next(&mut self) -> bool {
        while let Some(candidate) = self.series.get(self.pos) {
            self.pos += 1;
            if !self.matchers.iter().all(|m| m.matches_labels(&candidate.labels)) {
                continue;
            }
            let start = candidate.samples.partition_point(|s| s.timestamp < self.mint);
            let end = candidate.samples.partition_point(|s| s.timestamp <= self.maxt);
            if start >= end {
                continue;
            }
            self.current = RangeSeries {
                labels: Arc::clone(&candidate.labels),
                samples: Arc::clone(&candidate.samples),
                start,
                end,
            };
            return true;
        }
        false
    }

    fn at(&self) -> &dyn EngineSeries {
        &self.current
    }

    fn err(&self) -> Option<&EngineError> {
        None
    }
}

/// A series restricted to the samples inside the querier's time range.
#[derive(Default)]
struct RangeSeries {
    labels: Arc<Labels>,
    samples: Arc<Vec<Sample>>,
    start: usize,
    end: usize,
}

impl EngineSeries for RangeSeries {
    fn labels(&self) -> &[Label] {
        &self.labels
    }

    fn iterator(&self) -> Box<dyn SeriesIterator + '_> {
        Box::new(ListSeriesIterator::new(&self.samples[self.start..self.end]))
    }
}

struct MemAppender {
    head: Arc<RwLock<Head>>,
    next_ref: Arc<AtomicU64>,
    log: Arc<dyn LogSink>,
    retention: i64,
    min_valid_time: i64,
    // series first seen in this transaction
    created: Vec<(u64, Arc<Labels>)>,
    pending: Vec<(u64, Sample)>,
}

impl MemAppender {
    fn last_pending(&self, series: u64) -> Option<Sample> {
        self.pending
            .iter()
            .rev()
            .find(|(id, _)| *id == series)
            .map(|(_, s)| *s)
    }
}

impl EngineAppender for MemAppender {
    fn add(&mut self, labels: Labels, t: i64, v: f64) -> EngineResult<u64> {
        if t < self.min_valid_time {
            return Err(EngineError::OutOfBounds);
        }
        let existing = {
            let head = read(&self.head)?;
            head.refs.get(&labels).copied()
        };
        let id = match existing {
            Some(id) => id,
            None => match self.created.iter().find(|(_, l)| **l == labels) {
                Some((id, _)) => *id,
                None => {
                    let id = self.next_ref.fetch_add(1, Ordering::Relaxed);
                    self.created.push((id, Arc::new(labels)));
                    id
                }
            },
        };
        self.add_fast(id, t, v)
            .map_err(|e| EngineError::context(format!("series {}", id), e))?;
        Ok(id)
    }

    fn add_fast(&mut self, series: u64, t: i64, v: f64) -> EngineResult<()> {
        if t < self.min_valid_time {
            return Err(EngineError::OutOfBounds);
        }
        let committed = {
            let head = read(&self.head)?;
            head.series.get(&series).map(MemSeries::last)
        };
        let last = match committed {
            Some(last) => self.last_pending(series).or(last),
            None if self.created.iter().any(|(id, _)| *id == series) => self.last_pending(series),
            None => return Err(EngineError::NotFound),
        };
        if let Some(last) = last {
            if t < last.timestamp {
                return Err(EngineError::OutOfOrderSample);
            }
            if t == last.timestamp {
                if v.to_bits() != last.value.to_bits() {
                    return Err(EngineError::AmendSample);
                }
                // identical duplicate, nothing to do
                return Ok(());
            }
        }
        self.pending.push((series, Sample::new(t, v)));
        Ok(())
    }

    fn commit(&mut self) -> EngineResult<()> {
        let mut head = write(&self.head)?;
        let mut remap = HashMap::new();
        for (id, labels) in self.created.drain(..) {
            if !self.pending.iter().any(|(p, _)| *p == id) {
                continue;
            }
            match head.refs.get(&labels) {
                // another appender committed the same series first
                Some(&existing) => {
                    remap.insert(id, existing);
                }
                None => {
                    head.refs.insert(Arc::clone(&labels), id);
                    head.series.insert(
                        id,
                        MemSeries {
                            labels,
                            samples: Arc::new(Vec::new()),
                        },
                    );
                }
            }
        }

        let mut dropped = 0usize;
        let mut max_time = head.max_time;
        for (id, sample) in self.pending.drain(..) {
            let id = remap.get(&id).copied().unwrap_or(id);
            let Some(series) = head.series.get_mut(&id) else {
                dropped += 1;
                continue;
            };
            if series.last().is_some_and(|l| l.timestamp >= sample.timestamp) {
                dropped += 1;
                continue;
            }
            Arc::make_mut(&mut series.samples).push(sample);
            max_time = max_time.max(sample.timestamp);
        }
        head.max_time = max_time;
        if dropped > 0 {
            self.log.record(&[
                ("msg", "dropped samples on commit".to_string()),
                ("count", dropped.to_string()),
            ]);
        }

        if self.retention > 0 && max_time != i64::MIN {
            let removed = head.truncate(max_time.saturating_sub(self.retention));
            if removed > 0 {
                self.log.record(&[
                    ("msg", "retention cutoff applied".to_string()),
                    ("removed_series", removed.to_string()),
                ]);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> EngineResult<()> {
        self.created.clear();
        self.pending.clear();
        Ok(())
    }
}

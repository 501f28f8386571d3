//! Capability contract of the embedded storage engine.
//!
//! The federation layer consumes an engine only through these traits. The
//! engine has its own label and matcher representation ([`labels`]) and its
//! own error type ([`EngineError`]); the local adapter translates both at the
//! boundary. [`memory::MemoryDb`] is an in-memory implementation.

pub mod labels;
pub mod memory;

use thiserror::Error;

use crate::storage::SeriesIterator;

pub use labels::{Label, Labels, Matcher};

/// Errors reported by the embedded engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("not found")]
    NotFound,

    #[error("out of order sample")]
    OutOfOrderSample,

    #[error("amending sample")]
    AmendSample,

    #[error("out of bounds")]
    OutOfBounds,

    /// The engine does not provide this capability.
    #[error("{0} not supported")]
    Unsupported(&'static str),

    #[error("db closed")]
    Closed,

    #[error("{0}")]
    Other(String),

    /// An error annotated with context by the engine.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn context(context: impl Into<String>, source: EngineError) -> Self {
        EngineError::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, with all context layers removed.
    pub fn cause(&self) -> &EngineError {
        let mut err = self;
        while let EngineError::Context { source, .. } = err {
            err = source;
        }
        err
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A series as returned by the engine.
pub trait EngineSeries: Send + Sync {
    fn labels(&self) -> &[Label];

    fn iterator(&self) -> Box<dyn SeriesIterator + '_>;
}

/// Cursor over the series produced by an engine query.
pub trait EngineSeriesSet: Send {
    fn next(&mut self) -> bool;

    fn at(&self) -> &dyn EngineSeries;

    fn err(&self) -> Option<&EngineError>;
}

/// Read access to a time range of the engine.
pub trait EngineQuerier: Send + Sync {
    fn select(&self, matchers: &[Matcher]) -> Box<dyn EngineSeriesSet>;

    fn label_values(&self, name: &str) -> EngineResult<Vec<String>>;

    fn close(&self) -> EngineResult<()>;
}

/// An open write transaction of the engine.
pub trait EngineAppender: Send {
    /// Adds a sample and returns a reference to its series.
    fn add(&mut self, labels: Labels, t: i64, v: f64) -> EngineResult<u64>;

    fn add_fast(&mut self, series: u64, t: i64, v: f64) -> EngineResult<()>;

    fn commit(&mut self) -> EngineResult<()>;

    fn rollback(&mut self) -> EngineResult<()>;
}

/// The embedded database.
///
/// Administrative capabilities have default implementations returning
/// [`EngineError::Unsupported`] so that an engine only overrides what it
/// actually provides.
pub trait Db: Send + Sync {
    fn querier(&self, mint: i64, maxt: i64) -> EngineResult<Box<dyn EngineQuerier>>;

    fn appender(&self) -> Box<dyn EngineAppender>;

    /// The earliest timestamp the engine retains, `i64::MAX` if it holds no data.
    fn start_time(&self) -> EngineResult<i64>;

    fn close(&self) -> EngineResult<()>;

    /// Reloads persisted blocks from disk.
    fn reload(&self) -> EngineResult<()> {
        Err(EngineError::Unsupported("reload"))
    }

    /// Writes a snapshot and returns its name.
    fn snapshot(&self, _with_head: bool) -> EngineResult<String> {
        Err(EngineError::Unsupported("snapshot"))
    }

    /// Deletes the samples in `[mint, maxt]` of all series matching `matchers`.
    fn delete(&self, _mint: i64, _maxt: i64, _matchers: &[Matcher]) -> EngineResult<()> {
        Err(EngineError::Unsupported("delete series"))
    }
}

//! Series set decorator stripping external labels from results.

use std::collections::BTreeSet;

use crate::error::Error;
use crate::model::Labels;
use crate::storage::{Series, SeriesIterator, SeriesSet};

/// Wraps a series set and removes the labels named in `to_filter` from
/// every series it yields. Labels are filtered when they are read.
pub struct SeriesSetFilter {
    inner: Box<dyn SeriesSet>,
    to_filter: BTreeSet<String>,
}

impl SeriesSetFilter {
    pub fn new(inner: Box<dyn SeriesSet>, to_filter: BTreeSet<String>) -> Self {
        Self { inner, to_filter }
    }
}

impl SeriesSet for SeriesSetFilter {
    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn at(&self) -> Box<dyn Series + '_> {
        Box::new(SeriesFilter {
            inner: self.inner.at(),
            to_filter: &self.to_filter,
        })
    }

    fn err(&self) -> Option<&Error> {
        self.inner.err()
    }
}

/// A series whose labels exclude a fixed set of names.
pub struct SeriesFilter<'a> {
    inner: Box<dyn Series + 'a>,
    to_filter: &'a BTreeSet<String>,
}

impl Series for SeriesFilter<'_> {
    fn labels(&self) -> Labels {
        let mut labels = self.inner.labels();
        labels.retain(|l| !self.to_filter.contains(&l.name));
        labels
    }

    fn iterator(&self) -> Box<dyn SeriesIterator + '_> {
        self.inner.iterator()
    }
}

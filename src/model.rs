//! Query-engine facing data model.
//!
//! These are the label, matcher and sample types that callers of a
//! [`Querier`](crate::storage::Querier) or [`Appender`](crate::storage::Appender)
//! work with. Both the local and the remote adapters translate to and from
//! this representation.

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// A label is a name/value pair attached to a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A set of labels identifying a series, kept sorted by name.
///
/// Label names are unique within a set. Membership tests are name based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Creates a label set, sorting the labels by name.
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort();
        labels.dedup_by(|a, b| a.name == b.name);
        Self(labels)
    }

    /// Creates a label set from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, value)| Label::new(name, value))
                .collect(),
        )
    }

    /// Wraps labels that are already sorted and unique by name.
    pub(crate) fn from_sorted(labels: Vec<Label>) -> Self {
        debug_assert!(labels.windows(2).all(|w| w[0].name < w[1].name));
        Self(labels)
    }

    /// Returns the value of the label with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Keeps only the labels for which `f` returns true, preserving order.
    pub fn retain(&mut self, f: impl FnMut(&Label) -> bool) {
        self.0.retain(f)
    }

    pub fn into_inner(self) -> Vec<Label> {
        self.0
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Labels {
    type Item = Label;
    type IntoIter = std::vec::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

/// The kind of comparison a [`Matcher`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    Equal,
    NotEqual,
    RegexMatch,
    NotRegexMatch,
}

impl MatchType {
    fn is_regex(self) -> bool {
        matches!(self, MatchType::RegexMatch | MatchType::NotRegexMatch)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            MatchType::Equal => "=",
            MatchType::NotEqual => "!=",
            MatchType::RegexMatch => "=~",
            MatchType::NotRegexMatch => "!~",
        };
        f.write_str(op)
    }
}

/// A predicate over the value of one label.
///
/// Regex matchers are compiled (fully anchored) when the matcher is
/// constructed, so a bad pattern is rejected before it reaches a read path.
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    value: String,
    kind: MatchType,
    re: Option<Regex>,
}

impl Matcher {
    /// Creates a matcher, compiling the pattern for regex kinds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pattern is not a valid regex.
    pub fn new(kind: MatchType, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        let re = if kind.is_regex() {
            Some(compile_anchored(&value).map_err(|e| {
                Error::Configuration(format!("invalid regex for label {}: {}", name, e))
            })?)
        } else {
            None
        };
        Ok(Self {
            name,
            value,
            kind,
            re,
        })
    }

    /// Creates an equality matcher. Never fails.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: MatchType::Equal,
            re: None,
        }
    }

    /// Creates an inequality matcher. Never fails.
    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: MatchType::NotEqual,
            ..Self::equal(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> MatchType {
        self.kind
    }

    /// The compiled pattern of a regex matcher.
    pub(crate) fn regex(&self) -> Option<&Regex> {
        self.re.as_ref()
    }

    /// Whether the given label value satisfies this matcher. A missing label
    /// is matched as the empty string.
    pub fn matches(&self, value: &str) -> bool {
        match (self.kind, &self.re) {
            (MatchType::Equal, _) => self.value == value,
            (MatchType::NotEqual, _) => self.value != value,
            (MatchType::RegexMatch, Some(re)) => re.is_match(value),
            (MatchType::NotRegexMatch, Some(re)) => !re.is_match(value),
            // unreachable through the constructors
            (_, None) => false,
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name && self.value == other.value
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.kind, self.value)
    }
}

/// Compiles `pattern` so that it must match the whole label value.
pub(crate) fn compile_anchored(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

/// An opaque reference to a series returned by an append, valid for fast
/// re-appends until the engine invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesRef(u64);

impl SeriesRef {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// A single timestamped value. Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn should_sort_labels_by_name() {
        // given
        let labels = Labels::from_pairs([("job", "api"), ("__name__", "up"), ("instance", "h1")]);

        // when
        let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();

        // then
        assert_eq!(names, vec!["__name__", "instance", "job"]);
        assert_eq!(labels.get("job"), Some("api"));
        assert_eq!(labels.get("region"), None);
    }

    #[test]
    fn should_keep_one_label_per_name() {
        // given/when
        let labels = Labels::from_pairs([("job", "a"), ("job", "b")]);

        // then
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn should_reject_invalid_regex_at_construction() {
        // when
        let result = Matcher::new(MatchType::RegexMatch, "job", "api(");

        // then
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[rstest]
    #[case::equal(MatchType::Equal, "api", "api", true)]
    #[case::equal_miss(MatchType::Equal, "api", "web", false)]
    #[case::not_equal(MatchType::NotEqual, "api", "web", true)]
    #[case::regex_anchored(MatchType::RegexMatch, "ap", "api", false)]
    #[case::regex(MatchType::RegexMatch, "a.*", "api", true)]
    #[case::not_regex(MatchType::NotRegexMatch, "a.*", "web", true)]
    #[case::empty_value(MatchType::Equal, "", "", true)]
    fn should_match_label_values(
        #[case] kind: MatchType,
        #[case] pattern: &str,
        #[case] value: &str,
        #[case] expected: bool,
    ) {
        // given
        let matcher = Matcher::new(kind, "job", pattern).unwrap();

        // when/then
        assert_eq!(matcher.matches(value), expected);
    }

    #[test]
    fn should_format_labels_and_matchers() {
        // given
        let labels = Labels::from_pairs([("job", "api"), ("instance", "h1")]);
        let matcher = Matcher::new(MatchType::NotRegexMatch, "job", "a.*").unwrap();

        // then
        assert_eq!(labels.to_string(), r#"{instance="h1", job="api"}"#);
        assert_eq!(matcher.to_string(), r#"job!~"a.*""#);
    }
}

//! Native label and matcher types of the embedded engine.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Labels sorted by name.
pub type Labels = Vec<Label>;

/// Returns the value of `name` in a sorted label slice.
pub fn get<'a>(labels: &'a [Label], name: &str) -> Option<&'a str> {
    labels
        .binary_search_by(|l| l.name.as_str().cmp(name))
        .ok()
        .map(|i| labels[i].value.as_str())
}

/// A composable label matcher. Inequality and negative regex matching are
/// expressed by wrapping the positive matcher in [`Matcher::Not`].
#[derive(Debug, Clone)]
pub enum Matcher {
    Equal {
        name: String,
        value: String,
    },
    Regexp {
        name: String,
        pattern: String,
        re: Regex,
    },
    Not(Box<Matcher>),
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher::Equal {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn not(self) -> Self {
        Matcher::Not(Box::new(self))
    }

    pub fn name(&self) -> &str {
        match self {
            Matcher::Equal { name, .. } | Matcher::Regexp { name, .. } => name,
            Matcher::Not(inner) => inner.name(),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Equal { value: expected, .. } => expected == value,
            Matcher::Regexp { re, .. } => re.is_match(value),
            Matcher::Not(inner) => !inner.matches(value),
        }
    }

    /// Whether a series with the given labels satisfies the matcher. Missing
    /// labels match as the empty string.
    pub fn matches_labels(&self, labels: &[Label]) -> bool {
        self.matches(get(labels, self.name()).unwrap_or(""))
    }
}

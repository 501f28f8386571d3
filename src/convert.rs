//! Conversions between the query-engine representation ([`crate::model`])
//! and the embedded engine representation ([`crate::engine::labels`]).
//!
//! Label conversions move the strings instead of copying them. Matchers map
//! one to one: `NotEqual` and `NotRegexMatch` become the engine's `Not`
//! wrapper around the positive matcher.

use crate::engine;
use crate::error::{Error, Result};
use crate::model::{Label, Labels, MatchType, Matcher};

/// Converts a matcher to the engine representation.
///
/// Regex matchers reuse the pattern compiled when the matcher was built.
///
/// # Errors
///
/// Returns [`Error::Internal`] if a regex matcher carries no compiled
/// pattern, which the [`Matcher`] constructors rule out.
pub fn to_engine_matcher(m: &Matcher) -> Result<engine::Matcher> {
    let regexp = || -> Result<engine::Matcher> {
        let re = m.regex().cloned().ok_or_else(|| {
            Error::Internal(format!("regex matcher {} without compiled pattern", m))
        })?;
        Ok(engine::Matcher::Regexp {
            name: m.name().to_string(),
            pattern: m.value().to_string(),
            re,
        })
    };
    let converted = match m.kind() {
        MatchType::Equal => engine::Matcher::equal(m.name(), m.value()),
        MatchType::NotEqual => engine::Matcher::equal(m.name(), m.value()).not(),
        MatchType::RegexMatch => regexp()?,
        MatchType::NotRegexMatch => regexp()?.not(),
    };
    Ok(converted)
}

/// Converts an engine matcher back to the query-engine representation.
///
/// # Errors
///
/// Returns [`Error::Internal`] for engine matchers with no query-engine
/// counterpart, such as a double negation.
pub fn from_engine_matcher(m: &engine::Matcher) -> Result<Matcher> {
    let (kind, name, value) = match m {
        engine::Matcher::Equal { name, value } => (MatchType::Equal, name, value),
        engine::Matcher::Regexp { name, pattern, .. } => (MatchType::RegexMatch, name, pattern),
        engine::Matcher::Not(inner) => match inner.as_ref() {
            engine::Matcher::Equal { name, value } => (MatchType::NotEqual, name, value),
            engine::Matcher::Regexp { name, pattern, .. } => {
                (MatchType::NotRegexMatch, name, pattern)
            }
            engine::Matcher::Not(_) => {
                return Err(Error::Internal(format!(
                    "invalid matcher type: nested negation on {}",
                    m.name()
                )));
            }
        },
    };
    Matcher::new(kind, name.as_str(), value.as_str())
}

/// Converts a list of matchers, failing on the first invalid one.
pub fn to_engine_matchers(matchers: &[Matcher]) -> Result<Vec<engine::Matcher>> {
    matchers.iter().map(to_engine_matcher).collect()
}

/// Converts labels to the engine representation, reusing the allocations.
pub fn to_engine_labels(labels: Labels) -> engine::Labels {
    labels
        .into_inner()
        .into_iter()
        .map(|Label { name, value }| engine::Label { name, value })
        .collect()
}

/// Converts engine labels to the query-engine representation, reusing the
/// allocations. Engine labels are already sorted by name.
pub fn from_engine_labels(labels: engine::Labels) -> Labels {
    Labels::from_sorted(
        labels
            .into_iter()
            .map(|engine::Label { name, value }| Label { name, value })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::equal(MatchType::Equal)]
    #[case::not_equal(MatchType::NotEqual)]
    #[case::regex(MatchType::RegexMatch)]
    #[case::not_regex(MatchType::NotRegexMatch)]
    fn should_round_trip_matchers(#[case] kind: MatchType) {
        // given
        let matcher = Matcher::new(kind, "job", "api|web").unwrap();

        // when
        let converted = to_engine_matcher(&matcher).unwrap();
        let back = from_engine_matcher(&converted).unwrap();

        // then
        assert_eq!(back, matcher);
    }

    #[test]
    fn should_model_negative_matchers_as_not() {
        // given
        let matcher = Matcher::new(MatchType::NotRegexMatch, "job", "a.*").unwrap();

        // when
        let converted = to_engine_matcher(&matcher).unwrap();

        // then
        assert!(matches!(&converted, engine::Matcher::Not(inner)
            if matches!(inner.as_ref(), engine::Matcher::Regexp { .. })));
    }

    #[test]
    fn should_reject_nested_negation() {
        // given
        let matcher = engine::Matcher::equal("job", "api").not().not();

        // when
        let result = from_engine_matcher(&matcher);

        // then
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    fn label_values() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-z_]{1,8}", "[a-z0-9]{0,8}"), 0..8)
    }

    proptest! {
        #[test]
        fn should_round_trip_labels(pairs in label_values()) {
            let labels = Labels::from_pairs(pairs);

            let back = from_engine_labels(to_engine_labels(labels.clone()));

            prop_assert_eq!(back, labels);
        }

        #[test]
        fn should_match_complement_of_positive_matcher(
            pattern in "[a-c]{1,3}\\*?",
            value in "[a-d]{0,4}",
        ) {
            let positive = Matcher::new(MatchType::RegexMatch, "l", pattern.clone()).unwrap();
            let negative = Matcher::new(MatchType::NotRegexMatch, "l", pattern).unwrap();
            let equal = Matcher::equal("l", value.clone());
            let not_equal = Matcher::not_equal("l", value.clone());

            let pos = to_engine_matcher(&positive).unwrap();
            let neg = to_engine_matcher(&negative).unwrap();
            prop_assert_eq!(neg.matches(&value), !pos.matches(&value));

            let eq = to_engine_matcher(&equal).unwrap();
            let ne = to_engine_matcher(&not_equal).unwrap();
            for candidate in [value.as_str(), "x", ""] {
                prop_assert_eq!(ne.matches(candidate), !eq.matches(candidate));
            }
        }
    }
}

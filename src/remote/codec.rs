//! Conversions between the remote read protocol and the query-engine model.

use super::proto;
use crate::error::{Error, Result};
use crate::model::{Label, Labels, MatchType, Matcher, Sample};
use crate::storage::{ConcreteSeries, ConcreteSeriesSet};

/// Builds a remote query for `[mint, maxt]`.
pub fn to_query(mint: i64, maxt: i64, matchers: &[Matcher]) -> proto::Query {
    proto::Query {
        start_timestamp_ms: mint,
        end_timestamp_ms: maxt,
        matchers: matchers.iter().map(to_label_matcher).collect(),
    }
}

/// Decodes a remote query into its time range and matchers.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for an unknown matcher type or an
/// invalid regex.
pub fn from_query(query: &proto::Query) -> Result<(i64, i64, Vec<Matcher>)> {
    let matchers = from_label_matchers(&query.matchers)?;
    Ok((query.start_timestamp_ms, query.end_timestamp_ms, matchers))
}

fn to_label_matcher(m: &Matcher) -> proto::LabelMatcher {
    let kind = match m.kind() {
        MatchType::Equal => proto::MatcherType::Eq,
        MatchType::NotEqual => proto::MatcherType::Neq,
        MatchType::RegexMatch => proto::MatcherType::Re,
        MatchType::NotRegexMatch => proto::MatcherType::Nre,
    };
    proto::LabelMatcher {
        r#type: kind as i32,
        name: m.name().to_string(),
        value: m.value().to_string(),
    }
}

/// Decodes protocol matchers, failing on the first invalid one.
pub fn from_label_matchers(matchers: &[proto::LabelMatcher]) -> Result<Vec<Matcher>> {
    matchers
        .iter()
        .map(|m| {
            let kind = match proto::MatcherType::try_from(m.r#type) {
                Ok(proto::MatcherType::Eq) => MatchType::Equal,
                Ok(proto::MatcherType::Neq) => MatchType::NotEqual,
                Ok(proto::MatcherType::Re) => MatchType::RegexMatch,
                Ok(proto::MatcherType::Nre) => MatchType::NotRegexMatch,
                Err(_) => {
                    return Err(Error::Configuration(format!(
                        "invalid matcher type {} for label {}",
                        m.r#type, m.name
                    )));
                }
            };
            Matcher::new(kind, m.name.as_str(), m.value.as_str())
        })
        .collect()
}

/// Decodes a remote result into a series set.
///
/// Backends make no ordering promise, so labels are sorted by name, samples
/// by timestamp and the series by their label sets.
pub fn from_query_result(result: proto::QueryResult) -> ConcreteSeriesSet {
    let mut series: Vec<ConcreteSeries> = result
        .timeseries
        .into_iter()
        .map(|ts| {
            let labels = Labels::new(
                ts.labels
                    .into_iter()
                    .map(|l| Label::new(l.name, l.value))
                    .collect(),
            );
            let mut samples: Vec<Sample> = ts
                .samples
                .into_iter()
                .map(|s| Sample::new(s.timestamp, s.value))
                .collect();
            samples.sort_by_key(|s| s.timestamp);
            ConcreteSeries::new(labels, samples)
        })
        .collect();
    series.sort_by(|a, b| a.labels_ref().cmp(b.labels_ref()));
    ConcreteSeriesSet::new(series)
}

/// Encodes series into a remote result.
pub fn to_query_result(series: &[ConcreteSeries]) -> proto::QueryResult {
    proto::QueryResult {
        timeseries: series
            .iter()
            .map(|s| proto::TimeSeries {
                labels: s
                    .labels_ref()
                    .iter()
                    .map(|l| proto::LabelPair {
                        name: l.name.clone(),
                        value: l.value.clone(),
                    })
                    .collect(),
                samples: s
                    .samples()
                    .iter()
                    .map(|s| proto::Sample {
                        value: s.value,
                        timestamp: s.timestamp,
                    })
                    .collect(),
            })
            .collect(),
    }
}

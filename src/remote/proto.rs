//! Protobuf messages of the remote read protocol.
//!
//! The messages derive both `prost::Message` and serde so a backend can be
//! spoken to in binary protobuf or ProtoJSON. Transport is up to the
//! [`ReadClient`](super::client::ReadClient) implementation.

use prost::Message;
use serde::{Deserialize, Serialize};

/// Comparison performed by a [`LabelMatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    Eq = 0,
    Neq = 1,
    Re = 2,
    Nre = 3,
}

/// A label matcher as sent to a remote backend.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct LabelMatcher {
    #[prost(enumeration = "MatcherType", tag = "1")]
    #[serde(rename = "type", default)]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    #[serde(default)]
    pub value: String,
}

/// A single remote read query.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    #[prost(message, repeated, tag = "3")]
    #[serde(default)]
    pub matchers: Vec<LabelMatcher>,
}

/// The answer to a [`Query`].
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct QueryResult {
    #[prost(message, repeated, tag = "1")]
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    #[serde(default)]
    pub labels: Vec<LabelPair>,
    #[prost(message, repeated, tag = "2")]
    #[serde(default)]
    pub samples: Vec<Sample>,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct LabelPair {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

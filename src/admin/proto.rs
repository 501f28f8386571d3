//! Request and response messages of the admin API.
//!
//! Like the remote read messages they support binary protobuf and ProtoJSON.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::remote::proto::LabelMatcher;

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct ReloadRequest {}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct ReloadResponse {}

/// Asks the engine to write a snapshot of its persisted data.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    /// Leave out the in-memory head block.
    #[prost(bool, tag = "1")]
    #[serde(default)]
    pub skip_head: bool,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Name of the snapshot directory.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Deletes the samples of matching series in a time range.
///
/// A missing bound leaves that side of the range open.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSeriesRequest {
    #[prost(int64, optional, tag = "1")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time: Option<i64>,
    #[prost(message, repeated, tag = "3")]
    #[serde(default)]
    pub matchers: Vec<LabelMatcher>,
}

#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct DeleteSeriesResponse {}

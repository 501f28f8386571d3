//! Administrative operations against the embedded engine.
//!
//! Operations the engine does not provide fail with
//! [`Error::Unimplemented`] naming the operation, so callers can tell a
//! missing capability apart from a failure.

pub mod http;
pub mod proto;

use std::sync::Arc;

use async_trait::async_trait;

use crate::convert::to_engine_matchers;
use crate::engine::{self, EngineError};
use crate::error::{Error, Result};
use crate::local::map_engine_error;
use crate::remote::codec::from_label_matchers;
use proto::{
    DeleteSeriesRequest, DeleteSeriesResponse, ReloadRequest, ReloadResponse, SnapshotRequest,
    SnapshotResponse,
};

/// The admin operations, independent of transport.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn reload(&self, request: ReloadRequest) -> Result<ReloadResponse>;

    async fn snapshot(&self, request: SnapshotRequest) -> Result<SnapshotResponse>;

    async fn delete_series(&self, request: DeleteSeriesRequest) -> Result<DeleteSeriesResponse>;
}

/// [`AdminService`] backed by an [`engine::Db`].
pub struct TsdbAdminService {
    db: Arc<dyn engine::Db>,
}

impl TsdbAdminService {
    pub fn new(db: Arc<dyn engine::Db>) -> Self {
        Self { db }
    }
}

fn map_admin_error(err: EngineError) -> Error {
    match err.cause() {
        EngineError::Unsupported(op) => Error::Unimplemented(op.to_string()),
        _ => map_engine_error(err),
    }
}

#[async_trait]
impl AdminService for TsdbAdminService {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn reload(&self, _request: ReloadRequest) -> Result<ReloadResponse> {
        self.db.reload().map_err(map_admin_error)?;
        Ok(ReloadResponse {})
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn snapshot(&self, request: SnapshotRequest) -> Result<SnapshotResponse> {
        let name = self
            .db
            .snapshot(!request.skip_head)
            .map_err(map_admin_error)?;
        Ok(SnapshotResponse { name })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn delete_series(&self, request: DeleteSeriesRequest) -> Result<DeleteSeriesResponse> {
        if request.matchers.is_empty() {
            return Err(Error::Configuration("no matchers provided".to_string()));
        }
        let mint = request.min_time.unwrap_or(i64::MIN);
        let maxt = request.max_time.unwrap_or(i64::MAX);
        if mint > maxt {
            return Err(Error::Configuration(format!(
                "min_time {} is after max_time {}",
                mint, maxt
            )));
        }
        let matchers = to_engine_matchers(&from_label_matchers(&request.matchers)?)?;
        self.db
            .delete(mint, maxt, &matchers)
            .map_err(map_admin_error)?;
        Ok(DeleteSeriesResponse {})
    }
}

//! Remote read client contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::proto::{Query, QueryResult};
use crate::error::{Error, Result};

/// A remote backend answering read queries.
///
/// Implementations must abort promptly once `ctx` is cancelled.
#[async_trait]
pub trait ReadClient: Send + Sync {
    async fn read(&self, ctx: &CancellationToken, query: Query) -> Result<QueryResult>;

    /// Human readable name of the backend, used in logs.
    fn name(&self) -> &str {
        "remote"
    }
}

/// Enforces a deadline and the caller's cancellation on every read.
///
/// Cancellation surfaces as [`Error::Cancelled`], an expired deadline as
/// [`Error::RemoteUnavailable`].
pub struct TimeoutClient {
    inner: Arc<dyn ReadClient>,
    timeout: Duration,
}

impl TimeoutClient {
    pub fn new(inner: Arc<dyn ReadClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ReadClient for TimeoutClient {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn read(&self, ctx: &CancellationToken, query: Query) -> Result<QueryResult> {
        // the child is cancelled on timeout so the inner read stops as well
        let child = ctx.child_token();
        let result = tokio::select! {
            _ = ctx.cancelled() => Err(Error::Cancelled),
            r = tokio::time::timeout(self.timeout, self.inner.read(&child, query)) => match r {
                Ok(r) => r,
                Err(_) => Err(Error::RemoteUnavailable(format!(
                    "{}: read timed out after {:?}",
                    self.inner.name(),
                    self.timeout
                ))),
            },
        };
        child.cancel();
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

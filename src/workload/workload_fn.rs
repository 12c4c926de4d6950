//! # Function-backed workload (`WorkloadFn`)
//!
//! [`WorkloadFn`] wraps a closure `F: Fn(CancellationToken) -> Fut` as the `run`
//! phase; `start` and `stop` keep their no-op defaults. Shared state goes into
//! the closure explicitly through `Arc<...>`.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use servicevisor::{WorkloadFn, WorkloadRef, WorkloadError};
//!
//! let w: WorkloadRef = WorkloadFn::arc("worker", |ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Ok::<_, WorkloadError>(())
//! });
//!
//! assert_eq!(w.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkloadError;
use crate::workload::Workload;

/// Closure-backed workload.
#[derive(Debug)]
pub struct WorkloadFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkloadFn<F> {
    /// Prefer [`WorkloadFn::arc`] when you immediately need a [`WorkloadRef`](crate::WorkloadRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Workload for WorkloadFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkloadError> {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_after_cancel() {
        let w = WorkloadFn::new("loop", |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err(WorkloadError::Canceled)
        });
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(w.start().await.is_ok());
        assert!(w.run(ctx).await.unwrap_err().is_canceled());
        assert!(w.stop().await.is_ok());
    }
}

//! Asynchronous mutation handles
//!
//! Permission, option and flag-definition writes may round-trip to an
//! external store, so they run on a spawned task and hand back a
//! [`PendingMutation`]. Dropping the handle does not abort the write;
//! [`PendingMutation::cancel`] aborts it only when the backend supports it.

use crate::model::{PermissionResult, PermissionResultType};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

enum Inner {
    Ready(Option<PermissionResult>),
    Spawned(JoinHandle<PermissionResult>),
}

/// Future resolving to the outcome of a permission mutation
pub struct PendingMutation {
    inner: Inner,
    token: CancellationToken,
    cancellable: bool,
}

impl PendingMutation {
    /// An already-decided outcome (validation failures, no-ops)
    pub(crate) fn ready(result: PermissionResult) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
            token: CancellationToken::new(),
            cancellable: false,
        }
    }

    /// Run `work` on the current tokio runtime. The token passed to `work`
    /// fires on [`PendingMutation::cancel`] when `cancellable` is set.
    /// Outside a runtime nothing runs and the handle resolves to `FAILURE`.
    pub(crate) fn spawn<F, Fut>(cancellable: bool, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = PermissionResult> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Permission mutation requested outside a tokio runtime");
            return Self::ready(PermissionResult::failure(
                PermissionResultType::Failure,
                "no tokio runtime to run the mutation on",
            ));
        };
        let token = CancellationToken::new();
        let handle = runtime.spawn(work(token.clone()));
        Self {
            inner: Inner::Spawned(handle),
            token,
            cancellable,
        }
    }

    /// Request best-effort cancellation. Returns false when the backend
    /// cannot cancel; the mutation then runs to completion.
    pub fn cancel(&self) -> bool {
        if !self.cancellable {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            Inner::Ready(_) => true,
            Inner::Spawned(handle) => handle.is_finished(),
        }
    }
}

impl Future for PendingMutation {
    type Output = PermissionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Inner::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                PermissionResult::failure(PermissionResultType::Failure, "result already taken")
            })),
            Inner::Spawned(handle) => Pin::new(handle).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| {
                    PermissionResult::failure(
                        PermissionResultType::Failure,
                        format!("mutation task failed: {}", e),
                    )
                })
            }),
        }
    }
}

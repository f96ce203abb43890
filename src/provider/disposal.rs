//! Disposal sequence of a single instance.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::slot::{DisposalParts, SlotId};
use super::NodeRuntime;
use crate::error::{panic_message, BoxError, DisposeError};
use crate::identifier::Identifier;

/// Disposal of one instance whose last lease is gone.
///
/// Runs the disposal hooks in reverse registration order, then the instance
/// teardown, then releases the instance's dependency locks in reverse
/// acquisition order, and finally drops the slot. Failures are reported and
/// never stop the sequence.
///
/// A job dropped before it completes still removes its slot, and reports
/// [`DisposeError::Interrupted`]; dependency locks it did not get to release
/// are released on drop.
pub(crate) struct DisposalJob {
    runtime: Arc<NodeRuntime>,
    slot: SlotId,
    parts: Option<DisposalParts>,
    completed: bool,
}

impl DisposalJob {
    pub(crate) fn new(runtime: Arc<NodeRuntime>, slot: SlotId, parts: DisposalParts) -> Self {
        Self {
            runtime,
            slot,
            parts: Some(parts),
            completed: false,
        }
    }

    /// Runs the disposal detached from the caller.
    ///
    /// Inside a tokio runtime the job is spawned at once and the returned
    /// future only waits for it, so dropping that future does not interrupt
    /// the teardown. Elsewhere the job runs inline when polled.
    pub(crate) fn start(self) -> BoxFuture<'static, ()> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let identifier = self.runtime.identifier().clone();
                let task = handle.spawn(self.run());
                Box::pin(async move {
                    if let Err(error) = task.await {
                        tracing::warn!(%identifier, %error, "disposal task did not complete");
                    }
                })
            }
            Err(_) => self.run(),
        }
    }

    pub(crate) fn run(mut self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Some(parts) = self.parts.take() else {
                return;
            };
            let runtime = self.runtime.clone();
            let identifier = runtime.identifier().clone();
            tracing::trace!(%identifier, slot = self.slot.0, "disposing instance");

            let hooks = parts.disposers.lock().drain_reverse();
            for hook in hooks {
                let outcome = AssertUnwindSafe(async move { hook().await }).catch_unwind().await;
                report_teardown(&runtime, &identifier, outcome);
            }

            if let Some(teardown) = parts.teardown {
                let instance = parts.instance.clone();
                let outcome = AssertUnwindSafe(async move { teardown(instance).await })
                    .catch_unwind()
                    .await;
                report_teardown(&runtime, &identifier, outcome);
            }
            drop(parts.instance);

            for dependency in parts.dependencies.into_iter().rev() {
                let dependency_id = dependency.identifier().clone();
                if let Err(source) = dependency.release().await {
                    runtime.report_dispose_error(&DisposeError::DependencyRelease {
                        identifier: identifier.clone(),
                        dependency: dependency_id,
                        source,
                    });
                }
            }

            self.completed = true;
            runtime.finish(self.slot);
        })
    }
}

impl fmt::Debug for DisposalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalJob")
            .field("identifier", self.runtime.identifier())
            .field("slot", &self.slot)
            .field("completed", &self.completed)
            .finish()
    }
}

impl Drop for DisposalJob {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.runtime.report_dispose_error(&DisposeError::Interrupted {
            identifier: self.runtime.identifier().clone(),
        });
        // Remaining dependency locks release through their own drop
        drop(self.parts.take());
        self.runtime.finish(self.slot);
    }
}

fn report_teardown(
    runtime: &NodeRuntime,
    identifier: &Identifier,
    outcome: Result<Result<(), BoxError>, Box<dyn Any + Send>>,
) {
    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(source)) => DisposeError::Teardown {
            identifier: identifier.clone(),
            source,
        },
        Err(payload) => DisposeError::Panicked {
            identifier: identifier.clone(),
            message: panic_message(payload.as_ref()),
        },
    };
    runtime.report_dispose_error(&error);
}

//! Two-stage scheduler - run work now or defer it, reporting errors together
//!
//! Errors raised by `now`/`later` tasks (including panics) never reach the
//! caller directly. They are collected and surfaced as one aggregated report
//! when [`TwoStage::flush`] drains the deferred queue.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use eyre::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::notify::Notifier;

/// A deferred task owning everything it touches
pub type Task = BoxFuture<'static, Result<()>>;

/// Cooperative `now`/`later` task queue
pub struct TwoStage {
    queue: VecDeque<Task>,
    errors: Vec<String>,
    scheduled: bool,
    notifier: Notifier,
}

impl std::fmt::Debug for TwoStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoStage")
            .field("queued", &self.queue.len())
            .field("errors", &self.errors)
            .field("scheduled", &self.scheduled)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

impl TwoStage {
    pub fn new(notifier: Notifier) -> Self {
        debug!("TwoStage::new: called");
        Self {
            queue: VecDeque::new(),
            errors: Vec::new(),
            scheduled: false,
            notifier,
        }
    }

    async fn capture<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<()>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "TwoStage::capture: task failed");
                self.errors.push(format!("{:#}", e));
            }
            Err(payload) => {
                let msg = panic_message(payload);
                debug!(%msg, "TwoStage::capture: task panicked");
                self.errors.push(msg);
            }
        }
    }

    /// Run `fut` immediately, keeping any error for the next flush
    pub async fn now<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<()>>,
    {
        debug!("TwoStage::now: called");
        self.scheduled = true;
        self.capture(fut).await;
    }

    /// Queue `fut` to run on the next flush, after earlier queued tasks
    pub fn later<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!(queued = self.queue.len() + 1, "TwoStage::later: called");
        self.scheduled = true;
        self.queue.push_back(fut.boxed());
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain the deferred queue in FIFO order and report collected errors
    ///
    /// Yields to the runtime between tasks. Returns the aggregated report, if
    /// any error was collected since the last flush, and clears it. A no-op
    /// when nothing was scheduled.
    pub async fn flush(&mut self) -> Option<String> {
        if !self.scheduled {
            debug!("TwoStage::flush: nothing scheduled");
            return None;
        }
        debug!(queued = self.queue.len(), "TwoStage::flush: called");

        while let Some(task) = self.queue.pop_front() {
            self.capture(task).await;
            tokio::task::yield_now().await;
        }
        self.scheduled = false;

        if self.errors.is_empty() {
            return None;
        }
        let report = format!("There were errors:\n{}", self.errors.join("\n"));
        self.errors.clear();
        warn!(%report, "TwoStage::flush: errors collected");
        self.notifier.error(report.clone());
        Some(report)
    }
}

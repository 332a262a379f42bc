//! Step executor for workflows that span more than one resource
//!
//! Each forward step may register a compensation. When a later step fails,
//! the registered compensations run in reverse order before the step's error
//! is returned. Compensation failures are logged and never replace the
//! original error. [`Saga::commit`] marks the point after which nothing is
//! undone.

use std::future::Future;
use std::pin::Pin;

use crate::error::AppResult;

type Compensation = Pin<Box<dyn Future<Output = AppResult<()>> + Send>>;

pub struct Saga {
    name: &'static str,
    compensations: Vec<(&'static str, Compensation)>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            compensations: Vec::new(),
        }
    }

    /// Run a forward step and register how to undo it
    pub async fn run<T, Fut, C, CFut>(
        &mut self,
        step: &'static str,
        action: Fut,
        compensate: C,
    ) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
        C: FnOnce(&T) -> CFut,
        CFut: Future<Output = AppResult<()>> + Send + 'static,
    {
        match action.await {
            Ok(value) => {
                self.compensations
                    .push((step, Box::pin(compensate(&value))));
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(saga = self.name, step, error = %err, "Saga step failed");
                self.unwind().await;
                Err(err)
            }
        }
    }

    /// Run a forward step that needs no compensation of its own
    pub async fn step<T, Fut>(&mut self, step: &'static str, action: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        match action.await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(saga = self.name, step, error = %err, "Saga step failed");
                self.unwind().await;
                Err(err)
            }
        }
    }

    /// Discard the compensations; completed steps are now durable
    pub fn commit(self) {
        tracing::debug!(saga = self.name, steps = self.compensations.len(), "Saga committed");
    }

    async fn unwind(&mut self) {
        while let Some((step, compensation)) = self.compensations.pop() {
            match compensation.await {
                Ok(()) => tracing::info!(saga = self.name, step, "Compensated saga step"),
                Err(err) => tracing::error!(
                    saga = self.name,
                    step,
                    error = %err,
                    "Compensation failed"
                ),
            }
        }
    }
}

//! Execution engine: walks the schedule one operation at a time
//!
//! Each schedule entry is isolated: whatever its handler does (error or panic)
//! is recorded on that operation and the loop moves on to the next entry.
//! Cancellation is checked between entries only; an operation that has been
//! dispatched always runs to completion.

use crate::dispatch::{HandlerRegistry, OpContext};
use crate::store::GraphStore;
use futures::FutureExt;
use reality_core::{ChatMessage, OpOutcome, OpStatus, Operation, OperationPatch};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const EXECUTION_COMPLETE: &str = "Execution complete.";
pub const EXECUTION_CANCELLED: &str = "Execution cancelled.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryReport {
    pub op_id: String,
    pub kind: String,
    pub status: OpStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub entries: Vec<EntryReport>,
    /// Schedule entries whose operation does not exist.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn statuses(&self) -> Vec<OpStatus> {
        self.entries.iter().map(|e| e.status).collect()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == OpStatus::Error)
            .count()
    }
}

#[derive(Clone)]
pub struct Executor {
    store: Arc<GraphStore>,
    handlers: Arc<HandlerRegistry>,
}

impl Executor {
    pub fn new(store: Arc<GraphStore>, handlers: HandlerRegistry) -> Self {
        Self {
            store,
            handlers: Arc::new(handlers),
        }
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub async fn run(&self, thread_id: &str) -> ExecutionReport {
        self.run_cancellable(thread_id, CancellationToken::new()).await
    }

    pub async fn run_cancellable(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        let schedule = self.store.schedule();
        info!("Executing {} scheduled operations", schedule.len());

        let mut report = ExecutionReport::default();
        for entry in schedule {
            if cancel.is_cancelled() {
                info!("Execution cancelled before {}", entry.exec);
                report.cancelled = true;
                break;
            }
            let Some(operation) = self.store.operation(&entry.exec) else {
                debug!("schedule entry {} names no operation, skipping", entry.exec);
                report.skipped.push(entry.exec);
                continue;
            };

            self.store
                .update_operation(&operation.op_id, OperationPatch::status(OpStatus::Running));
            let status = self.run_entry(thread_id, &operation).await;
            report.entries.push(EntryReport {
                op_id: operation.op_id,
                kind: operation.kind,
                status,
            });
        }

        let closing = if report.cancelled {
            EXECUTION_CANCELLED
        } else {
            EXECUTION_COMPLETE
        };
        self.store
            .add_chat_message(thread_id, ChatMessage::assistant(closing));
        info!(
            "Execution finished: {} ran, {} failed, {} skipped",
            report.entries.len(),
            report.failed(),
            report.skipped.len()
        );
        report
    }

    fn context(&self, operation: &Operation) -> OpContext {
        OpContext {
            operation: operation.clone(),
            inputs: self.store.input_registers(&operation.op_id),
            source_image: self.store.source_image(),
            target: operation
                .target_register_id()
                .and_then(|id| self.store.register(id)),
        }
    }

    async fn run_entry(&self, thread_id: &str, operation: &Operation) -> OpStatus {
        let op_id = operation.op_id.as_str();
        let Some(handler) = self.handlers.get(&operation.kind) else {
            debug!("no handler for kind {:?}, completing {}", operation.kind, op_id);
            self.store
                .update_operation(op_id, OperationPatch::status(OpStatus::Completed));
            return OpStatus::Completed;
        };

        let ctx = self.context(operation);
        if let Some(line) = handler.announce(&ctx) {
            self.store
                .add_chat_message(thread_id, ChatMessage::assistant(line));
        }

        let result = AssertUnwindSafe(handler.run(&ctx)).catch_unwind().await;
        let failure = match result {
            Ok(Ok(output)) => {
                for write in output.writes {
                    self.store.update_register(&write.reg_id, write.patch);
                }
                self.store.update_operation(
                    op_id,
                    OperationPatch::finished(OpStatus::Completed, output.outcome),
                );
                debug!("{} ({}) completed", op_id, operation.kind);
                return OpStatus::Completed;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        warn!("Operation {} ({}) failed: {}", op_id, operation.kind, failure);
        self.store.update_operation(
            op_id,
            OperationPatch::finished(OpStatus::Error, OpOutcome::error(failure)),
        );
        OpStatus::Error
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

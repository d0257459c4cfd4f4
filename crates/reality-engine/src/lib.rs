//! Reality Engine - Graph store, operation dispatch, and the sequential execution loop

pub mod audit;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod executor;
pub mod intent;
pub mod persist;
pub mod runtime;
pub mod store;

pub use audit::{AuditAction, AuditEvent, AuditLog, AuditSink, HttpAuditSink, JsonlAuditSink};
pub use config::RealityConfig;
pub use dispatch::{
    AnalysisHandler, Capabilities, HandlerOutput, HandlerRegistry, OpContext, OpHandler,
    RegisterWrite, SegmentationHandler, StyleHandler,
};
pub use executor::{EntryReport, ExecutionReport, Executor};
pub use intent::{apply_delta, AppliedDelta};
pub use persist::{LocalProgramStore, ProgramStore};
pub use runtime::{IntentOutcome, RealityRuntime};
pub use store::GraphStore;
pub use tokio_util::sync::CancellationToken;

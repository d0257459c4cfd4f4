//! Reality runtime: intent → delta → graph → execution, plus save/load

use crate::dispatch::HandlerRegistry;
use crate::executor::{ExecutionReport, Executor};
use crate::intent::{apply_delta, AppliedDelta};
use crate::persist::ProgramStore;
use crate::store::GraphStore;
use reality_adapters::IntentCompiler;
use reality_core::{
    mint_register_id, ChatMessage, Error, Geometry, Register, RegisterKind, Result, SymbolInfo,
    THINKING_PLACEHOLDER,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const COMPILER_UNAVAILABLE: &str = "Error connecting to the intent compiler.";

/// Result of one intent round-trip.
#[derive(Clone, Debug)]
pub struct IntentOutcome {
    pub thought: String,
    pub applied: AppliedDelta,
    pub report: ExecutionReport,
}

pub struct RealityRuntime {
    store: Arc<GraphStore>,
    compiler: Arc<dyn IntentCompiler>,
    executor: Executor,
    programs: Option<Arc<dyn ProgramStore>>,
}

impl RealityRuntime {
    pub fn new(
        store: Arc<GraphStore>,
        compiler: Arc<dyn IntentCompiler>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            executor: Executor::new(store.clone(), handlers),
            store,
            compiler,
            programs: None,
        }
    }

    pub fn with_program_store(mut self, programs: Arc<dyn ProgramStore>) -> Self {
        self.programs = Some(programs);
        self
    }

    /// Compile `intent` against `image_url` (or the program's source image),
    /// merge the delta, and run the schedule. A compiler failure leaves the
    /// graph untouched and posts one error message to the thread.
    pub async fn process_intent(
        &self,
        thread_id: &str,
        image_url: Option<&str>,
        intent: &str,
    ) -> Result<IntentOutcome> {
        self.process_intent_cancellable(thread_id, image_url, intent, CancellationToken::new())
            .await
    }

    pub async fn process_intent_cancellable(
        &self,
        thread_id: &str,
        image_url: Option<&str>,
        intent: &str,
        cancel: CancellationToken,
    ) -> Result<IntentOutcome> {
        self.store
            .add_chat_message(thread_id, ChatMessage::user(intent));
        self.store
            .add_chat_message(thread_id, ChatMessage::assistant(THINKING_PLACEHOLDER));

        let image = match image_url.map(str::to_string).or_else(|| self.store.source_image()) {
            Some(image) => image,
            None => {
                self.store
                    .resolve_thinking(thread_id, "No source image to work on.", None);
                return Err(Error::compiler("no source image"));
            }
        };

        info!("Compiling intent via {}: {}", self.compiler.name(), intent);
        let compiled = match self.compiler.compile(&image, intent).await {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!("Intent compiler failed: {}", e);
                self.store
                    .resolve_thinking(thread_id, COMPILER_UNAVAILABLE, None);
                return Err(Error::compiler(e.to_string()));
            }
        };

        if self.store.source_image().is_none() {
            self.store.set_source_image(image.as_str());
        }
        self.store
            .resolve_thinking(thread_id, &compiled.thought, Some(&compiled.thought));
        self.store.set_last_thought(Some(compiled.thought.clone()));

        let applied = apply_delta(&self.store, &compiled.delta);
        info!(
            "Applied delta: {} registers, {} operations, {} wires",
            applied.register_ids.len(),
            applied.operation_ids.len(),
            applied.wires_added
        );

        let report = self.executor.run_cancellable(thread_id, cancel).await;
        Ok(IntentOutcome {
            thought: compiled.thought,
            applied,
            report,
        })
    }

    pub async fn execute(&self, thread_id: &str) -> ExecutionReport {
        self.executor.run(thread_id).await
    }

    /// Upload path: a user-provided image becomes a populated image register.
    pub fn add_image_register(&self, title: &str, url: &str) -> String {
        let reg_id = mint_register_id();
        let variable = title.to_lowercase().replace(char::is_whitespace, "_");
        self.store.add_register(
            Register::new(reg_id.clone(), RegisterKind::Image, SymbolInfo::new(variable, title))
                .with_geometry(Geometry::image(url)),
        );
        reg_id
    }

    fn programs(&self) -> Result<&Arc<dyn ProgramStore>> {
        self.programs
            .as_ref()
            .ok_or_else(|| Error::Persistence("no program store configured".into()))
    }

    /// Persist the current program and record the handle in its metadata.
    pub async fn save(&self) -> Result<String> {
        let programs = self.programs()?;
        let mut program = self.store.snapshot();
        let now = chrono::Utc::now();
        program.metadata.updated_at = Some(now);
        let handle = programs.save(&program).await?;
        self.store.mark_saved(&handle);
        info!("Saved program {} to {}", program.id, handle);
        Ok(handle)
    }

    /// Replace the current program with the one stored under `handle`.
    /// Returns false when nothing is stored there.
    pub async fn load(&self, handle: &str) -> Result<bool> {
        match self.programs()?.load(handle).await? {
            Some(program) => {
                info!("Loaded program {} from {}", program.id, handle);
                self.store.set_program(program);
                Ok(true)
            }
            None => {
                warn!("No program stored at {}", handle);
                Ok(false)
            }
        }
    }
}

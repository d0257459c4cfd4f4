//! Graph store: the single owner of the program and session state
//!
//! Every mutation takes the write lock exactly once, so readers observe either
//! the state before or after it. Structural mutations (registers, operations,
//! wires, schedule order) are announced to the audit log before they apply.

use crate::audit::{AuditAction, AuditLog};
use reality_core::{
    ChatMessage, ChatThread, Error, InteractionMode, OpStatus, Operation, OperationPatch,
    Program, ProgramMetadata, Register, RegisterPatch, Result, ScheduleEntry, SessionState,
    Wire, THINKING_PLACEHOLDER,
};
use serde_json::json;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

struct StoreState {
    program: Program,
    session: SessionState,
}

pub struct GraphStore {
    state: RwLock<StoreState>,
    audit: AuditLog,
}

impl GraphStore {
    pub fn new(program: Program, audit: AuditLog) -> Self {
        Self {
            state: RwLock::new(StoreState {
                program,
                session: SessionState::new(),
            }),
            audit,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn snapshot(&self) -> Program {
        self.read().program.clone()
    }

    pub fn session(&self) -> SessionState {
        self.read().session.clone()
    }

    pub fn register(&self, reg_id: &str) -> Option<Register> {
        self.read().program.register(reg_id).cloned()
    }

    pub fn operation(&self, op_id: &str) -> Option<Operation> {
        self.read().program.operation(op_id).cloned()
    }

    /// Schedule entries sorted by `order`.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        let mut entries = self.read().program.schedule.clone();
        entries.sort_by_key(|e| e.order);
        entries
    }

    pub fn input_registers(&self, op_id: &str) -> Vec<Register> {
        self.read()
            .program
            .input_registers(op_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn source_image(&self) -> Option<String> {
        self.read().program.source_image().map(str::to_string)
    }

    pub fn thread(&self, thread_id: &str) -> Option<ChatThread> {
        self.read().session.thread(thread_id).cloned()
    }

    pub fn main_thread_id(&self) -> String {
        self.read().session.main_chat_id.clone()
    }

    pub fn last_thought(&self) -> Option<String> {
        self.read().session.last_thought.clone()
    }

    // ============================================================
    // Graph mutations
    // ============================================================

    pub fn add_register(&self, register: Register) {
        self.audit.log(
            AuditAction::AddRegister,
            Some(&register.reg_id),
            json!({
                "title": register.symbol.display_name,
                "provenance": register.provenance,
            }),
        );
        debug!("add register {} ({})", register.reg_id, register.kind);
        self.write().program.registers.push(register);
    }

    /// Apply `patch` to a register. Unknown ids are tolerated and return false.
    pub fn update_register(&self, reg_id: &str, patch: RegisterPatch) -> bool {
        let mut state = self.write();
        let Some(register) = state
            .program
            .registers
            .iter_mut()
            .find(|r| r.reg_id == reg_id)
        else {
            debug!("update for unknown register {}", reg_id);
            return false;
        };

        if let Some(kind) = patch.kind {
            register.kind = kind;
        }
        if let Some(geometry) = patch.geometry {
            register.geometry = geometry;
        }
        if let Some(provenance) = patch.provenance {
            register.provenance = provenance;
        }
        if let Some(locked) = patch.locked {
            register.symbol.locked = locked;
        }
        if let Some(name) = patch.display_name {
            if !register.symbol.rename(name) {
                warn!(
                    "register {} is locked, keeping name {:?}",
                    reg_id, register.symbol.display_name
                );
            }
        }
        true
    }

    /// Add an operation and append it to the schedule.
    pub fn add_operation(&self, operation: Operation) {
        self.audit.log(
            AuditAction::AddOp,
            Some(&operation.op_id),
            json!({ "type": operation.kind }),
        );
        let mut state = self.write();
        let order = state.program.schedule.len();
        debug!("add operation {} ({}) at order {}", operation.op_id, operation.kind, order);
        state.program.schedule.push(ScheduleEntry {
            order,
            exec: operation.op_id.clone(),
        });
        state.program.operations.push(operation);
    }

    /// Apply `patch` to an operation. Unknown ids are tolerated and return false.
    pub fn update_operation(&self, op_id: &str, patch: OperationPatch) -> bool {
        let mut state = self.write();
        let Some(operation) = state
            .program
            .operations
            .iter_mut()
            .find(|o| o.op_id == op_id)
        else {
            debug!("update for unknown operation {}", op_id);
            return false;
        };

        if let Some(status) = patch.status {
            operation.status = status;
        }
        if let Some(result) = patch.result {
            operation.result = result;
        }
        if let Some(position) = patch.position {
            operation.position = position;
        }
        if let Some(params) = patch.params {
            operation.params = params;
        }
        true
    }

    pub fn add_wire(&self, wire: Wire) {
        self.audit.log(
            AuditAction::AddWire,
            Some(&wire.edge_id),
            json!({ "source": wire.source_id, "target": wire.target_id, "type": wire.kind }),
        );
        self.write().program.wires.push(wire);
    }

    pub fn remove_wire(&self, edge_id: &str) -> bool {
        self.audit.log(AuditAction::RemoveWire, Some(edge_id), json!({}));
        let mut state = self.write();
        let before = state.program.wires.len();
        state.program.wires.retain(|w| w.edge_id != edge_id);
        before != state.program.wires.len()
    }

    /// Move the entry at `from` to `to` and renumber. `to` past the end clamps to the end.
    pub fn reorder_schedule(&self, from: usize, to: usize) -> Result<()> {
        let mut state = self.write();
        let len = state.program.schedule.len();
        if from >= len {
            return Err(Error::ScheduleIndex { index: from, len });
        }
        state.program.schedule.sort_by_key(|e| e.order);
        self.audit.log(
            AuditAction::ReorderSchedule,
            Some(&state.program.schedule[from].exec),
            json!({ "from": from, "to": to }),
        );
        let entry = state.program.schedule.remove(from);
        let to = to.min(state.program.schedule.len());
        state.program.schedule.insert(to, entry);
        state.program.renumber_schedule();
        Ok(())
    }

    /// Replace the whole program, e.g. after loading. Operations left `running`
    /// by an interrupted run come back as `idle`.
    pub fn set_program(&self, mut program: Program) {
        for op in program.operations.iter_mut() {
            if op.status == OpStatus::Running {
                op.status = OpStatus::Idle;
            }
        }
        debug!("program replaced with {}", program.id);
        self.write().program = program;
    }

    pub fn set_source_image(&self, url: impl Into<String>) {
        self.write().program.source.image_url = Some(url.into());
    }

    pub fn set_program_metadata(&self, metadata: ProgramMetadata) {
        self.write().program.metadata = metadata;
    }

    /// Record where the program was last saved.
    pub fn mark_saved(&self, handle: &str) {
        let mut state = self.write();
        state.program.metadata.last_saved_url = Some(handle.to_string());
        state.program.metadata.updated_at = Some(chrono::Utc::now());
    }

    // ============================================================
    // Session mutations
    // ============================================================

    /// Append to a thread. Unknown threads are tolerated and return false.
    pub fn add_chat_message(&self, thread_id: &str, message: ChatMessage) -> bool {
        let mut state = self.write();
        match state.session.thread_mut(thread_id) {
            Some(thread) => {
                thread.messages.push(message);
                true
            }
            None => {
                debug!("message for unknown thread {}", thread_id);
                false
            }
        }
    }

    /// Replace the newest thinking placeholder in a thread, or append if there is none.
    pub fn resolve_thinking(&self, thread_id: &str, content: &str, thought: Option<&str>) {
        let mut state = self.write();
        let Some(thread) = state.session.thread_mut(thread_id) else {
            debug!("resolve for unknown thread {}", thread_id);
            return;
        };
        let placeholder = thread
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.content == THINKING_PLACEHOLDER);
        match placeholder {
            Some(message) => {
                message.content = content.to_string();
                message.thought = thought.map(str::to_string);
            }
            None => {
                let mut message = ChatMessage::assistant(content);
                message.thought = thought.map(str::to_string);
                thread.messages.push(message);
            }
        }
    }

    /// Open a new thread, optionally attached to a node. Returns its id.
    pub fn open_thread(&self, target_id: Option<&str>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.write()
            .session
            .threads
            .push(ChatThread::new(id.clone(), target_id.map(str::to_string)));
        id
    }

    pub fn toggle_thread(&self, thread_id: &str, is_open: bool) -> bool {
        match self.write().session.thread_mut(thread_id) {
            Some(thread) => {
                thread.is_open = is_open;
                true
            }
            None => false,
        }
    }

    pub fn set_last_thought(&self, thought: Option<String>) {
        self.write().session.last_thought = thought;
    }

    pub fn set_interaction_mode(&self, mode: InteractionMode) {
        self.write().session.set_interaction_mode(mode);
    }
}

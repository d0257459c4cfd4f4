//! Merge a compiler delta into the graph store

use crate::store::GraphStore;
use reality_adapters::ProgramDelta;
use reality_core::{
    mint_operation_id, mint_register_id, Operation, Position, Register, SymbolInfo, Wire,
    PARAM_TARGET_REGISTER,
};
use std::collections::HashMap;
use tracing::debug;

/// What a delta turned into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedDelta {
    /// Compiler-local register id → minted `reg_id`.
    pub register_ids: HashMap<String, String>,
    /// Minted `op_id`s in proposal order.
    pub operation_ids: Vec<String>,
    pub wires_added: usize,
    /// Input ids that named no proposed register.
    pub unresolved_inputs: Vec<String>,
}

/// Mint ids, add registers with empty geometry, add operations (which extends
/// the schedule), then wire each resolvable input to its operation.
pub fn apply_delta(store: &GraphStore, delta: &ProgramDelta) -> AppliedDelta {
    let mut applied = AppliedDelta::default();

    for proposal in &delta.registers {
        let reg_id = mint_register_id();
        let title = proposal.title.as_deref().filter(|t| !t.trim().is_empty());
        let symbol = SymbolInfo::new(title.unwrap_or("var"), title.unwrap_or("Object"));
        if let Some(value) = &proposal.value {
            debug!("register {} proposed with value {:?}", proposal.id, value);
        }
        store.add_register(Register::new(reg_id.clone(), proposal.kind, symbol));
        applied.register_ids.insert(proposal.id.clone(), reg_id);
    }

    for (index, proposal) in delta.ops.iter().enumerate() {
        let op_id = mint_operation_id();
        let mut operation = Operation::new(op_id.clone(), proposal.kind.clone())
            .with_position(Position::new(index as f64, 0.0));
        operation.params = proposal.params.clone();
        if let Some(target) = proposal
            .output
            .first()
            .and_then(|local| applied.register_ids.get(local))
        {
            operation
                .params
                .insert(PARAM_TARGET_REGISTER.to_string(), target.clone().into());
        }
        store.add_operation(operation);

        for local in &proposal.input {
            match applied.register_ids.get(local) {
                Some(reg_id) => {
                    store.add_wire(Wire::data(reg_id.clone(), op_id.clone()));
                    applied.wires_added += 1;
                }
                None => {
                    debug!("op {} input {} names no register, skipping", proposal.id, local);
                    applied.unresolved_inputs.push(local.clone());
                }
            }
        }
        applied.operation_ids.push(op_id);
    }

    applied
}

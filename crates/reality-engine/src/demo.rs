//! Built-in demo program: a desk photo with three masked objects

use reality_core::{
    Engine, Geometry, OpStatus, Operation, Position, Program, Provenance, Register, RegisterKind,
    ScheduleEntry, SymbolInfo, Wire, WireKind, PARAM_PROMPT,
};

fn demo_register(id: &str, variable: &str, name: &str, mask_index: u32) -> Register {
    Register::new(id, RegisterKind::Image, SymbolInfo::new(variable, name))
        .with_geometry(Geometry::image(format!(
            "https://placehold.co/1024x1024/png?text=Mask:{}&font=roboto",
            name.replace(' ', "")
        )))
        .with_provenance(Provenance {
            engine: Engine::Sam3,
            request_id: "demo".into(),
            mask_index,
            score: None,
            bbox: None,
        })
}

fn demo_wire(id: &str, source: &str, target: &str) -> Wire {
    Wire {
        edge_id: id.into(),
        source_id: source.into(),
        target_id: target.into(),
        kind: WireKind::Data,
    }
}

/// Cables, laptop, and walls; one unhandled `inpaint` op and two style ops.
pub fn demo_program() -> Program {
    let mut program = Program::new(uuid::Uuid::new_v4().to_string());
    program.source.image_url = Some("/messy_desk.png".into());
    program.registers = vec![
        demo_register("R:CABLES", "cables", "Messy Cables", 0),
        demo_register("R:LAPTOP", "laptop", "Laptop", 1),
        demo_register("R:WALLS", "walls", "Walls", 2),
    ];

    let mut remove = Operation::new("OP:REMOVE", "inpaint")
        .with_param(PARAM_PROMPT, "remove cables")
        .with_position(Position::new(2.0, 0.0));
    let mut style = Operation::new("OP:STYLE", "style")
        .with_param(PARAM_PROMPT, "cyberpunk neon grid")
        .with_position(Position::new(2.0, -1.5));
    let mut glow = Operation::new("OP:GLOW", "style")
        .with_param(PARAM_PROMPT, "blue glow")
        .with_param("strength", 0.8)
        .with_position(Position::new(2.0, 1.5));
    for op in [&mut remove, &mut style, &mut glow] {
        op.status = OpStatus::Completed;
    }
    program.operations = vec![remove, style, glow];

    program.wires = vec![
        demo_wire("W:1", "R:CABLES", "OP:REMOVE"),
        demo_wire("W:2", "R:WALLS", "OP:STYLE"),
        demo_wire("W:3", "R:LAPTOP", "OP:GLOW"),
    ];
    program.schedule = ["OP:REMOVE", "OP:STYLE", "OP:GLOW"]
        .iter()
        .enumerate()
        .map(|(order, exec)| ScheduleEntry {
            order,
            exec: exec.to_string(),
        })
        .collect();
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_program_is_consistent() {
        let program = demo_program();
        assert_eq!(program.registers.len(), 3);
        assert_eq!(program.scheduled_ops(), vec!["OP:REMOVE", "OP:STYLE", "OP:GLOW"]);
        for op in &program.operations {
            assert_eq!(program.input_registers(&op.op_id).len(), 1);
        }
    }
}

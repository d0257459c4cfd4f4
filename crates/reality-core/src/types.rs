//! Program graph types: registers, operations, wires, and the schedule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mint a short prefixed id (e.g. `R:1a2b3c4d`) from a fresh v4 UUID.
pub fn mint_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}:{}", prefix, &uuid[..8])
}

pub fn mint_register_id() -> String {
    mint_id("R")
}

pub fn mint_operation_id() -> String {
    mint_id("OP")
}

pub fn mint_wire_id() -> String {
    mint_id("W")
}

// ============================================================
// Registers
// ============================================================

/// Register kind
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    #[default]
    Image,
    Text,
    Number,
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
        }
    }
}

/// Kind-dependent register payload. `Empty` while the producing operation is pending.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Geometry {
    Image { mask_url: String },
    Text { text_value: String },
    Number { number_value: f64 },
    Empty {},
}

impl Default for Geometry {
    fn default() -> Self {
        Self::Empty {}
    }
}

impl Geometry {
    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            mask_url: url.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            text_value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty {})
    }

    /// The image/mask reference, if this payload carries one.
    pub fn image_ref(&self) -> Option<&str> {
        match self {
            Self::Image { mask_url } if !mask_url.is_empty() => Some(mask_url),
            _ => None,
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match self {
            Self::Text { text_value } => Some(text_value),
            _ => None,
        }
    }
}

/// Engine that produced a register
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Engine {
    #[serde(rename = "sam3")]
    Sam3,
    #[serde(rename = "gemini-3")]
    Gemini3,
    #[default]
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub engine: Engine,
    pub request_id: String,
    pub mask_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// `[x, y, w, h]`
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}

impl Provenance {
    /// Provenance for registers created by the user or the intent compiler.
    pub fn user() -> Self {
        Self {
            engine: Engine::User,
            request_id: "init".to_string(),
            mask_index: 0,
            score: None,
            bbox: None,
        }
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::user()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolInfo {
    pub variable_name: String,
    pub display_name: String,
    #[serde(default)]
    pub locked: bool,
    /// Past display names, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
}

impl SymbolInfo {
    pub fn new(variable_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            variable_name: variable_name.into(),
            display_name: display_name.into(),
            locked: false,
            history: Vec::new(),
        }
    }

    /// Rename, pushing the previous name onto `history`.
    /// Returns false when the symbol is locked; same-name renames are a no-op.
    pub fn rename(&mut self, name: impl Into<String>) -> bool {
        if self.locked {
            return false;
        }
        let name = name.into();
        if name != self.display_name {
            let previous = std::mem::replace(&mut self.display_name, name);
            self.history.push(previous);
        }
        true
    }
}

/// A typed, addressable data slot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Register {
    pub reg_id: String,
    #[serde(rename = "type", default)]
    pub kind: RegisterKind,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(rename = "geom", default)]
    pub geometry: Geometry,
    #[serde(rename = "sym")]
    pub symbol: SymbolInfo,
}

impl Register {
    pub fn new(reg_id: impl Into<String>, kind: RegisterKind, symbol: SymbolInfo) -> Self {
        Self {
            reg_id: reg_id.into(),
            kind,
            provenance: Provenance::user(),
            geometry: Geometry::Empty {},
            symbol,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn display_name(&self) -> &str {
        &self.symbol.display_name
    }

    /// Image reference usable as a capability input. Image-kind registers with no
    /// payload of their own fall back to the program source image.
    pub fn image_ref<'a>(&'a self, source_image: Option<&'a str>) -> Option<&'a str> {
        self.geometry.image_ref().or(match (self.kind, &self.geometry) {
            (RegisterKind::Image, Geometry::Empty {}) => source_image.filter(|s| !s.is_empty()),
            _ => None,
        })
    }
}

/// Partial update for a register. Unset fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegisterPatch {
    pub kind: Option<RegisterKind>,
    pub geometry: Option<Geometry>,
    pub display_name: Option<String>,
    pub provenance: Option<Provenance>,
    pub locked: Option<bool>,
}

impl RegisterPatch {
    pub fn geometry(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Default::default()
        }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================
// Operations
// ============================================================

/// Operation status: idle → running → completed | error
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Last outcome of an operation run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OpOutcome {
    Mask { mask_url: String },
    Image { image_url: String },
    Text { text: String },
    Error { error: String },
}

impl OpOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

pub const PARAM_PROMPT: &str = "prompt";
pub const PARAM_COLOR: &str = "color";
pub const PARAM_TARGET_REGISTER: &str = "target_register_id";

/// A typed unit of work dispatched by `kind`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub op_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub result: Option<OpOutcome>,
}

impl Operation {
    pub fn new(op_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            op_id: op_id.into(),
            kind: kind.into(),
            params: Map::new(),
            position: Position::default(),
            status: OpStatus::Idle,
            result: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// A non-empty string param.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn prompt(&self) -> Option<&str> {
        self.param_str(PARAM_PROMPT)
    }

    pub fn color(&self) -> Option<&str> {
        self.param_str(PARAM_COLOR)
    }

    pub fn target_register_id(&self) -> Option<&str> {
        self.param_str(PARAM_TARGET_REGISTER)
    }
}

/// Partial update for an operation. `result: Some(None)` clears the last outcome.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationPatch {
    pub status: Option<OpStatus>,
    pub result: Option<Option<OpOutcome>>,
    pub position: Option<Position>,
    pub params: Option<Map<String, Value>>,
}

impl OperationPatch {
    pub fn status(status: OpStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn finished(status: OpStatus, outcome: OpOutcome) -> Self {
        Self {
            status: Some(status),
            result: Some(Some(outcome)),
            ..Default::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }
}

// ============================================================
// Wires and schedule
// ============================================================

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    #[default]
    Data,
    Control,
}

/// Directed edge from a register to the operation consuming it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wire {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type", default)]
    pub kind: WireKind,
}

impl Wire {
    pub fn data(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            edge_id: mint_wire_id(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind: WireKind::Data,
        }
    }

    pub fn control(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            kind: WireKind::Control,
            ..Self::data(source_id, target_id)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub order: usize,
    pub exec: String,
}

// ============================================================
// Program
// ============================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The whole graph plus its source image
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub id: String,
    #[serde(default)]
    pub source: ProgramSource,
    #[serde(default)]
    pub registers: Vec<Register>,
    #[serde(rename = "ops", default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub wires: Vec<Wire>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub metadata: ProgramMetadata,
}

impl Default for Program {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl Program {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: ProgramSource::default(),
            registers: Vec::new(),
            operations: Vec::new(),
            wires: Vec::new(),
            schedule: Vec::new(),
            metadata: ProgramMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    pub fn source_image(&self) -> Option<&str> {
        self.source.image_url.as_deref().filter(|s| !s.is_empty())
    }

    pub fn register(&self, reg_id: &str) -> Option<&Register> {
        self.registers.iter().find(|r| r.reg_id == reg_id)
    }

    pub fn operation(&self, op_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.op_id == op_id)
    }

    /// Registers with a data wire into `op_id`, in register insertion order.
    pub fn input_registers(&self, op_id: &str) -> Vec<&Register> {
        self.registers
            .iter()
            .filter(|r| {
                self.wires.iter().any(|w| {
                    w.kind == WireKind::Data && w.target_id == op_id && w.source_id == r.reg_id
                })
            })
            .collect()
    }

    /// Op ids in schedule order.
    pub fn scheduled_ops(&self) -> Vec<String> {
        let mut entries: Vec<&ScheduleEntry> = self.schedule.iter().collect();
        entries.sort_by_key(|e| e.order);
        entries.into_iter().map(|e| e.exec.clone()).collect()
    }

    /// Renumber `order` to match position.
    pub fn renumber_schedule(&mut self) {
        for (i, entry) in self.schedule.iter_mut().enumerate() {
            entry.order = i;
        }
    }
}

//! Operation handlers and the kind → handler registry
//!
//! A handler reads an `OpContext` snapshot and returns what should change:
//! the operation's outcome and any register writes. The executor applies
//! those writes only when the handler succeeds. Kinds with no registered
//! handler are completed as no-ops by the executor.

use reality_adapters::{Analyzer, ImageEncoder, Segmenter, Stylizer};
use reality_core::{
    Engine, Error, Geometry, OpOutcome, Operation, Provenance, Register, RegisterKind,
    RegisterPatch, Result,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const KIND_SEGMENTATION: &str = "segmentation";
pub const KIND_STYLE: &str = "style";
pub const KIND_LLM: &str = "llm";
pub const KIND_ANALYSIS: &str = "analysis";

/// Everything a handler may look at, captured just before dispatch.
#[derive(Clone, Debug)]
pub struct OpContext {
    pub operation: Operation,
    /// Data-wired inputs in register insertion order.
    pub inputs: Vec<Register>,
    pub source_image: Option<String>,
    /// Register named by `params.target_register_id`, if it exists.
    pub target: Option<Register>,
}

impl OpContext {
    fn input(&self, reg_id: &str) -> Option<&Register> {
        self.inputs.iter().find(|r| r.reg_id == reg_id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterWrite {
    pub reg_id: String,
    pub patch: RegisterPatch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandlerOutput {
    pub outcome: OpOutcome,
    pub writes: Vec<RegisterWrite>,
}

#[async_trait::async_trait]
pub trait OpHandler: Send + Sync {
    /// Kind tag this handler is registered under by default.
    fn kind(&self) -> &str;

    /// Progress line posted to the chat thread before `run`.
    fn announce(&self, _ctx: &OpContext) -> Option<String> {
        None
    }

    async fn run(&self, ctx: &OpContext) -> Result<HandlerOutput>;
}

/// External capabilities the built-in handlers call.
#[derive(Clone)]
pub struct Capabilities {
    pub segmenter: Arc<dyn Segmenter>,
    pub stylizer: Arc<dyn Stylizer>,
    pub analyzer: Arc<dyn Analyzer>,
    pub encoder: Arc<dyn ImageEncoder>,
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OpHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Segmentation, style, and analysis (`llm` and `analysis`) handlers.
    pub fn with_capabilities(caps: Capabilities) -> Self {
        let mut registry = Self::new();
        registry.register(SegmentationHandler::new(caps.segmenter));
        registry.register(StyleHandler::new(caps.stylizer, caps.encoder));
        let analysis = Arc::new(AnalysisHandler::new(caps.analyzer));
        registry.register_as(KIND_LLM, analysis.clone());
        registry.register_as(KIND_ANALYSIS, analysis);
        registry
    }

    /// Register under the handler's own kind. Replaces any existing handler.
    pub fn register(&mut self, handler: impl OpHandler + 'static) {
        let kind = handler.kind().to_string();
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn register_as(&mut self, kind: impl Into<String>, handler: Arc<dyn OpHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn remove(&mut self, kind: &str) -> bool {
        self.handlers.remove(kind).is_some()
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn OpHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

// ============================================================
// Segmentation
// ============================================================

pub struct SegmentationHandler {
    segmenter: Arc<dyn Segmenter>,
}

impl SegmentationHandler {
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self { segmenter }
    }

    /// `params.prompt`, else the target register's name, else "object".
    fn prompt(ctx: &OpContext) -> String {
        ctx.operation
            .prompt()
            .or_else(|| ctx.target.as_ref().map(|t| t.display_name()))
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("object")
            .to_string()
    }
}

#[async_trait::async_trait]
impl OpHandler for SegmentationHandler {
    fn kind(&self) -> &str {
        KIND_SEGMENTATION
    }

    fn announce(&self, ctx: &OpContext) -> Option<String> {
        Some(format!("Segmenting {}...", Self::prompt(ctx)))
    }

    async fn run(&self, ctx: &OpContext) -> Result<HandlerOutput> {
        let source = ctx
            .inputs
            .iter()
            .find_map(|r| r.image_ref(ctx.source_image.as_deref()))
            .ok_or_else(|| {
                Error::missing_input(format!(
                    "no image input for segmentation {}",
                    ctx.operation.op_id
                ))
            })?;

        let prompt = Self::prompt(ctx);
        let mask = self
            .segmenter
            .segment(source, &prompt)
            .await
            .map_err(|e| Error::adapter(self.segmenter.name(), e.to_string()))?;

        let mut writes = Vec::new();
        if let Some(target_id) = ctx.operation.target_register_id() {
            writes.push(RegisterWrite {
                reg_id: target_id.to_string(),
                patch: RegisterPatch {
                    geometry: Some(Geometry::image(&mask.url)),
                    provenance: Some(Provenance {
                        engine: Engine::Sam3,
                        request_id: ctx.operation.op_id.clone(),
                        mask_index: 0,
                        score: mask.score,
                        bbox: mask.bbox,
                    }),
                    ..Default::default()
                },
            });
        }

        Ok(HandlerOutput {
            outcome: OpOutcome::Mask { mask_url: mask.url },
            writes,
        })
    }
}

// ============================================================
// Style
// ============================================================

pub struct StyleHandler {
    stylizer: Arc<dyn Stylizer>,
    encoder: Arc<dyn ImageEncoder>,
}

impl StyleHandler {
    pub fn new(stylizer: Arc<dyn Stylizer>, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self { stylizer, encoder }
    }

    /// First input with its own image/mask payload; failing that, the first
    /// image-kind input, which resolves to the program source image.
    fn source<'a>(ctx: &'a OpContext) -> Option<(&'a Register, &'a str)> {
        ctx.inputs
            .iter()
            .find_map(|r| r.geometry.image_ref().map(|url| (r, url)))
            .or_else(|| {
                ctx.inputs
                    .iter()
                    .filter(|r| r.kind == RegisterKind::Image)
                    .find_map(|r| r.image_ref(ctx.source_image.as_deref()).map(|url| (r, url)))
            })
    }

    fn prompt(op: &Operation) -> String {
        format!(
            "Edit this image: {} {}",
            op.color().unwrap_or("styled"),
            op.prompt().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }
}

#[async_trait::async_trait]
impl OpHandler for StyleHandler {
    fn kind(&self) -> &str {
        KIND_STYLE
    }

    fn announce(&self, ctx: &OpContext) -> Option<String> {
        Self::source(ctx).map(|(reg, _)| format!("Styling {}...", reg.display_name()))
    }

    async fn run(&self, ctx: &OpContext) -> Result<HandlerOutput> {
        let op = &ctx.operation;
        let (source_reg, source_url) = Self::source(ctx).ok_or_else(|| {
            Error::missing_input(format!("no image input for style {}", op.op_id))
        })?;

        let encoded = self
            .encoder
            .encode(source_url)
            .await
            .map_err(|e| Error::adapter("image-encoder", e.to_string()))?;
        let image = self
            .stylizer
            .stylize(&Self::prompt(op), &encoded)
            .await
            .map_err(|e| Error::adapter(self.stylizer.name(), e.to_string()))?;
        let data_url = image.to_data_url();

        // No explicit target: restyle the source in place.
        let target_id = op.target_register_id().unwrap_or(&source_reg.reg_id);
        let target = ctx
            .target
            .as_ref()
            .filter(|t| t.reg_id == target_id)
            .or_else(|| ctx.input(target_id));

        let patch = RegisterPatch {
            geometry: Some(Geometry::image(&data_url)),
            display_name: target.map(|t| {
                format!("{} {}", op.color().unwrap_or("Styled"), t.display_name())
            }),
            ..Default::default()
        };

        Ok(HandlerOutput {
            outcome: OpOutcome::Image {
                image_url: data_url,
            },
            writes: vec![RegisterWrite {
                reg_id: target_id.to_string(),
                patch,
            }],
        })
    }
}

// ============================================================
// Analysis
// ============================================================

pub const NO_ANALYSIS: &str = "No analysis.";

pub struct AnalysisHandler {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }

    fn prompt(ctx: &OpContext) -> String {
        match ctx.operation.prompt() {
            Some(prompt) => prompt.to_string(),
            None => {
                let context = ctx
                    .inputs
                    .iter()
                    .map(|r| format!("{}: {}", r.display_name(), r.kind))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Analyze these objects: {}", context)
            }
        }
    }
}

#[async_trait::async_trait]
impl OpHandler for AnalysisHandler {
    fn kind(&self) -> &str {
        KIND_ANALYSIS
    }

    fn announce(&self, ctx: &OpContext) -> Option<String> {
        Some(format!("Analyzing: {}...", Self::prompt(ctx)))
    }

    async fn run(&self, ctx: &OpContext) -> Result<HandlerOutput> {
        let text = self
            .analyzer
            .analyze(&Self::prompt(ctx))
            .await
            .map_err(|e| Error::adapter(self.analyzer.name(), e.to_string()))?
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| NO_ANALYSIS.to_string());

        let writes = ctx
            .operation
            .target_register_id()
            .map(|target_id| RegisterWrite {
                reg_id: target_id.to_string(),
                patch: RegisterPatch {
                    kind: Some(RegisterKind::Text),
                    geometry: Some(Geometry::text(&text)),
                    ..Default::default()
                },
            })
            .into_iter()
            .collect();

        Ok(HandlerOutput {
            outcome: OpOutcome::Text { text },
            writes,
        })
    }
}

//! Capability result contracts and the wire shapes they are narrowed from

use crate::provider::{AdapterError, AdapterResult};
use reality_core::RegisterKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================
// Narrowed results
// ============================================================

/// A segmentation mask plus the first score/box the engine reported.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskRef {
    pub url: String,
    pub score: Option<f64>,
    pub bbox: Option<[f64; 4]>,
}

impl MaskRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            score: None,
            bbox: None,
        }
    }
}

/// Base64 image data ready for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

/// Image returned inline by the stylizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Register proposal with a compiler-local id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RegisterProposal {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: RegisterKind,
    #[serde(default, deserialize_with = "raw_value")]
    pub value: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Operation proposal; `input`/`output` hold compiler-local register ids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OperationProposal {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgramDelta {
    #[serde(default)]
    pub registers: Vec<RegisterProposal>,
    #[serde(default)]
    pub ops: Vec<OperationProposal>,
}

/// Compiler output after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledProgram {
    pub thought: String,
    pub delta: ProgramDelta,
}

/// Accept strings, numbers, and booleans as a raw register value.
fn raw_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

// ============================================================
// Segmentation wire shapes
// ============================================================

#[derive(Clone, Debug, Serialize)]
pub struct SegmentRequest {
    pub image_url: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_multiple_masks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_masks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_boxes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_scores: Option<bool>,
}

impl SegmentRequest {
    /// Bare `{image_url, prompt}` body.
    pub fn simple(image_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            prompt: prompt.into(),
            return_multiple_masks: None,
            max_masks: None,
            include_boxes: None,
            include_scores: None,
        }
    }

    pub fn with_masks(mut self, max_masks: u32) -> Self {
        self.return_multiple_masks = Some(true);
        self.max_masks = Some(max_masks);
        self.include_boxes = Some(true);
        self.include_scores = Some(true);
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SegmentResponse {
    #[serde(default)]
    pub image: Option<ImageUrl>,
    #[serde(default)]
    pub masks: Vec<ImageUrl>,
    #[serde(default)]
    pub scores: Vec<f64>,
    #[serde(default)]
    pub boxes: Vec<[f64; 4]>,
}

impl SegmentResponse {
    /// `image.url`, falling back to the first entry of `masks`.
    pub fn into_mask(self) -> AdapterResult<MaskRef> {
        let url = self
            .image
            .map(|i| i.url)
            .or_else(|| self.masks.into_iter().next().map(|m| m.url))
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AdapterError::MissingField("image.url".into()))?;
        Ok(MaskRef {
            url,
            score: self.scores.first().copied(),
            bbox: self.boxes.first().copied(),
        })
    }
}

// ============================================================
// generateContent wire shapes
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineData {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "inlineData", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn image(image: &EncodedImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".into()),
            parts,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GenerateContentRequest {
    /// Only sent through the proxy, which routes on it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            model: None,
            contents: vec![Content::user(parts)],
            generation_config: None,
        }
    }

    pub fn json_response(mut self) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .response_mime_type = Some("application/json".into());
        self
    }

    pub fn image_response(mut self) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .response_modalities = Some(vec!["TEXT".into(), "IMAGE".into()]);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// First non-empty text part of the first candidate.
    pub fn first_text(&self) -> Option<&str> {
        self.first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .find(|t| !t.trim().is_empty())
    }

    /// First inline image part of the first candidate.
    pub fn first_inline_image(&self) -> Option<InlineImage> {
        self.first_parts()
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
            .map(|d| InlineImage {
                mime_type: if d.mime_type.is_empty() {
                    "image/jpeg".into()
                } else {
                    d.mime_type.clone()
                },
                data: d.data.clone(),
            })
    }
}

// ============================================================
// Compiler response
// ============================================================

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompilerResponse {
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub program: Option<ProgramDelta>,
}

impl CompilerResponse {
    /// Parse the model's text, tolerating Markdown code fences.
    pub fn parse(text: &str) -> AdapterResult<Self> {
        let cleaned = strip_code_fences(text);
        serde_json::from_str(cleaned.trim())
            .map_err(|e| AdapterError::InvalidResponse(format!("compiler JSON: {}", e)))
    }

    pub fn into_compiled(self) -> AdapterResult<CompiledProgram> {
        let thought = self
            .thought
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AdapterError::MissingField("thought".into()))?;
        let delta = self
            .program
            .ok_or_else(|| AdapterError::MissingField("program".into()))?;
        Ok(CompiledProgram { thought, delta })
    }
}

pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "")
}

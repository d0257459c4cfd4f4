//! Reality Adapters - Capability contracts and HTTP clients for segmentation,
//! image editing, text analysis, and intent compilation

pub mod fal;
pub mod gemini;
mod http;
pub mod image;
pub mod prompt;
pub mod provider;
pub mod types;

pub use fal::{FalConfig, FalSegmenter};
pub use gemini::{GeminiClient, GeminiConfig};
pub use image::HttpImageEncoder;
pub use provider::{
    AdapterError, AdapterResult, Analyzer, ImageEncoder, IntentCompiler, Segmenter, Stylizer,
};
pub use types::*;

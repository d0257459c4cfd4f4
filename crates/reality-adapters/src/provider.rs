//! Capability traits
//!
//! The engine talks to external AI services only through these traits. Each
//! implementation validates the raw response at its own boundary and returns
//! the narrowed shape from `types`.

use crate::types::{CompiledProgram, EncodedImage, InlineImage, MaskRef};

/// Result type for adapter calls
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Adapter error types
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing field in response: {0}")]
    MissingField(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// segment(image, prompt) → mask
#[async_trait::async_trait]
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    async fn segment(&self, image_url: &str, prompt: &str) -> AdapterResult<MaskRef>;
}

/// stylize(prompt, image) → edited image
#[async_trait::async_trait]
pub trait Stylizer: Send + Sync {
    fn name(&self) -> &str;

    async fn stylize(&self, prompt: &str, image: &EncodedImage) -> AdapterResult<InlineImage>;
}

/// analyze(prompt) → text. `Ok(None)` when the service answered without text.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, prompt: &str) -> AdapterResult<Option<String>>;
}

/// compile(image, intent) → rationale plus register/operation proposals
#[async_trait::async_trait]
pub trait IntentCompiler: Send + Sync {
    fn name(&self) -> &str;

    async fn compile(&self, image_url: &str, intent: &str) -> AdapterResult<CompiledProgram>;
}

/// Turns an image reference into base64 data the stylizer can transmit.
#[async_trait::async_trait]
pub trait ImageEncoder: Send + Sync {
    async fn encode(&self, url: &str) -> AdapterResult<EncodedImage>;
}

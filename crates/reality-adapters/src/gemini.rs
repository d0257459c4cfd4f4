//! Gemini generateContent adapter: image editing, text analysis, and intent compilation

use crate::http::{build_client, non_empty_env, read_json, trim_base};
use crate::prompt::COMPILER_INSTRUCTION;
use crate::provider::{AdapterError, AdapterResult, Analyzer, IntentCompiler, Stylizer};
use crate::types::{
    CompiledProgram, CompilerResponse, EncodedImage, GenerateContentRequest,
    GenerateContentResponse, InlineImage, Part,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base: String,
    /// Model used to turn intents into programs.
    pub compile_model: String,
    /// Image-out model for style operations.
    pub style_model: String,
    /// Text model for analysis operations.
    pub analyze_model: String,
    /// Request timeout; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: GEMINI_API_BASE.to_string(),
            compile_model: "gemini-3-pro-preview".to_string(),
            style_model: "gemini-3-pro-image-preview".to_string(),
            analyze_model: "gemini-1.5-flash".to_string(),
            timeout_secs: 120,
        }
    }
}

enum Transport {
    Direct { api_key: String, api_base: String },
    Proxy { base_url: String },
}

pub struct GeminiClient {
    client: Client,
    transport: Transport,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: GeminiConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            transport: Transport::Direct {
                api_key: api_key.into(),
                api_base: trim_base(&config.api_base),
            },
            config,
        })
    }

    /// Go through `<base_url>/gemini/proxy`; the model travels in the body.
    pub fn via_proxy(base_url: impl AsRef<str>, config: GeminiConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            transport: Transport::Proxy {
                base_url: trim_base(base_url.as_ref()),
            },
            config,
        })
    }

    /// Direct client keyed from `GEMINI_API_KEY` or `GOOGLE_API_KEY`.
    pub fn from_env(config: GeminiConfig) -> AdapterResult<Self> {
        let api_key = non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or_else(|| AdapterError::AuthFailed("GEMINI_API_KEY is not set".into()))?;
        Self::new(api_key, config)
    }

    pub async fn generate(
        &self,
        model: &str,
        mut request: GenerateContentRequest,
    ) -> AdapterResult<GenerateContentResponse> {
        debug!("Gemini request: model={}", model);

        let builder = match &self.transport {
            Transport::Direct { api_key, api_base } => {
                request.model = None;
                self.client
                    .post(format!("{}/models/{}:generateContent", api_base, model))
                    .header("x-goog-api-key", api_key)
            }
            Transport::Proxy { base_url } => {
                request.model = Some(model.to_string());
                self.client.post(format!("{}/gemini/proxy", base_url))
            }
        };

        let response = builder.json(&request).send().await?;
        read_json("gemini", response).await
    }
}

#[async_trait::async_trait]
impl Stylizer for GeminiClient {
    fn name(&self) -> &str {
        "gemini-image"
    }

    async fn stylize(&self, prompt: &str, image: &EncodedImage) -> AdapterResult<InlineImage> {
        let request = GenerateContentRequest::new(vec![Part::text(prompt), Part::image(image)])
            .image_response();
        let response = self.generate(&self.config.style_model, request).await?;
        response.first_inline_image().ok_or_else(|| {
            AdapterError::MissingField("candidates[0].content.parts[].inline_data".into())
        })
    }
}

#[async_trait::async_trait]
impl Analyzer for GeminiClient {
    fn name(&self) -> &str {
        "gemini-text"
    }

    async fn analyze(&self, prompt: &str) -> AdapterResult<Option<String>> {
        let request = GenerateContentRequest::new(vec![Part::text(prompt)]);
        let response = self.generate(&self.config.analyze_model, request).await?;
        Ok(response.first_text().map(str::to_string))
    }
}

#[async_trait::async_trait]
impl IntentCompiler for GeminiClient {
    fn name(&self) -> &str {
        "gemini-compiler"
    }

    async fn compile(&self, image_url: &str, intent: &str) -> AdapterResult<CompiledProgram> {
        let request = GenerateContentRequest::new(vec![
            Part::text(COMPILER_INSTRUCTION),
            Part::text(format!("User Intent: {}", intent)),
            Part::text(format!("Image URL: {}", image_url)),
        ])
        .json_response();
        let response = self.generate(&self.config.compile_model, request).await?;
        let text = response.first_text().ok_or_else(|| {
            AdapterError::MissingField("candidates[0].content.parts[0].text".into())
        })?;
        CompilerResponse::parse(text)?.into_compiled()
    }
}

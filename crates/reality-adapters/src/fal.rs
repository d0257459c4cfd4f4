//! Fal SAM-3 segmentation adapter

use crate::http::{build_client, non_empty_env, read_json, trim_base};
use crate::provider::{AdapterError, AdapterResult, Segmenter};
use crate::types::{MaskRef, SegmentRequest, SegmentResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Synchronous endpoint; the queue endpoint answers with a ticket, not a mask.
pub const FAL_SAM3_URL: &str = "https://fal.run/fal-ai/sam-3/image";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FalConfig {
    /// Full SAM-3 endpoint URL.
    pub endpoint: String,
    /// Upper bound on masks requested per call.
    pub max_masks: u32,
    /// Request timeout; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            endpoint: FAL_SAM3_URL.to_string(),
            max_masks: 4,
            timeout_secs: 120,
        }
    }
}

enum Transport {
    Direct { api_key: String, endpoint: String },
    Proxy { base_url: String },
}

pub struct FalSegmenter {
    client: Client,
    transport: Transport,
    max_masks: u32,
}

impl FalSegmenter {
    /// Call Fal directly with `Authorization: Key <api_key>`.
    pub fn new(api_key: impl Into<String>, config: &FalConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            transport: Transport::Direct {
                api_key: api_key.into(),
                endpoint: config.endpoint.clone(),
            },
            max_masks: config.max_masks,
        })
    }

    /// Go through `<base_url>/fal/proxy`, which holds the key server-side.
    pub fn via_proxy(base_url: impl AsRef<str>, config: &FalConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            transport: Transport::Proxy {
                base_url: trim_base(base_url.as_ref()),
            },
            max_masks: config.max_masks,
        })
    }

    /// Direct client keyed from `FAL_KEY` or `FAL_API_KEY`.
    pub fn from_env(config: &FalConfig) -> AdapterResult<Self> {
        let api_key = non_empty_env("FAL_KEY")
            .or_else(|| non_empty_env("FAL_API_KEY"))
            .ok_or_else(|| AdapterError::AuthFailed("FAL_KEY is not set".into()))?;
        Self::new(api_key, config)
    }

    fn endpoint(&self) -> String {
        match &self.transport {
            Transport::Direct { endpoint, .. } => endpoint.clone(),
            Transport::Proxy { base_url } => format!("{}/fal/proxy", base_url),
        }
    }
}

#[async_trait::async_trait]
impl Segmenter for FalSegmenter {
    fn name(&self) -> &str {
        "fal-sam3"
    }

    async fn segment(&self, image_url: &str, prompt: &str) -> AdapterResult<MaskRef> {
        let endpoint = self.endpoint();
        debug!("SAM-3 request: endpoint={} prompt={}", endpoint, prompt);

        let request = match &self.transport {
            Transport::Direct { api_key, .. } => self
                .client
                .post(&endpoint)
                .header("Authorization", format!("Key {}", api_key))
                .json(&SegmentRequest::simple(image_url, prompt).with_masks(self.max_masks)),
            Transport::Proxy { .. } => self
                .client
                .post(&endpoint)
                .json(&SegmentRequest::simple(image_url, prompt)),
        };

        let response = request.send().await?;
        let parsed: SegmentResponse = read_json(self.name(), response).await?;
        parsed.into_mask()
    }
}

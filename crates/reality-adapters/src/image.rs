//! Image reference → base64 encoding

use crate::http::{build_client, trim_base};
use crate::provider::{AdapterError, AdapterResult, ImageEncoder};
use crate::types::EncodedImage;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, Url};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_MIME: &str = "image/jpeg";

/// Decodes `data:` URLs in place, reads `file://` and plain paths from disk,
/// and fetches everything else over HTTP (optionally through `<proxy>/proxy-image`).
pub struct HttpImageEncoder {
    client: Client,
    proxy_base: Option<String>,
}

impl HttpImageEncoder {
    pub fn new(timeout_secs: u64) -> AdapterResult<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            proxy_base: None,
        })
    }

    pub fn with_proxy(mut self, base_url: impl AsRef<str>) -> Self {
        let base = trim_base(base_url.as_ref());
        self.proxy_base = (!base.is_empty()).then_some(base);
        self
    }

    fn fetch_url(&self, url: &str) -> AdapterResult<Url> {
        match &self.proxy_base {
            Some(base) => Url::parse_with_params(&format!("{}/proxy-image", base), &[("url", url)]),
            None => Url::parse(url),
        }
        .map_err(|e| AdapterError::Encoding(format!("bad image url {}: {}", url, e)))
    }

    async fn fetch(&self, url: &str) -> AdapterResult<EncodedImage> {
        let target = self.fetch_url(url)?;
        debug!("Fetching image {}", target);
        let response = self.client.get(target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::RequestFailed(format!(
                "failed to fetch image {}: {}",
                url, status
            )));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let bytes = response.bytes().await?;
        Ok(EncodedImage {
            mime_type,
            data: BASE64.encode(&bytes),
        })
    }
}

#[async_trait::async_trait]
impl ImageEncoder for HttpImageEncoder {
    async fn encode(&self, url: &str) -> AdapterResult<EncodedImage> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch(url).await;
        }
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AdapterError::Encoding(format!("failed reading {}: {}", path.display(), e))
        })?;
        Ok(EncodedImage {
            mime_type: mime_for_path(path).unwrap_or(DEFAULT_MIME).to_string(),
            data: BASE64.encode(bytes),
        })
    }
}

/// Split a `data:<mime>[;base64],<payload>` URL. Non-base64 payloads are encoded.
pub fn decode_data_url(url: &str) -> AdapterResult<EncodedImage> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AdapterError::Encoding("not a data url".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AdapterError::Encoding("data url has no payload".into()))?;
    let mut fields = header.split(';');
    let mime_type = fields
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MIME)
        .to_string();
    let is_base64 = fields.any(|f| f.eq_ignore_ascii_case("base64"));
    let data = if is_base64 {
        payload.to_string()
    } else {
        BASE64.encode(payload.as_bytes())
    };
    Ok(EncodedImage { mime_type, data })
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_base64_passthrough() {
        let img = decode_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, "iVBORw0KGgo=");
    }

    #[test]
    fn data_url_without_mime_defaults_to_jpeg() {
        let img = decode_data_url("data:;base64,AAAA").unwrap();
        assert_eq!(img.mime_type, DEFAULT_MIME);
    }

    #[test]
    fn data_url_plain_payload_is_encoded() {
        let img = decode_data_url("data:text/plain,hi").unwrap();
        assert_eq!(img.data, BASE64.encode("hi"));
    }

    #[test]
    fn data_url_without_comma_is_rejected() {
        assert!(matches!(
            decode_data_url("data:image/png;base64"),
            Err(AdapterError::Encoding(_))
        ));
    }

    #[test]
    fn proxy_url_encodes_target() {
        let encoder = HttpImageEncoder::new(5).unwrap().with_proxy("https://proxy.local/");
        let url = encoder.fetch_url("https://img.example/a b.png").unwrap();
        assert!(url.as_str().starts_with("https://proxy.local/proxy-image?url="));
        assert!(url.as_str().contains("img.example"));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/desk.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("desk.bin")), None);
    }
}

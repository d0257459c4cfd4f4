//! Shared response handling for the HTTP adapters

use crate::provider::{AdapterError, AdapterResult};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::error;

const ERROR_BODY_MAX_CHARS: usize = 512;

pub(crate) fn build_client(timeout_secs: u64) -> AdapterResult<Client> {
    let mut builder = Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    Ok(builder.build()?)
}

/// Map a non-success status to an error, otherwise decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    adapter: &str,
    response: Response,
) -> AdapterResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let body = truncate_text(&body, ERROR_BODY_MAX_CHARS);
        error!("{} error {}: {}", adapter, status, body);
        return Err(match status.as_u16() {
            401 | 403 => AdapterError::AuthFailed(body),
            429 => AdapterError::RateLimited(body),
            _ => AdapterError::RequestFailed(format!("{} {}: {}", adapter, status, body)),
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        AdapterError::InvalidResponse(format!("{} returned invalid JSON: {}", adapter, e))
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

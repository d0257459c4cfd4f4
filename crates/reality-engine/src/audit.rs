//! Audit trail for graph mutations
//!
//! The store hands events to an unbounded channel and moves on. A background
//! task drains the channel into an `AuditSink`; sink failures are logged and
//! dropped, never reported back to the mutation that caused them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AddRegister,
    AddOp,
    AddWire,
    RemoveWire,
    ReorderSchedule,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AddRegister => "ADD_REGISTER",
            Self::AddOp => "ADD_OP",
            Self::AddWire => "ADD_WIRE",
            Self::RemoveWire => "REMOVE_WIRE",
            Self::ReorderSchedule => "REORDER_SCHEDULE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub action: AuditAction,
    /// Session that issued the mutation.
    pub actor_id: String,
    pub target_id: Option<String>,
    pub details: Value,
    pub metadata: Value,
}

/// Destination for audit events.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Fire-and-forget handle used by the graph store.
#[derive(Clone)]
pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<AuditEvent>>,
    actor_id: String,
}

impl AuditLog {
    /// Start a drain task feeding `sink`. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (log, mut rx) = Self::channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.record(&event).await {
                    warn!("Audit sink failed for {}: {}", event.action, e);
                }
            }
        });
        log
    }

    /// A log plus the receiving end, for callers that drain events themselves.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                actor_id: uuid::Uuid::new_v4().to_string(),
            },
            rx,
        )
    }

    pub fn disabled() -> Self {
        Self {
            tx: None,
            actor_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn log(&self, action: AuditAction, target_id: Option<&str>, details: Value) {
        let Some(tx) = &self.tx else { return };
        let event = AuditEvent {
            ts: Utc::now(),
            action,
            actor_id: self.actor_id.clone(),
            target_id: target_id.map(str::to_string),
            details,
            metadata: serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
        };
        if tx.send(event).is_err() {
            debug!("Audit channel closed, dropping {}", action);
        }
    }
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// POSTs each event to `<base_url>/audit/log`.
pub struct HttpAuditSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAuditSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/audit/log", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait::async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("audit endpoint returned {}", status);
        }
        Ok(())
    }
}

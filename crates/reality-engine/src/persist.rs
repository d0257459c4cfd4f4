//! Program persistence boundary
//!
//! The runtime only knows `ProgramStore`. The local driver writes one pretty
//! JSON file per program and hands back `local://<id>` handles.

use reality_core::{Error, Program, Result};
use std::path::{Path, PathBuf};

pub const LOCAL_SCHEME: &str = "local://";
const PROGRAM_SUFFIX: &str = ".rsl.json";

#[async_trait::async_trait]
pub trait ProgramStore: Send + Sync {
    /// Persist and return an opaque handle for `load`.
    async fn save(&self, program: &Program) -> Result<String>;

    /// `Ok(None)` when nothing is stored under the handle.
    async fn load(&self, handle: &str) -> Result<Option<Program>>;

    async fn list(&self) -> Result<Vec<String>>;
}

/// Writes `<dir>/<id>.rsl.json`.
pub struct LocalProgramStore {
    dir: PathBuf,
}

impl LocalProgramStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(Error::Persistence(format!("invalid program id {:?}", id)));
        }
        Ok(self.dir.join(format!("{}{}", id, PROGRAM_SUFFIX)))
    }
}

#[async_trait::async_trait]
impl ProgramStore for LocalProgramStore {
    async fn save(&self, program: &Program) -> Result<String> {
        let path = self.path_for(&program.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(program)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!("saved program to {}", path.display());
        Ok(format!("{}{}", LOCAL_SCHEME, program.id))
    }

    async fn load(&self, handle: &str) -> Result<Option<Program>> {
        let id = handle.strip_prefix(LOCAL_SCHEME).unwrap_or(handle);
        let path = self.path_for(id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(PROGRAM_SUFFIX) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

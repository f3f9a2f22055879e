use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skytrack_core::run::STATUS_SCHEMA_VERSION;
use skytrack_core::{IngestionRun, RunId, RunPatch, RunStatus, Window};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{check_transition, LedgerError, RunLedger};


#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    next_id: RunId,
    runs: Vec<IngestionRun>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: STATUS_SCHEMA_VERSION,
            next_id: 1,
            runs: Vec::new(),
        }
    }
}

impl LedgerDocument {
    fn find_mut(&mut self, id: RunId) -> Option<&mut IngestionRun> {
        self.runs.iter_mut().find(|r| r.id == Some(id))
    }
}

/// Run ledger persisted as one JSON document.
///
/// All writes go through a single async mutex. Each write builds the next
/// document on a copy, replaces the file atomically (temp file, fsync,
/// rename), and only then swaps the in-memory state. A failed write leaves
/// both the file and memory untouched.
pub struct FileRunLedger {
    path: PathBuf,
    state: Mutex<LedgerDocument>,
}

impl FileRunLedger {
    /// Open (or initialize) the ledger at `path`. Parent directories are created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: LedgerDocument = serde_json::from_slice(&bytes)?;
                if doc.version > STATUS_SCHEMA_VERSION {
                    return Err(LedgerError::UnsupportedVersion {
                        found: doc.version,
                        supported: STATUS_SCHEMA_VERSION,
                    });
                }
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerDocument::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            runs = doc.runs.len(),
            next_id = doc.next_id,
            "Run ledger opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, doc: &LedgerDocument) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| LedgerError::Unavailable(format!("persist task failed: {e}")))??;
        Ok(())
    }

    async fn select(
        &self,
        filter: impl Fn(&IngestionRun) -> bool,
        limit: Option<usize>,
    ) -> Vec<IngestionRun> {
        let state = self.state.lock().await;
        let mut runs: Vec<IngestionRun> = state.runs.iter().filter(|r| filter(r)).cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            runs.truncate(limit);
        }
        runs
    }
}

/// Write `bytes` next to `path`, flush to disk, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    write_atomic_with(path, bytes, sync_dir)
}

fn write_atomic_with(
    path: &Path,
    bytes: &[u8],
    sync_parent: impl FnOnce(&Path) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger.json".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    // The rename is the commit point; a failed directory sync is only logged.
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = sync_parent(dir) {
            warn!(dir = %dir.display(), error = %e, "Ledger directory fsync failed after rename");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait::async_trait]
impl RunLedger for FileRunLedger {
    async fn create(&self, window: &Window, status: RunStatus) -> Result<IngestionRun, LedgerError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let id = next.next_id;
        let run = IngestionRun::new(id, *window, status, Utc::now());
        next.next_id += 1;
        next.runs.push(run.clone());

        self.persist(&next).await?;
        *state = next;
        debug!(run_id = id, status = %status, "Run created");
        Ok(run)
    }

    async fn update(&self, id: RunId, patch: &RunPatch) -> Result<IngestionRun, LedgerError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let run = next.find_mut(id).ok_or(LedgerError::NotFound(id))?;
        check_transition(run)?;
        run.apply(patch);
        let updated = run.clone();

        self.persist(&next).await?;
        *state = next;
        debug!(run_id = id, status = %updated.status, "Run updated");
        Ok(updated)
    }

    async fn get(&self, id: RunId) -> Result<IngestionRun, LedgerError> {
        let state = self.state.lock().await;
        state
            .runs
            .iter()
            .find(|r| r.id == Some(id))
            .cloned()
            .ok_or(LedgerError::NotFound(id))
    }

    async fn list_latest(&self, limit: usize) -> Result<Vec<IngestionRun>, LedgerError> {
        Ok(self.select(|_| true, Some(limit)).await)
    }

    async fn list_by_status(&self, status: RunStatus) -> Result<Vec<IngestionRun>, LedgerError> {
        Ok(self.select(|r| r.status == status, None).await)
    }

    async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, LedgerError> {
        Ok(self
            .select(|r| r.window_start >= start && r.window_end <= end, None)
            .await)
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

//! File-backed job store.
//!
//! Layout under the jobs directory:
//!
//! ```text
//! <dir>/<id>/job.json       record, replaced atomically on every save
//! <dir>/<id>/events.jsonl   one JSON event per line, fsynced per append
//! ```
//!
//! File I/O runs on tokio's blocking pool.

use async_trait::async_trait;
use relay_application::{JobStore, StoreError};
use relay_domain::{Job, JobEvent};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const RECORD_FILE: &str = "job.json";
const EVENTS_FILE: &str = "events.jsonl";

#[derive(Clone)]
pub struct FileJobStore {
    root: PathBuf,
    // Serializes appends so lines from concurrent jobs never interleave.
    append_lock: Arc<Mutex<()>>,
}

impl FileJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    /// Run `op` against a clone of this store on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(FileJobStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    fn write_record(&self, job: &Job) -> Result<(), StoreError> {
        let dir = self.job_dir(&job.id)?;
        std::fs::create_dir_all(&dir)?;
        let body = serde_json::to_string_pretty(job).map_err(|e| StoreError::Corrupt {
            id: job.id.clone(),
            reason: e.to_string(),
        })?;

        let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, dir.join(RECORD_FILE))?;
        debug!(job_id = %job.id, state = %job.state.as_str(), "Job record saved");
        Ok(())
    }

    fn read_record(&self, id: &str) -> Result<Job, StoreError> {
        let path = self.job_dir(id)?.join(RECORD_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn read_all(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.read_record(&id) {
                Ok(job) => jobs.push(job),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => warn!(job_id = %id, "Skipping unreadable job: {e}"),
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn append_line(&self, event: &JobEvent) -> Result<(), StoreError> {
        let dir = self.job_dir(&event.job_id)?;
        std::fs::create_dir_all(&dir)?;
        let line = serde_json::to_string(event).map_err(|e| StoreError::Corrupt {
            id: event.job_id.clone(),
            reason: e.to_string(),
        })?;

        let _guard = self.append_lock.lock().unwrap_or_else(|e| e.into_inner());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn read_events(&self, id: &str) -> Result<Vec<JobEvent>, StoreError> {
        let path = self.job_dir(id)?.join(EVENTS_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut events = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                // A crash mid-append can leave a torn last line.
                Err(e) => warn!(job_id = id, line = lineno + 1, "Skipping unreadable event: {e}"),
            }
        }
        Ok(events)
    }
}

/// Job ids become directory names; reject anything that could escape `root`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let job = job.clone();
        self.blocking(move |store| store.write_record(&job)).await
    }

    async fn load(&self, id: &str) -> Result<Job, StoreError> {
        let id = id.to_string();
        self.blocking(move |store| store.read_record(&id)).await
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.blocking(|store| store.read_all()).await
    }

    async fn append_event(&self, event: &JobEvent) -> Result<(), StoreError> {
        let event = event.clone();
        self.blocking(move |store| store.append_line(&event)).await
    }

    async fn events(&self, id: &str) -> Result<Vec<JobEvent>, StoreError> {
        let id = id.to_string();
        self.blocking(move |store| store.read_events(&id)).await
    }
}

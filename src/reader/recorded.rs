use super::{ReadRequest, ReaderError, ReaderResult, ResourceReader};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Reader that replays previously recorded control-plane responses.
///
/// Powers offline analysis (`analyze --offline <dir>`) against a
/// directory of `<cache_key>.json` files captured from a live run, and
/// doubles as the deterministic backend for the test suite via the
/// in-memory builders.
pub struct RecordedReader {
    responses: HashMap<String, Value>,
    errors: Mutex<HashMap<String, Vec<ReaderError>>>,
}

impl RecordedReader {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Load every `*.json` file from a recording directory. File stems are
    /// the request cache keys.
    pub fn from_dir(dir: &Path) -> ReaderResult<Self> {
        if !dir.is_dir() {
            return Err(ReaderError::NotFound(format!(
                "recording directory {} does not exist",
                dir.display()
            )));
        }

        let mut responses = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&content)?;
            responses.insert(stem.to_string(), value);
        }

        info!(
            "loaded {} recorded responses from {}",
            responses.len(),
            dir.display()
        );
        Ok(Self {
            responses,
            errors: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_response(mut self, request: &ReadRequest, value: Value) -> Self {
        self.responses.insert(request.cache_key(), value);
        self
    }

    /// Queue an error for a request. Queued errors are returned before any
    /// recorded response, one per call, so transient-then-success
    /// sequences can be replayed.
    pub fn with_error(self, request: &ReadRequest, error: ReaderError) -> Self {
        self.errors
            .lock()
            .unwrap()
            .entry(request.cache_key())
            .or_default()
            .push(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl Default for RecordedReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceReader for RecordedReader {
    async fn read(&self, request: &ReadRequest) -> ReaderResult<Value> {
        let key = request.cache_key();

        if let Some(queued) = self.errors.lock().unwrap().get_mut(&key) {
            if !queued.is_empty() {
                return Err(queued.remove(0));
            }
        }

        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| ReaderError::NotFound(format!("no recording for {}", key)))
    }

    async fn validate(&self) -> ReaderResult<()> {
        if self.responses.is_empty() && self.errors.lock().unwrap().is_empty() {
            return Err(ReaderError::NotFound(
                "recording set is empty".to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorded"
    }
}

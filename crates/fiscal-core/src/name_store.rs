use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STATE_FILE_NAME: &str = "console-state.json";
pub const CLIENT_NAME_KEY: &str = "client_name";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file io failed: {0}")]
    Io(#[from] io::Error),
    #[error("state file is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client display name persisted between sessions so the header is never blank
/// while the first config fetch is outstanding.
#[derive(Debug, Clone)]
pub struct DisplayNameStore {
    path: Option<PathBuf>,
}

impl DisplayNameStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: Some(state_dir.join(STATE_FILE_NAME)),
        }
    }

    /// A store that remembers nothing; used when no state directory is wanted.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<Option<String>, StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(None);
        };
        let entries = match read_entries(path)? {
            Some(entries) => entries,
            None => return Ok(None),
        };
        Ok(entries
            .get(CLIENT_NAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    pub fn save(&self, name: &str) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        // A corrupt file is replaced rather than blocking the new name.
        let mut entries = read_entries(path).ok().flatten().unwrap_or_default();
        entries.insert(CLIENT_NAME_KEY.to_string(), Value::String(name.to_string()));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec_pretty(&Value::Object(entries))?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<Map<String, Value>>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(&contents)? {
        Value::Object(entries) => Ok(Some(entries)),
        _ => Ok(None),
    }
}

//! JSON files under `~/.archgraph`: one `<name>.json` per diagram plus `settings.json`.

use std::fs;
use std::path::{Path, PathBuf};

use archgraph_core::{Diagram, DiagramStore, GroupingOptions};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SETTINGS_FILE: &str = "settings.json";

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".archgraph")
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid diagram name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a valid diagram: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Diagram names double as file stems, so they are restricted to a safe alphabet.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "settings"
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DiagramStore for FileStore {
    type Error = StoreError;

    fn load(&self, name: &str) -> Result<Option<Diagram>, StoreError> {
        let path = self.path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    /// Atomic write (temp file + rename) so readers never see a half-written diagram.
    fn save(&self, name: &str, diagram: &Diagram) -> Result<(), StoreError> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let json = serde_json::to_string_pretty(diagram).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = self.dir.join(format!(".{}.json.tmp", name));
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map_err(io_error(&self.dir))?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json")
                    .filter(|stem| is_valid_name(stem))
                    .map(|stem| stem.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

// --- Settings ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grouping: GroupingOptions,
}

/// Read `settings.json` from `dir`. A missing or unreadable file yields the defaults.
pub fn read_settings(dir: &Path) -> Settings {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Settings::default();
    }
    match fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
    {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            Settings::default()
        }
    }
}

//! Filesystem persistence for tournament inputs and results.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::types::{EvaluationUnit, RankResult, UnitId, UnitRecord, INPUT_PREFIX};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("not a unit input file: {0}")]
    NotAUnit(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serialize as pretty JSON with four-space indentation. Non-ASCII is kept
/// verbatim.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Write `bytes` to a temporary sibling and rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, err));
    }
    Ok(())
}

/// Read and parse one `random_<id>.json` input.
pub fn load_unit(path: &Path) -> Result<EvaluationUnit, StoreError> {
    let id = UnitId::from_input_path(path).ok_or_else(|| StoreError::NotAUnit(path.to_path_buf()))?;
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let record: UnitRecord = serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))?;
    Ok(EvaluationUnit::from_record(id, record))
}

/// Unit input files in `dir`, sorted by file name.
pub fn list_unit_inputs(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_input = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(INPUT_PREFIX))
            .unwrap_or(false);
        if is_input && UnitId::from_input_path(&path).is_some() {
            paths.push(path);
        } else {
            debug!(path = %path.display(), "ignoring non-unit file");
        }
    }
    paths.sort();
    Ok(paths)
}

/// Result directory for one model run.
#[derive(Debug, Clone)]
pub struct RankStore {
    root: PathBuf,
}

impl RankStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_path(&self, id: &UnitId) -> PathBuf {
        self.root.join(id.output_file_name())
    }

    /// Whether a persisted result exists. Existence alone decides skipping.
    pub fn exists(&self, id: &UnitId) -> bool {
        self.output_path(id).exists()
    }

    pub fn load(&self, id: &UnitId) -> Result<RankResult, StoreError> {
        let path = self.output_path(id);
        let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| StoreError::json(&path, e))
    }

    pub fn save(&self, id: &UnitId, result: &RankResult) -> Result<PathBuf, StoreError> {
        let path = self.output_path(id);
        let bytes = to_pretty_json(result).map_err(|e| StoreError::json(&path, e))?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

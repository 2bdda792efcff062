//! The wrapped-array export document.
//!
//! The ingest API consumes `{"recentlyUpdatedPlayers": [...]}`. This
//! type owns that file: reads tolerate both the wrapped shape and a
//! bare array (older runs produced one), writes always produce the
//! wrapped shape, and a malformed file is recovered as empty rather
//! than aborting a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

pub const WRAPPER_KEY: &str = "recentlyUpdatedPlayers";

pub struct WrappedArrayFile {
    path: PathBuf,
}

impl WrappedArrayFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current items. Missing file is empty; malformed
    /// content is logged and treated as empty.
    pub fn load(&self) -> Vec<Value> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Object(mut map)) => match map.remove(WRAPPER_KEY) {
                Some(Value::Array(items)) => items,
                _ => {
                    warn!(path = %self.path.display(), "Export document missing its array, starting fresh");
                    Vec::new()
                }
            },
            _ => {
                warn!(path = %self.path.display(), "Export document unreadable, starting fresh");
                Vec::new()
            }
        }
    }

    /// Append one item with a read-modify-rewrite of the whole
    /// document. Callers serialize access; this type does not lock.
    pub fn append(&self, item: Value) -> Result<()> {
        let mut items = self.load();
        items.push(item);
        self.write_items(&items)
    }

    fn write_items(&self, items: &[Value]) -> Result<()> {
        let doc = serde_json::json!({ WRAPPER_KEY: items });
        std::fs::write(&self.path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

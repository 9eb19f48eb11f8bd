//! Exchange files on disk
//!
//! A store is one exchange JSON file. Every mutating command loads it,
//! applies its change in memory and writes the result back through a
//! sibling temporary file, so a failed command never leaves a half-written
//! store behind.

use eyre::{Result, WrapErr};
use spanlink_core::{AnnotationId, AnnotationRegistry, ProjectFile, SourceKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct Store {
    path: PathBuf,
    registry: AnnotationRegistry,
}

impl Store {
    /// Load an existing store. The file must exist and validate.
    pub fn open(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read store {}", path.display()))?;
        let registry = AnnotationRegistry::deserialize(&json)
            .wrap_err_with(|| format!("Invalid store {}", path.display()))?;
        debug!(path = %path.display(), annotations = registry.len(), "loaded store");
        Ok(Self {
            path: path.to_owned(),
            registry,
        })
    }

    /// Load a store, starting an empty one if the file does not exist yet.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::open(path);
        }
        info!(path = %path.display(), "creating new store");
        Ok(Self {
            path: path.to_owned(),
            registry: AnnotationRegistry::new(),
        })
    }

    pub fn registry(&self) -> &AnnotationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AnnotationRegistry {
        &mut self.registry
    }

    /// Find a registered file by name in either list.
    pub fn file(&self, name: &str) -> Result<&ProjectFile> {
        [SourceKind::Doc, SourceKind::Code]
            .into_iter()
            .find_map(|kind| self.registry.file_by_name(kind, name))
            .ok_or_else(|| eyre::eyre!("No file named `{name}` in {}", self.path.display()))
    }

    pub fn parse_id(raw: &str) -> Result<AnnotationId> {
        raw.parse()
            .wrap_err_with(|| format!("`{raw}` is not an annotation id"))
    }

    /// Serialize and replace the file on disk.
    pub fn save(&self, pretty: bool) -> Result<()> {
        let json = self
            .registry
            .serialize(pretty)
            .wrap_err("Failed to serialize annotations")?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store.json".to_owned());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));
        std::fs::write(&tmp, json)
            .wrap_err_with(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(err) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err)
                .wrap_err_with(|| format!("Failed to replace {}", self.path.display()));
        }
        debug!(path = %self.path.display(), "saved store");
        Ok(())
    }
}

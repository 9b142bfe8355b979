use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};
use patchwatch::PatchCollection;
use tempfile::NamedTempFile;
use tracing::debug;

/// Load the store, treating a missing file as an empty collection.
pub fn load(path: &Path) -> Result<PatchCollection> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "store not found, starting empty");
            return Ok(PatchCollection::new());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    if text.trim().is_empty() {
        return Ok(PatchCollection::new());
    }

    let mut collection = PatchCollection::new();
    collection
        .import_json(&text)
        .with_context(|| format!("failed to load store {}", path.display()))?;
    Ok(collection)
}

/// Write the store through a sibling temp file so an interrupted save never
/// leaves a truncated store behind.
pub fn save(path: &Path, collection: &PatchCollection) -> Result<()> {
    let json = collection.export_json()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all((json + "\n").as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("failed to write {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

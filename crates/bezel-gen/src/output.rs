//! Persistence of the canonical registry and the distributable artifact

use crate::error::{Error, Result};
use crate::registry::{DeviceMap, Registry};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Shape of the artifact shipped with the lookup library
#[derive(Serialize)]
struct Distributable<'a> {
    devices: &'a DeviceMap,
}

/// Pretty-printed full registry, newline-terminated
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_canonical_json(registry: &Registry) -> Result<String> {
    let mut json = serde_json::to_string_pretty(registry)?;
    json.push('\n');
    Ok(json)
}

/// Minified `{"devices": ...}` with `pending` and `problematic` stripped
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_distributable_json(registry: &Registry) -> Result<String> {
    Ok(serde_json::to_string(&Distributable {
        devices: &registry.devices,
    })?)
}

/// Write the canonical registry and the distributable artifact.
///
/// Both documents are serialized before either file is touched, and each
/// file is replaced atomically.
///
/// # Errors
///
/// Returns [`Error::RegistryInvalid`] without writing anything if the
/// registry fails [`Registry::validate`], and [`Error::Persistence`] if
/// either file cannot be written.
pub fn save(registry: &Registry, canonical: &Path, distributable: &Path) -> Result<()> {
    registry
        .validate()
        .map_err(|reason| Error::RegistryInvalid {
            path: canonical.to_path_buf(),
            reason,
        })?;
    let canonical_json = to_canonical_json(registry)?;
    let distributable_json = to_distributable_json(registry)?;

    write_atomic(canonical, &canonical_json)?;
    write_atomic(distributable, &distributable_json)?;
    tracing::info!(
        canonical = %canonical.display(),
        distributable = %distributable.display(),
        devices = registry.device_count(),
        "saved registry"
    );
    Ok(())
}

/// Write `content` to a temporary file next to `path`, then rename it over
/// `path`.
///
/// # Errors
///
/// Returns [`Error::Persistence`] on any IO failure.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let persistence = |source: std::io::Error| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(persistence)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(persistence)?;
    file.write_all(content.as_bytes()).map_err(persistence)?;
    file.as_file().sync_all().map_err(persistence)?;
    file.persist(path).map_err(|e| persistence(e.error))?;
    Ok(())
}

//! Reader for the `.yml` mapping config that may sit next to a schema file.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use protosync_shared::{MappingConfig, MappingDeclaration, ProtoSyncError, Result};

/// Extension of sibling mapping config files.
const MAPPING_CONFIG_EXTENSION: &str = "yml";

/// Path of the mapping config that belongs to `schema`.
fn mapping_config_path(schema: &Path) -> PathBuf {
    schema.with_extension(MAPPING_CONFIG_EXTENSION)
}

/// Read the mapping declared for `schema`, if any.
///
/// A missing sibling or one without `elasticsearch.mappings` is
/// [`MappingDeclaration::Absent`]. An unreadable or malformed sibling is
/// [`MappingDeclaration::Invalid`]; callers record it per file.
pub fn read_mapping(schema: &Path) -> MappingDeclaration {
    let config_path = mapping_config_path(schema);
    if !config_path.is_file() {
        return MappingDeclaration::Absent;
    }

    let doc_type = schema
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match load_mappings(&config_path) {
        Ok(Some(mappings)) => {
            debug!(path = %config_path.display(), %doc_type, "mapping declared");
            MappingDeclaration::Declared(MappingConfig { doc_type, mappings })
        }
        Ok(None) => MappingDeclaration::Absent,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "unreadable mapping config");
            MappingDeclaration::Invalid(e.to_string())
        }
    }
}

/// Parse `path` and extract `elasticsearch.mappings` as JSON.
fn load_mappings(path: &Path) -> Result<Option<serde_json::Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| ProtoSyncError::io(path, e))?;

    let doc: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
        ProtoSyncError::validation(format!("failed to parse {}: {e}", path.display()))
    })?;

    let mappings = match doc.get("elasticsearch").and_then(|es| es.get("mappings")) {
        Some(serde_yaml::Value::Null) | None => return Ok(None),
        Some(v) => v,
    };

    serde_json::to_value(mappings).map(Some).map_err(|e| {
        ProtoSyncError::validation(format!(
            "{}: mappings are not representable as JSON: {e}",
            path.display()
        ))
    })
}

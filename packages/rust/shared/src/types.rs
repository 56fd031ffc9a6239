//! Core domain types for protosync.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Field under which declared mappings live inside every document type.
const DOCUMENT_ROOT_FIELD: &str = "properties";

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A named plugin module that may own schema files.
///
/// `path` is relative to the project root. Names may contain `/`
/// (`vendor/package`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
}

impl Module {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Name with `/` separators flattened to `.`, as used in index names.
    pub fn dotted_name(&self) -> String {
        self.name.replace('/', ".")
    }
}

// ---------------------------------------------------------------------------
// MappingConfig
// ---------------------------------------------------------------------------

/// Declared index mapping for one schema file.
///
/// `mappings` is forwarded verbatim to the index service as the definition of
/// the `properties` field of `doc_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Document type name (the schema file stem).
    pub doc_type: String,
    /// Opaque field mapping taken from `elasticsearch.mappings`.
    pub mappings: Value,
}

impl MappingConfig {
    /// Type-keyed mapping body, as accepted by put-mapping.
    pub fn mapping_body(&self) -> Value {
        json!({
            self.doc_type.as_str(): {
                "properties": {
                    DOCUMENT_ROOT_FIELD: self.mappings.clone(),
                }
            }
        })
    }

    /// Request body for creating a concrete index carrying this mapping.
    pub fn create_index_body(&self) -> Value {
        json!({ "mappings": self.mapping_body() })
    }
}

/// What the sibling config file of a schema file declares.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingDeclaration {
    /// No sibling config, or one without `elasticsearch.mappings`.
    Absent,
    /// A mapping to synchronize.
    Declared(MappingConfig),
    /// The sibling config exists but could not be read or parsed.
    Invalid(String),
}

// ---------------------------------------------------------------------------
// SchemaFile
// ---------------------------------------------------------------------------

/// A collected schema file and its optional mapping declaration.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    /// Location in the module's schema directory.
    pub path: PathBuf,
    /// Location of the staged copy in the output directory.
    pub staged: PathBuf,
    /// Mapping declared in the sibling config file.
    pub mapping: MappingDeclaration,
}

impl SchemaFile {
    /// Bare file name, e.g. `contact.proto`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// SyncStatus
// ---------------------------------------------------------------------------

/// Per-file outcome of mapping synchronization, as shown in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// The declared mapping is in place.
    Yes,
    /// No mapping declared; nothing attempted.
    No,
    /// Synchronization was attempted and failed.
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

//! Elasticsearch administration surface used by protosync.
//!
//! [`IndexService`] is the narrow set of admin calls the mapping synchronizer
//! needs. [`ElasticClient`] implements it over the REST API; tests substitute
//! an in-memory implementation.

mod client;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use protosync_shared::{ProtoSyncError, Result};

pub use client::ElasticClient;

/// Concrete index name → alias names pointing at it.
pub type AliasMap = BTreeMap<String, Vec<String>>;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What a name currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexResolution {
    /// Neither an index nor an alias by that name exists.
    NotFound,
    /// The name is itself a concrete index, with no alias indirection.
    Standalone(String),
    /// The name is an alias for exactly one concrete index.
    Aliased(String),
}

/// Outcome of an in-place mapping extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingUpdate {
    /// The index accepted the mapping.
    Applied,
    /// The mapping conflicts with existing field types; needs a re-index.
    Conflict,
    /// The service could not be reached reliably; retries were exhausted.
    TransientFailure(String),
}

/// One step of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
    /// Delete a concrete index in the same atomic step, so an alias can take
    /// over its name.
    RemoveIndex { index: String },
}

// ---------------------------------------------------------------------------
// IndexService
// ---------------------------------------------------------------------------

/// Admin operations on a document index service.
#[allow(async_fn_in_trait)]
pub trait IndexService {
    /// Register a snapshot repository.
    async fn create_repository(&self, repository: &str, body: &Value) -> Result<()>;

    /// Take a snapshot of all indices into `repository`.
    async fn create_snapshot(&self, repository: &str, snapshot: &str) -> Result<()>;

    /// Whether `name` exists, as an index or as an alias.
    async fn index_exists(&self, name: &str) -> Result<bool>;

    /// Create a concrete index with the given body (mappings, settings).
    async fn create_index(&self, name: &str, body: &Value) -> Result<()>;

    /// Point `alias` at `index`.
    async fn put_alias(&self, index: &str, alias: &str) -> Result<()>;

    /// Aliases of every index that `name` resolves to.
    async fn get_aliases_for(&self, name: &str) -> Result<AliasMap>;

    /// Extend the mapping of `doc_type` in `index` in place.
    async fn put_mapping(&self, index: &str, doc_type: &str, body: &Value)
    -> Result<MappingUpdate>;

    /// Copy every document from `source` into `dest`, waiting for completion.
    async fn reindex(&self, source: &str, dest: &str) -> Result<()>;

    /// Delete a concrete index.
    async fn delete_index(&self, name: &str) -> Result<()>;

    /// Apply all alias actions as one atomic operation.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()>;

    /// Resolve `name` to [`IndexResolution`].
    async fn resolve(&self, name: &str) -> Result<IndexResolution> {
        if !self.index_exists(name).await? {
            return Ok(IndexResolution::NotFound);
        }
        let aliases = self.get_aliases_for(name).await?;
        resolution_from_aliases(name, &aliases)
    }
}

/// Classify `name` from the alias listing of the indices it resolves to.
///
/// A listing keyed by `name` itself means `name` is a concrete index. Otherwise
/// exactly one concrete index must carry `name` as an alias.
pub fn resolution_from_aliases(name: &str, aliases: &AliasMap) -> Result<IndexResolution> {
    if aliases.contains_key(name) {
        return Ok(IndexResolution::Standalone(name.to_string()));
    }

    let targets: Vec<&String> = aliases
        .iter()
        .filter(|(_, names)| names.iter().any(|a| a == name))
        .map(|(index, _)| index)
        .collect();

    match targets.as_slice() {
        [target] => Ok(IndexResolution::Aliased((*target).clone())),
        [] => Err(ProtoSyncError::validation(format!(
            "'{name}' exists but resolves to no index"
        ))),
        many => Err(ProtoSyncError::validation(format!(
            "alias '{name}' points to {} indices: {}",
            many.len(),
            many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

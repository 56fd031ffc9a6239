//! In-memory fakes for the index service and the schema compiler.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde_json::Value;

use protosync_search::{AliasAction, AliasMap, IndexService, MappingUpdate};
use protosync_shared::{ProtoSyncError, Result};

use crate::compiler::{CompilerInvocation, CompilerOutput, CompilerRunner};

#[derive(Debug, Default, Clone)]
struct MemIndex {
    /// Document type → type mapping (`{"properties": {...}}`).
    mappings: Value,
    documents: Vec<Value>,
    aliases: BTreeSet<String>,
}

/// Index names and alias → targets, captured after every mutating call.
#[derive(Debug, Clone)]
struct Observed {
    indices: BTreeSet<String>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl Observed {
    fn resolve(&self, name: &str) -> Vec<String> {
        if self.indices.contains(name) {
            vec![name.to_string()]
        } else {
            self.aliases.get(name).cloned().unwrap_or_default()
        }
    }
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, MemIndex>,
    calls: Vec<String>,
    history: Vec<Observed>,
    fail_on: Option<String>,
    transient_mapping: bool,
    snapshots: Vec<(String, String)>,
    repositories: BTreeMap<String, Value>,
}

impl State {
    fn alias_targets(&self, alias: &str) -> Vec<String> {
        self.indices
            .iter()
            .filter(|(_, idx)| idx.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn record(&mut self) {
        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, idx) in &self.indices {
            for alias in &idx.aliases {
                aliases.entry(alias.clone()).or_default().push(name.clone());
            }
        }
        self.history.push(Observed {
            indices: self.indices.keys().cloned().collect(),
            aliases,
        });
    }

    fn name_taken(&self, name: &str) -> bool {
        self.indices.contains_key(name) || !self.alias_targets(name).is_empty()
    }

    fn resolve_names(&self, name: &str) -> Vec<String> {
        if self.indices.contains_key(name) {
            vec![name.to_string()]
        } else {
            self.alias_targets(name)
        }
    }
}

/// Elasticsearch stand-in with real alias and mapping-conflict semantics.
#[derive(Default)]
pub struct MemoryIndexService {
    state: Mutex<State>,
}

impl MemoryIndexService {
    fn enter(&self, op: &str) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op.to_string());
        if state.fail_on.as_deref() == Some(op) {
            return Err(ProtoSyncError::search(500, format!("injected failure in {op}")));
        }
        Ok(state)
    }

    /// Make every call of `op` fail with a non-conflict server error.
    pub fn fail_on(&self, op: &str) {
        self.state.lock().unwrap().fail_on = Some(op.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_on = None;
        state.transient_mapping = false;
    }

    /// Make put-mapping report exhausted retries instead of applying.
    pub fn fail_mapping_transiently(&self) {
        self.state.lock().unwrap().transient_mapping = true;
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == op).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().unwrap().indices.keys().cloned().collect()
    }

    pub fn alias_targets(&self, alias: &str) -> Vec<String> {
        self.state.lock().unwrap().alias_targets(alias)
    }

    /// What `name` resolved to (itself as an index, or alias targets) at
    /// each recorded state.
    pub fn alias_history(&self, name: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .history
            .iter()
            .map(|observed| observed.resolve(name))
            .collect()
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock().unwrap();
        state.history.clear();
        state.calls.clear();
    }

    pub fn snapshots(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().snapshots.clone()
    }

    pub fn repository(&self, name: &str) -> Option<Value> {
        self.state.lock().unwrap().repositories.get(name).cloned()
    }

    /// Create an index named `name` with no alias indirection.
    pub fn create_legacy_index(&self, name: &str, documents: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        state.indices.insert(
            name.to_string(),
            MemIndex {
                mappings: Value::Object(Default::default()),
                documents,
                aliases: BTreeSet::new(),
            },
        );
    }

    pub fn seed_documents(&self, index: &str, documents: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        if let Some(idx) = state.indices.get_mut(index) {
            idx.documents.extend(documents);
        }
    }

    /// Documents reachable through `name` (index or alias).
    pub fn documents(&self, name: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .resolve_names(name)
            .iter()
            .filter_map(|n| state.indices.get(n))
            .flat_map(|idx| idx.documents.clone())
            .collect()
    }
}

/// Merge `incoming` into `existing`, failing if a `type` leaf would change.
fn merge_mapping(existing: &mut Value, incoming: &Value) -> std::result::Result<(), String> {
    let (dst, src) = match (existing, incoming) {
        (Value::Object(dst), Value::Object(src)) => (dst, src),
        (existing, incoming) if *existing != *incoming => {
            return Err(format!("cannot replace {existing} with {incoming}"));
        }
        _ => return Ok(()),
    };

    for (key, value) in src {
        match dst.get_mut(key) {
            Some(current) if key == "type" => {
                if current != value {
                    return Err(format!("type cannot change from {current} to {value}"));
                }
            }
            Some(current) => merge_mapping(current, value)?,
            None => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

impl IndexService for MemoryIndexService {
    async fn create_repository(&self, repository: &str, body: &Value) -> Result<()> {
        let mut state = self.enter("create_repository")?;
        state.repositories.insert(repository.to_string(), body.clone());
        Ok(())
    }

    async fn create_snapshot(&self, repository: &str, snapshot: &str) -> Result<()> {
        let mut state = self.enter("create_snapshot")?;
        if !state.repositories.contains_key(repository) {
            return Err(ProtoSyncError::search(404, "repository_missing_exception"));
        }
        state
            .snapshots
            .push((repository.to_string(), snapshot.to_string()));
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let state = self.enter("index_exists")?;
        Ok(state.name_taken(name))
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        let mut state = self.enter("create_index")?;
        if state.name_taken(name) {
            return Err(ProtoSyncError::search(400, "resource_already_exists_exception"));
        }
        let mappings = body
            .get("mappings")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        state.indices.insert(
            name.to_string(),
            MemIndex {
                mappings,
                ..Default::default()
            },
        );
        state.record();
        Ok(())
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut state = self.enter("put_alias")?;
        if state.indices.contains_key(alias) {
            return Err(ProtoSyncError::search(
                400,
                "invalid_alias_name_exception: an index exists with the same name as the alias",
            ));
        }
        let Some(idx) = state.indices.get_mut(index) else {
            return Err(ProtoSyncError::search(404, "index_not_found_exception"));
        };
        idx.aliases.insert(alias.to_string());
        state.record();
        Ok(())
    }

    async fn get_aliases_for(&self, name: &str) -> Result<AliasMap> {
        let state = self.enter("get_aliases")?;
        let names = state.resolve_names(name);
        if names.is_empty() {
            return Err(ProtoSyncError::search(404, "index_not_found_exception"));
        }
        Ok(names
            .into_iter()
            .map(|n| {
                let aliases = state.indices[&n].aliases.iter().cloned().collect();
                (n, aliases)
            })
            .collect())
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, body: &Value) -> Result<MappingUpdate> {
        let mut state = self.enter("put_mapping")?;
        if state.transient_mapping {
            return Ok(MappingUpdate::TransientFailure("injected: 503 after retries".into()));
        }
        let Some(idx) = state.indices.get_mut(index) else {
            return Err(ProtoSyncError::search(404, "index_not_found_exception"));
        };
        let incoming = body.get(doc_type).cloned().unwrap_or_else(|| body.clone());

        let mut merged = idx.mappings.clone();
        let slot = merged
            .as_object_mut()
            .map(|m| m.entry(doc_type.to_string()).or_insert_with(|| Value::Object(Default::default())));
        let Some(slot) = slot else {
            return Ok(MappingUpdate::Conflict);
        };
        match merge_mapping(slot, &incoming) {
            Ok(()) => {
                idx.mappings = merged;
                Ok(MappingUpdate::Applied)
            }
            Err(_) => Ok(MappingUpdate::Conflict),
        }
    }

    async fn reindex(&self, source: &str, dest: &str) -> Result<()> {
        let mut state = self.enter("reindex")?;
        let documents: Vec<Value> = state
            .resolve_names(source)
            .iter()
            .filter_map(|n| state.indices.get(n))
            .flat_map(|idx| idx.documents.clone())
            .collect();
        let Some(target) = state.indices.get_mut(dest) else {
            return Err(ProtoSyncError::search(404, "index_not_found_exception"));
        };
        target.documents.extend(documents);
        state.record();
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_index")?;
        if state.indices.remove(name).is_none() {
            return Err(ProtoSyncError::search(404, "index_not_found_exception"));
        }
        state.record();
        Ok(())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        let mut state = self.enter("update_aliases")?;

        // Apply to a copy; commit only if every action succeeds.
        let mut indices = state.indices.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    let Some(idx) = indices.get_mut(index) else {
                        return Err(ProtoSyncError::search(404, "index_not_found_exception"));
                    };
                    idx.aliases.insert(alias.clone());
                }
                AliasAction::Remove { index, alias } => {
                    let Some(idx) = indices.get_mut(index) else {
                        return Err(ProtoSyncError::search(404, "index_not_found_exception"));
                    };
                    idx.aliases.remove(alias);
                }
                AliasAction::RemoveIndex { index } => {
                    if indices.remove(index).is_none() {
                        return Err(ProtoSyncError::search(404, "index_not_found_exception"));
                    }
                }
            }
        }

        let clash = indices
            .values()
            .flat_map(|idx| &idx.aliases)
            .any(|alias| indices.contains_key(alias));
        if clash {
            return Err(ProtoSyncError::search(
                400,
                "invalid_alias_name_exception: an index exists with the same name as the alias",
            ));
        }

        state.indices = indices;
        state.record();
        Ok(())
    }
}

/// Compiler stand-in that records invocations.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<CompilerInvocation>>,
    fail_on_file: Option<String>,
}

impl RecordingRunner {
    /// Fail (non-zero exit) when compiling a file with this name.
    pub fn failing_on(file_name: &str) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            fail_on_file: Some(file_name.to_string()),
        }
    }

    pub fn invocations(&self) -> Vec<CompilerInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl CompilerRunner for RecordingRunner {
    async fn run(&self, invocation: &CompilerInvocation) -> Result<CompilerOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let command = invocation.command_line("protoc", "--php_out", &[]);

        let file_name = invocation
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        if file_name.is_some() && file_name == self.fail_on_file {
            return Err(ProtoSyncError::Compiler {
                command,
                code: "exit status: 1".into(),
                stdout: String::new(),
                stderr: "syntax error".into(),
            });
        }

        Ok(CompilerOutput {
            command,
            stdout: String::new(),
        })
    }
}

//! End-to-end `generate` pipeline: modules → collect → sync mappings → compile.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument};

use protosync_collector::{ModuleSchemas, collect, locate_modules};
use protosync_search::IndexService;
use protosync_shared::{
    AppConfig, ElasticsearchConfig, MappingDeclaration, ProtoSyncError, Result, SchemaFile,
    SyncStatus,
};

use crate::compiler::{CompilerInvocation, CompilerOutput, CompilerRunner};
use crate::snapshot::{S3Credentials, create_pre_migration_snapshot};
use crate::sync::{IndexNamer, sync_mapping};

/// Options for one `generate` run.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Snapshot the cluster before touching any mapping.
    pub snapshot: Option<S3Credentials>,
}

/// Per-file row of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub mapping: SyncStatus,
}

/// Per-module block of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub module: String,
    pub files: Vec<FileSummary>,
}

/// Result of the `generate` pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    /// Snapshot taken before processing, if requested.
    pub snapshot: Option<String>,
    pub modules: Vec<ModuleSummary>,
    pub compiled: Vec<CompilerOutput>,
    #[serde(skip)]
    pub elapsed: std::time::Duration,
}

impl GenerateReport {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Number of files whose mapping sync failed.
    pub fn error_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.files)
            .filter(|f| f.mapping == SyncStatus::Error)
            .count()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a file's mapping has been handled.
    fn mapping_synced(&self, module: &str, file: &str, status: SyncStatus);
    /// Called after each successful compiler run.
    fn compiled(&self, output: &CompilerOutput);
    /// Called when the pipeline completes.
    fn done(&self, report: &GenerateReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn mapping_synced(&self, _module: &str, _file: &str, _status: SyncStatus) {}
    fn compiled(&self, _output: &CompilerOutput) {}
    fn done(&self, _report: &GenerateReport) {}
}

/// Run the full `generate` pipeline.
///
/// 1. Optional pre-migration snapshot
/// 2. Locate modules and collect schema files
/// 3. Synchronize declared index mappings (failures recorded per file)
/// 4. Compile every collected file (failures abort)
#[instrument(skip_all)]
pub async fn generate<S, R>(
    config: &AppConfig,
    service: &S,
    runner: &R,
    options: &GenerateOptions,
    progress: &dyn ProgressReporter,
) -> Result<GenerateReport>
where
    S: IndexService,
    R: CompilerRunner,
{
    let start = Instant::now();

    // --- Phase 1: Snapshot ---
    let snapshot = match &options.snapshot {
        Some(credentials) => {
            progress.phase("Creating pre-migration snapshot");
            Some(create_pre_migration_snapshot(service, &config.snapshot, credentials).await?)
        }
        None => None,
    };

    // --- Phase 2: Collect ---
    progress.phase("Gathering schema files");
    let modules = locate_modules(config)?;
    let collected = collect(&config.project, &modules)?;

    // --- Phase 3: Mappings ---
    progress.phase("Synchronizing index mappings");
    let mut summaries = Vec::with_capacity(collected.len());
    for schemas in &collected {
        let mut files = Vec::with_capacity(schemas.files.len());
        for file in &schemas.files {
            let status = sync_file(service, &config.elasticsearch, schemas, file).await;
            progress.mapping_synced(&schemas.module.name, &file.file_name(), status);
            files.push(FileSummary {
                file: file.file_name(),
                mapping: status,
            });
        }
        summaries.push(ModuleSummary {
            module: schemas.module.name.clone(),
            files,
        });
    }

    // --- Phase 4: Compile ---
    let mut compiled = Vec::new();
    if collected.is_empty() {
        info!("no schema files found");
    } else {
        progress.phase("Compiling schema files");
        for schemas in &collected {
            compiled.extend(compile_module(runner, schemas, progress).await?);
        }
    }

    let report = GenerateReport {
        snapshot,
        modules: summaries,
        compiled,
        elapsed: start.elapsed(),
    };

    info!(
        modules = report.modules.len(),
        compiled = report.compiled.len(),
        mapping_errors = report.error_count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "generate complete"
    );
    progress.done(&report);
    Ok(report)
}

/// Synchronize one file's declared mapping; never fails the run.
async fn sync_file<S: IndexService>(
    service: &S,
    es: &ElasticsearchConfig,
    schemas: &ModuleSchemas,
    file: &SchemaFile,
) -> SyncStatus {
    let mapping = match &file.mapping {
        MappingDeclaration::Absent => return SyncStatus::No,
        MappingDeclaration::Invalid(reason) => {
            error!(file = %file.path.display(), %reason, "mapping config unreadable");
            return SyncStatus::Error;
        }
        MappingDeclaration::Declared(mapping) => mapping,
    };

    let alias = es.alias_for(&schemas.module);
    let namer = IndexNamer::new(es, &schemas.module);

    match sync_mapping(service, &alias, mapping, &namer).await {
        Ok(outcome) => {
            info!(file = %file.file_name(), %alias, index = outcome.live_index(), ?outcome, "mapping in sync");
            SyncStatus::Yes
        }
        Err(e) => {
            error!(file = %file.path.display(), %alias, error = %e, "mapping sync failed");
            SyncStatus::Error
        }
    }
}

/// Compile every file of one module into its output directory.
async fn compile_module<R: CompilerRunner>(
    runner: &R,
    schemas: &ModuleSchemas,
    progress: &dyn ProgressReporter,
) -> Result<Vec<CompilerOutput>> {
    std::fs::create_dir_all(&schemas.output_dir)
        .map_err(|e| ProtoSyncError::io(&schemas.output_dir, e))?;

    let mut outputs = Vec::with_capacity(schemas.files.len());
    for file in &schemas.files {
        let proto_path = file
            .path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let invocation = CompilerInvocation {
            proto_path,
            output_dir: schemas.output_dir.clone(),
            file: file.path.clone(),
        };

        let output = runner.run(&invocation).await?;
        progress.compiled(&output);
        outputs.push(output);
    }
    Ok(outputs)
}

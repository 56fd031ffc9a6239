//! Schema file collection.
//!
//! Walks each module's schema directory, stages every schema file into the
//! per-module build output directory, and pairs it with the mapping declared
//! in its sibling `.yml` file.

mod locator;
mod mapping;

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use protosync_shared::{Module, ProjectConfig, ProtoSyncError, Result, SchemaFile};

pub use locator::locate_modules;
use mapping::read_mapping;

/// Schema files collected for one module, in path order.
#[derive(Debug, Clone)]
pub struct ModuleSchemas {
    pub module: Module,
    /// Per-module staging and compiler output directory.
    pub output_dir: PathBuf,
    pub files: Vec<SchemaFile>,
}

/// Collect and stage schema files for every module.
///
/// Modules without a schema directory, or with an empty one, are skipped.
/// Any copy failure aborts the whole collection.
#[instrument(skip_all, fields(modules = modules.len()))]
pub fn collect(project: &ProjectConfig, modules: &[Module]) -> Result<Vec<ModuleSchemas>> {
    let mut collected = Vec::new();

    for module in modules {
        let schema_dir = project.schema_dir(module);
        if !schema_dir.is_dir() {
            debug!(module = %module.name, path = %schema_dir.display(), "no schema directory");
            continue;
        }

        let sources = find_schema_files(&schema_dir, &project.schema_extension)?;
        if sources.is_empty() {
            debug!(module = %module.name, "schema directory is empty");
            continue;
        }

        let output_dir = project.output_path().join(&module.name);
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            let staged = stage(&source, &schema_dir, &output_dir)?;
            files.push(SchemaFile {
                mapping: read_mapping(&source),
                path: source,
                staged,
            });
        }

        info!(module = %module.name, files = files.len(), "collected schema files");
        collected.push(ModuleSchemas {
            module: module.clone(),
            output_dir,
            files,
        });
    }

    Ok(collected)
}

/// All files under `dir` (recursively) with the given extension, sorted.
fn find_schema_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            ProtoSyncError::io(path, source)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let ext = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext == extension {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Copy `source` into `output_dir` at its path relative to `schema_dir`,
/// overwriting any previous copy.
fn stage(source: &Path, schema_dir: &Path, output_dir: &Path) -> Result<PathBuf> {
    let relative = source.strip_prefix(schema_dir).map_err(|_| {
        ProtoSyncError::validation(format!(
            "{} is outside {}",
            source.display(),
            schema_dir.display()
        ))
    })?;
    let target = output_dir.join(relative);

    let parent = target.parent().unwrap_or(output_dir);
    std::fs::create_dir_all(parent).map_err(|e| ProtoSyncError::io(parent, e))?;

    std::fs::copy(source, &target).map_err(|e| ProtoSyncError::io(&target, e))?;
    debug!(from = %source.display(), to = %target.display(), "staged schema file");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use protosync_shared::MappingDeclaration;

    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project_at(root: &Path) -> ProjectConfig {
        ProjectConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn collects_and_stages_per_module() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("vendor/acme/analytics/Resources/proto/event.proto"), "A");
        write(&root.join("vendor/acme/contacts/Resources/proto/contact.proto"), "C");
        write(
            &root.join("vendor/acme/contacts/Resources/proto/contact.yml"),
            "elasticsearch:\n  mappings:\n    name: text\n",
        );

        let modules = vec![
            Module::new("acme/analytics", "vendor/acme/analytics"),
            Module::new("acme/contacts", "vendor/acme/contacts"),
        ];
        let collected = collect(&project_at(root), &modules).unwrap();

        assert_eq!(collected.len(), 2);
        let analytics = &collected[0];
        assert_eq!(analytics.files.len(), 1);
        assert_eq!(analytics.files[0].file_name(), "event.proto");
        assert_eq!(analytics.files[0].mapping, MappingDeclaration::Absent);
        assert_eq!(
            analytics.files[0].staged,
            root.join("var/proto/acme/analytics/event.proto")
        );
        assert_eq!(std::fs::read_to_string(&analytics.files[0].staged).unwrap(), "A");

        let contacts = &collected[1];
        assert!(matches!(
            contacts.files[0].mapping,
            MappingDeclaration::Declared(_)
        ));
    }

    #[test]
    fn missing_and_empty_schema_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("vendor/acme/empty/Resources/proto")).unwrap();
        write(&root.join("vendor/acme/empty/Resources/proto/README.md"), "x");

        let modules = vec![
            Module::new("acme/missing", "vendor/acme/missing"),
            Module::new("acme/empty", "vendor/acme/empty"),
        ];
        let collected = collect(&project_at(root), &modules).unwrap();
        assert!(collected.is_empty());
    }

    #[test]
    fn finds_nested_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let schema_dir = root.join("mod/Resources/proto");
        write(&schema_dir.join("b.proto"), "");
        write(&schema_dir.join("nested/a.proto"), "");
        write(&schema_dir.join("a.proto"), "");

        let modules = vec![Module::new("m", "mod")];
        let collected = collect(&project_at(root), &modules).unwrap();
        let names: Vec<_> = collected[0]
            .files
            .iter()
            .map(|f| f.path.strip_prefix(&schema_dir).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [
                PathBuf::from("a.proto"),
                PathBuf::from("b.proto"),
                PathBuf::from("nested/a.proto"),
            ]
        );
    }

    #[test]
    fn nested_files_with_same_name_stage_separately() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("mod/Resources/proto/a.proto"), "top");
        write(&root.join("mod/Resources/proto/nested/a.proto"), "nested");

        let modules = vec![Module::new("m", "mod")];
        let collected = collect(&project_at(root), &modules).unwrap();
        let staged: Vec<_> = collected[0].files.iter().map(|f| f.staged.clone()).collect();

        assert_eq!(
            staged,
            [
                root.join("var/proto/m/a.proto"),
                root.join("var/proto/m/nested/a.proto"),
            ]
        );
        assert_eq!(std::fs::read_to_string(&staged[0]).unwrap(), "top");
        assert_eq!(std::fs::read_to_string(&staged[1]).unwrap(), "nested");
    }

    #[test]
    fn staging_overwrites_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("mod/Resources/proto/x.proto"), "new");
        write(&root.join("var/proto/m/x.proto"), "old");

        let modules = vec![Module::new("m", "mod")];
        let collected = collect(&project_at(root), &modules).unwrap();
        assert_eq!(std::fs::read_to_string(&collected[0].files[0].staged).unwrap(), "new");
    }
}

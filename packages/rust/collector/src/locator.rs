//! Module discovery: explicit config entries plus `<vendor>/<package>` scanning.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use protosync_shared::{AppConfig, Module, ProtoSyncError, Result};

/// Return the modules to process, in stable order.
///
/// Explicit `[[modules.entries]]` come first in declared order, then scanned
/// modules sorted by name. The first occurrence of a name wins. An empty
/// result is an error.
pub fn locate_modules(config: &AppConfig) -> Result<Vec<Module>> {
    let mut modules: Vec<Module> = config.modules.entries.iter().map(Module::from).collect();

    if let Some(root) = config.modules.scan_root() {
        let scan_root = config.project.root.join(root);
        modules.extend(scan_modules(&scan_root, root, &config.modules.marker)?);
    }

    let mut seen = HashSet::new();
    modules.retain(|m| seen.insert(m.name.clone()));

    if modules.is_empty() {
        return Err(ProtoSyncError::config("no modules found"));
    }

    info!(count = modules.len(), "located modules");
    Ok(modules)
}

/// Scan `scan_root` two levels deep for directories holding `marker`.
///
/// Module paths are reported relative to the project root, i.e. prefixed with
/// `relative_root`. A missing scan root yields no modules.
fn scan_modules(scan_root: &Path, relative_root: &Path, marker: &str) -> Result<Vec<Module>> {
    if !scan_root.is_dir() {
        debug!(path = %scan_root.display(), "module root not found, skipping scan");
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for vendor in read_dirs(scan_root)? {
        let vendor_dir = scan_root.join(&vendor);
        for package in read_dirs(&vendor_dir)? {
            if !vendor_dir.join(&package).join(marker).is_file() {
                continue;
            }
            found.push(Module::new(
                format!("{vendor}/{package}"),
                relative_root.join(&vendor).join(&package),
            ));
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

/// Names of the subdirectories of `dir`, skipping hidden ones.
fn read_dirs(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProtoSyncError::io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProtoSyncError::io(dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    Ok(names)
}

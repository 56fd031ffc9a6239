//! Application configuration for protosync.
//!
//! Project config lives at `./protosync.toml`, with a user-level fallback at
//! `~/.protosync/protosync.toml`. An explicit `--config` path wins over both.
//! Missing files resolve to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProtoSyncError, Result};
use crate::types::Module;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "protosync.toml";

/// User-level config directory name under the home directory.
const CONFIG_DIR_NAME: &str = ".protosync";

// ---------------------------------------------------------------------------
// Config structs (matching protosync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project layout.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Where modules come from.
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Schema compiler invocation.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Index service connection and naming.
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    /// Pre-migration snapshot settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root; module paths are relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Schema directory inside each module.
    #[serde(default = "default_schema_subdir")]
    pub schema_subdir: PathBuf,

    /// Schema file extension, without the dot.
    #[serde(default = "default_schema_extension")]
    pub schema_extension: String,

    /// Build output directory (staging and generated code), relative to root.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            schema_subdir: default_schema_subdir(),
            schema_extension: default_schema_extension(),
            output_dir: default_output_dir(),
        }
    }
}

impl ProjectConfig {
    /// Absolute-or-root-relative output directory.
    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output_dir)
    }

    /// Schema directory of `module`.
    pub fn schema_dir(&self, module: &Module) -> PathBuf {
        self.root.join(&module.path).join(&self.schema_subdir)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_schema_subdir() -> PathBuf {
    PathBuf::from("Resources/proto")
}
fn default_schema_extension() -> String {
    "proto".into()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("var/proto")
}

/// `[modules]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Directory scanned for `<vendor>/<package>` modules, relative to the
    /// project root. An empty path disables scanning.
    #[serde(default = "default_modules_root", skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// File that marks a scanned directory as a module.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Explicitly listed modules, taken before scanned ones.
    #[serde(default)]
    pub entries: Vec<ModuleEntry>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            root: default_modules_root(),
            marker: default_marker(),
            entries: Vec::new(),
        }
    }
}

impl ModulesConfig {
    /// Directory to scan, if scanning is enabled.
    pub fn scan_root(&self) -> Option<&Path> {
        self.root.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

fn default_modules_root() -> Option<PathBuf> {
    Some(PathBuf::from("vendor"))
}

fn default_marker() -> String {
    "composer.json".into()
}

/// `[[modules.entries]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub path: PathBuf,
}

impl From<&ModuleEntry> for Module {
    fn from(entry: &ModuleEntry) -> Self {
        Module::new(entry.name.clone(), entry.path.clone())
    }
}

/// `[compiler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Compiler executable.
    #[serde(default = "default_compiler_command")]
    pub command: String,

    /// Arguments placed before the generated ones (e.g. extra `-I` paths).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,

    /// Output flag, joined to the output directory with `=`.
    #[serde(default = "default_output_flag")]
    pub output_flag: String,

    /// Upper bound for a single compiler invocation.
    #[serde(default = "default_compiler_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: default_compiler_command(),
            extra_args: Vec::new(),
            output_flag: default_output_flag(),
            timeout_secs: default_compiler_timeout(),
        }
    }
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_compiler_command() -> String {
    "protoc".into()
}
fn default_output_flag() -> String {
    "--php_out".into()
}
fn default_compiler_timeout() -> u64 {
    120
}

/// `[elasticsearch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster.
    #[serde(default = "default_es_url")]
    pub url: String,

    /// Prefix for alias and concrete index names.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Per-request timeout.
    #[serde(default = "default_es_timeout")]
    pub timeout_secs: u64,

    /// Timeout for blocking reindex requests.
    #[serde(default = "default_reindex_timeout")]
    pub reindex_timeout_secs: u64,

    /// Attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each further retry.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            index_prefix: default_index_prefix(),
            timeout_secs: default_es_timeout(),
            reindex_timeout_secs: default_reindex_timeout(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
        }
    }
}

impl ElasticsearchConfig {
    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| {
            ProtoSyncError::config(format!("invalid elasticsearch url '{}': {e}", self.url))
        })
    }

    /// Stable alias consumers query for `module`.
    pub fn alias_for(&self, module: &Module) -> String {
        format!("{}.esp.{}", self.index_prefix, module.dotted_name())
    }

    /// Versioned concrete index name for `module` at `timestamp_ms`.
    pub fn concrete_index_for(&self, module: &Module, timestamp_ms: i64) -> String {
        format!(
            "{}_.esp.{}.{timestamp_ms}",
            self.index_prefix,
            module.dotted_name()
        )
    }
}

fn default_es_url() -> String {
    "http://localhost:9200".into()
}
fn default_index_prefix() -> String {
    "protosync".into()
}
fn default_es_timeout() -> u64 {
    30
}
fn default_reindex_timeout() -> u64 {
    600
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff() -> u64 {
    500
}

/// `[snapshot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot repository name.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// S3 bucket for the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// S3 region of the bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Key prefix inside the bucket.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Name of the env var holding the S3 access key (never store the key itself).
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Name of the env var holding the S3 secret key.
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            bucket: None,
            region: None,
            base_path: default_base_path(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

fn default_repository() -> String {
    "backup".into()
}
fn default_base_path() -> String {
    "esp/elasticsearch".into()
}
fn default_access_key_env() -> String {
    "ELASTICSEARCH_S3_ACCESS_KEY".into()
}
fn default_secret_key_env() -> String {
    "ELASTICSEARCH_S3_SECRET_KEY".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path of the project-level config file (`./protosync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| ProtoSyncError::io(".", e))?;
    Ok(cwd.join(CONFIG_FILE_NAME))
}

/// Path of the user-level config file (`~/.protosync/protosync.toml`).
pub fn user_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProtoSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Pick the config file to use: explicit path, project file, user file.
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ProtoSyncError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let project = config_file_path()?;
    if project.exists() {
        return Ok(Some(project));
    }

    match user_config_path() {
        Ok(user) if user.exists() => Ok(Some(user)),
        _ => Ok(None),
    }
}

/// Load the application config. Returns defaults if no config file exists.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ProtoSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ProtoSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    tracing::debug!(?path, "loaded config");
    Ok(config)
}

/// Write a default config file to `path`. Refuses to overwrite.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(ProtoSyncError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ProtoSyncError::io(parent, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ProtoSyncError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ProtoSyncError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

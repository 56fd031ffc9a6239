//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use protosync_core::compiler::{CompilerOutput, ProtocRunner};
use protosync_core::pipeline::{GenerateOptions, GenerateReport, ProgressReporter};
use protosync_core::snapshot::S3Credentials;
use protosync_search::ElasticClient;
use protosync_shared::{AppConfig, SyncStatus, config_file_path, init_config, load_config};
use tracing::{info, warn};

use crate::summary;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// protosync: compile module schemas and keep search mappings in step.
#[derive(Parser)]
#[command(
    name = "protosync",
    version,
    about = "Gather .proto files from all modules, sync their Elasticsearch mappings, and compile them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./protosync.toml, then ~/.protosync/protosync.toml).
    #[arg(long, global = true, env = "PROTOSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Summary output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Collect schema files, sync index mappings, and run the compiler.
    Generate {
        /// Snapshot the Elasticsearch cluster before changing anything.
        #[arg(long)]
        snapshot: bool,

        /// Summary format.
        #[arg(long, default_value = "table")]
        output: OutputFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default protosync.toml in the current directory.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "protosync=info",
        1 => "protosync=debug",
        _ => "protosync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Generate { snapshot, output } => cmd_generate(config_path, snapshot, output).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(config_path: Option<&Path>, snapshot: bool, output: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;

    // Check snapshot credentials before doing anything
    let options = GenerateOptions {
        snapshot: if snapshot {
            Some(S3Credentials::from_env(&config.snapshot)?)
        } else {
            None
        },
    };

    let service = ElasticClient::new(&config.elasticsearch)?;
    let runner = ProtocRunner::new(&config.compiler);

    info!(
        root = %config.project.root.display(),
        elasticsearch = %config.elasticsearch.url,
        snapshot,
        "gathering .proto files"
    );

    let reporter = CliProgress::new();
    let result =
        protosync_core::pipeline::generate(&config, &service, &runner, &options, &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = result.wrap_err("generate failed")?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &GenerateReport) {
    println!();
    if let Some(name) = &report.snapshot {
        println!("  Snapshot: {name}");
    }
    if report.is_empty() {
        println!("  No schema files found");
        println!();
        return;
    }

    println!("{}", summary::render(report));
    println!(
        "  Time: {:.1}s",
        report.elapsed.as_secs_f64()
    );
    if report.error_count() > 0 {
        warn!(errors = report.error_count(), "some mappings could not be synchronized");
    }
    println!();
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    let path = init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn mapping_synced(&self, module: &str, file: &str, status: SyncStatus) {
        self.spinner
            .set_message(format!("Mapping {module}/{file}: {status}"));
    }

    fn compiled(&self, output: &CompilerOutput) {
        self.spinner.println(format!("  [OK] {}", output.command));
        let stdout = output.stdout.trim_end();
        if !stdout.is_empty() {
            self.spinner.println(stdout);
        }
    }

    fn done(&self, _report: &GenerateReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::try_parse_from(["protosync", "-vv", "generate", "--snapshot", "--output", "json"])
            .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Generate { snapshot, output } => {
                assert!(snapshot);
                assert!(matches!(output, OutputFormat::Json));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["protosync", "generate"]).expect("parse");
        match cli.command {
            Command::Generate { snapshot, output } => {
                assert!(!snapshot);
                assert!(matches!(output, OutputFormat::Table));
            }
            _ => panic!("expected generate"),
        }
    }
}

//! Schema compiler invocation.
//!
//! Each schema file is compiled on its own, with its directory as the import
//! path and the module's output directory as the generation target.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, instrument};

use protosync_shared::{CompilerConfig, ProtoSyncError, Result};

/// One compiler run for one schema file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerInvocation {
    /// Directory searched for imports (the schema file's own directory).
    pub proto_path: PathBuf,
    /// Where generated code is written.
    pub output_dir: PathBuf,
    /// The schema file to compile.
    pub file: PathBuf,
}

impl CompilerInvocation {
    /// Arguments after any configured extra arguments.
    pub fn args(&self, output_flag: &str) -> Vec<String> {
        vec![
            format!("--proto_path={}", self.proto_path.display()),
            format!("{output_flag}={}", self.output_dir.display()),
            self.file.display().to_string(),
        ]
    }

    /// Printable command line.
    pub fn command_line(&self, command: &str, output_flag: &str, extra_args: &[String]) -> String {
        let mut parts = vec![command.to_string()];
        parts.extend(extra_args.iter().cloned());
        parts.extend(self.args(output_flag));
        parts.join(" ")
    }
}

/// Captured result of a successful compiler run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CompilerOutput {
    pub command: String,
    pub stdout: String,
}

/// Runs the schema compiler.
#[allow(async_fn_in_trait)]
pub trait CompilerRunner {
    /// Run to completion. A non-zero exit is an error carrying the output.
    async fn run(&self, invocation: &CompilerInvocation) -> Result<CompilerOutput>;
}

/// [`CompilerRunner`] that spawns the configured compiler binary.
#[derive(Debug, Clone)]
pub struct ProtocRunner {
    command: String,
    extra_args: Vec<String>,
    output_flag: String,
    timeout: Duration,
}

impl ProtocRunner {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            command: config.command.clone(),
            extra_args: config.extra_args.clone(),
            output_flag: config.output_flag.clone(),
            timeout: config.timeout(),
        }
    }
}

impl CompilerRunner for ProtocRunner {
    #[instrument(skip_all, fields(file = %invocation.file.display()))]
    async fn run(&self, invocation: &CompilerInvocation) -> Result<CompilerOutput> {
        let command_line =
            invocation.command_line(&self.command, &self.output_flag, &self.extra_args);
        debug!(command = %command_line, "running compiler");

        let start = Instant::now();
        let child = Command::new(&self.command)
            .args(&self.extra_args)
            .args(invocation.args(&self.output_flag))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProtoSyncError::config(format!(
                    "failed to run `{}`: {e}. Is it installed?",
                    self.command
                )));
            }
            Err(_) => return Err(ProtoSyncError::timeout(command_line, start.elapsed())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(ProtoSyncError::Compiler {
                command: command_line,
                code: output.status.to_string(),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "compiler finished");
        Ok(CompilerOutput {
            command: command_line,
            stdout,
        })
    }
}

//! Compute service
//!
//! Runs the external generation routine for one task:
//! - Building the argument set from static settings and resolved parameters
//! - Launching the routine as a child process and waiting for it
//! - Mapping exit status and output file presence to success/failure
//!
//! The invoker never times out on its own. The worker loop races it against
//! the task's lease; dropping the in-flight future kills the child.

use anyhow::Result;
use async_trait::async_trait;
use forge_core::params::ResolvedParams;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Characters of captured process output kept for reporting
const DIAGNOSTICS_LIMIT: usize = 4000;

/// Bytes of each output stream kept while the process runs
const TAIL_BYTES: usize = DIAGNOSTICS_LIMIT * 4;

/// Service trait for running the external computation
///
/// The process implementation is the only variant today; an in-process or
/// remote implementation can satisfy the same contract.
#[async_trait]
pub trait ComputeInvoker: Send + Sync {
    /// Produces the output artifact at `output` from the input at `input`
    ///
    /// # Returns
    /// The output path, which exists and is non-empty
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &ResolvedParams,
    ) -> std::result::Result<PathBuf, ComputeError>;
}

/// The external computation failed or produced nothing
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compute {}: {diagnostics}", describe_exit(.code))]
    Failed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("compute produced no output at {}", .path.display())]
    MissingOutput { path: PathBuf, diagnostics: String },

    #[error("compute produced an empty output at {}", .path.display())]
    EmptyOutput { path: PathBuf, diagnostics: String },
}

impl ComputeError {
    /// Captured process output, when the process ran at all
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ComputeError::Launch { .. } => None,
            ComputeError::Failed { diagnostics, .. }
            | ComputeError::MissingOutput { diagnostics, .. }
            | ComputeError::EmptyOutput { diagnostics, .. } => Some(diagnostics),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

/// Static settings of the generation routine
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeSettings {
    /// Interpreter or executable to launch (e.g., "python")
    pub program: String,
    /// Directory containing the generation script; used as working directory
    pub repo_path: PathBuf,
    /// Script inside `repo_path`
    pub script: String,
    /// Model checkpoint directory
    pub model_path: PathBuf,
    pub task_type: String,
    pub sample_solver: String,
    pub sample_steps: u32,
    pub cfg_scale: f64,
    /// Trade speed for memory with the routine's offload flags
    pub offload_model: bool,
}

impl ComputeSettings {
    /// Creates settings with the standard sampling defaults
    pub fn new(repo_path: PathBuf, model_path: PathBuf) -> Self {
        Self {
            program: "python".to_string(),
            repo_path,
            script: "generate.py".to_string(),
            model_path,
            task_type: "ti2v-5B".to_string(),
            sample_solver: "unipc".to_string(),
            sample_steps: 30,
            cfg_scale: 5.0,
            offload_model: true,
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.repo_path.join(&self.script)
    }

    /// Resolves `repo_path`, `model_path` and a path-like `program` against
    /// the current directory
    ///
    /// The routine runs inside `repo_path`, so every path handed to it must
    /// be absolute.
    pub fn make_absolute(&mut self) -> std::io::Result<()> {
        self.repo_path = std::path::absolute(&self.repo_path)?;
        self.model_path = std::path::absolute(&self.model_path)?;
        if Path::new(&self.program).components().count() > 1 {
            self.program = std::path::absolute(&self.program)?
                .to_string_lossy()
                .into_owned();
        }
        Ok(())
    }

    /// Checks that the routine can be launched at all
    ///
    /// Run once at startup so a broken installation never claims a task.
    pub fn verify(&self) -> Result<()> {
        if !self.repo_path.is_dir() {
            anyhow::bail!(
                "compute repository not found: {}",
                self.repo_path.display()
            );
        }
        if !self.script_path().is_file() {
            anyhow::bail!(
                "compute script not found: {}",
                self.script_path().display()
            );
        }
        if !self.model_path.exists() {
            anyhow::bail!("model not found: {}", self.model_path.display());
        }
        Ok(())
    }

    /// Builds the argument list passed to `program`
    pub fn build_args(&self, input: &Path, output: &Path, params: &ResolvedParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.script_path().into(),
            "--task".into(),
            self.task_type.clone().into(),
            "--ckpt_dir".into(),
            self.model_path.clone().into(),
            "--image".into(),
            input.into(),
            "--save_file".into(),
            output.into(),
            "--frame_num".into(),
            params.frame_count.to_string().into(),
            "--sample_solver".into(),
            self.sample_solver.clone().into(),
            "--sample_steps".into(),
            self.sample_steps.to_string().into(),
            "--cfg_scale".into(),
            self.cfg_scale.to_string().into(),
        ];

        if self.offload_model {
            args.extend(
                ["--offload_model", "True", "--convert_model_dtype", "--t5_cpu"]
                    .into_iter()
                    .map(OsString::from),
            );
        }

        if let Some(prompt) = &params.prompt {
            args.push("--prompt".into());
            args.push(prompt.into());
        }

        args
    }
}

/// Compute invoker that launches the routine as a child process
pub struct ProcessComputeInvoker {
    settings: ComputeSettings,
}

impl ProcessComputeInvoker {
    pub fn new(settings: ComputeSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ComputeInvoker for ProcessComputeInvoker {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &ResolvedParams,
    ) -> std::result::Result<PathBuf, ComputeError> {
        let args = self.settings.build_args(input, output, params);

        info!(
            program = %self.settings.program,
            frame_count = params.frame_count,
            "Launching compute process"
        );
        debug!("Compute arguments: {:?}", args);

        let launch_error = |source| ComputeError::Launch {
            program: self.settings.program.clone(),
            source,
        };

        let mut child = Command::new(&self.settings.program)
            .args(&args)
            .current_dir(&self.settings.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, stdout, stderr) =
            tokio::join!(child.wait(), read_tail(stdout), read_tail(stderr));
        let status = status.map_err(launch_error)?;

        let diagnostics = collect_diagnostics(&stdout, &stderr);

        if !status.success() {
            return Err(ComputeError::Failed {
                code: status.code(),
                diagnostics,
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                info!(bytes = meta.len(), "Compute process finished");
                Ok(output.to_path_buf())
            }
            Ok(_) => Err(ComputeError::EmptyOutput {
                path: output.to_path_buf(),
                diagnostics,
            }),
            Err(_) => Err(ComputeError::MissingOutput {
                path: output.to_path_buf(),
                diagnostics,
            }),
        }
    }
}

/// Drains `reader`, keeping only its last `TAIL_BYTES` bytes
async fn read_tail<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut tail = Vec::new();
    let Some(mut reader) = reader else {
        return tail;
    };

    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > TAIL_BYTES * 2 {
                    tail.drain(..tail.len() - TAIL_BYTES);
                }
            }
        }
    }

    if tail.len() > TAIL_BYTES {
        tail.drain(..tail.len() - TAIL_BYTES);
    }
    tail
}

/// Keeps the tail of stderr, or of stdout when stderr is empty
fn collect_diagnostics(stdout: &[u8], stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    let text = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };

    let count = text.chars().count();
    if count <= DIAGNOSTICS_LIMIT {
        return text.to_string();
    }
    text.chars().skip(count - DIAGNOSTICS_LIMIT).collect()
}

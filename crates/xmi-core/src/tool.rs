//! Model-tool invocation.
//!
//! The model tool is an external program (by default `java -jar
//! java-to-xmi.jar`) that turns either an IR document or raw Java source into
//! an XMI file.  [`ToolInvoker`] resolves where the tool lives once, builds
//! its argument list from the validated options, and runs it as a
//! time-bounded subprocess.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::options::ConversionOptions;
use crate::request::Language;

/// Tail of combined stdout/stderr kept for diagnostics.
const DIAGNOSTIC_LIMIT: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("model tool unavailable: {0}")]
    Unavailable(String),

    #[error("model tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("model tool failed with exit code {exit_code}")]
    Execution { exit_code: i32, diagnostics: String },

    #[error("model tool exited successfully but produced no output")]
    MissingOutput,

    #[error("direct-source mode only supports java, got {0}")]
    UnsupportedLanguage(String),

    #[error("I/O error running model tool: {0}")]
    Io(#[from] std::io::Error),
}

// ── Settings & resolution ────────────────────────────────────────────────────

/// Where to find the tool and how long it may run.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Program that launches the artifact, e.g. `java`.
    pub runtime: String,
    /// Arguments placed between the runtime and the artifact, e.g. `-jar`.
    pub runtime_args: Vec<String>,
    /// Explicit artifact path.  When unset, `search_dirs` are scanned.
    pub artifact: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
    /// File-name prefix of the artifact looked for in `search_dirs`.
    pub artifact_prefix: String,
    pub ir_timeout: Duration,
    pub source_timeout: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            runtime: "java".to_owned(),
            runtime_args: vec!["-jar".to_owned()],
            artifact: None,
            search_dirs: vec![PathBuf::from("/app/tools"), PathBuf::from("./tools")],
            artifact_prefix: "java-to-xmi".to_owned(),
            ir_timeout: Duration::from_secs(300),
            source_timeout: Duration::from_secs(480),
        }
    }
}

impl ToolSettings {
    fn resolve(&self) -> Result<ToolLauncher, ToolError> {
        let artifact = match &self.artifact {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(ToolError::Unavailable(format!(
                    "configured artifact {} does not exist",
                    path.display()
                )));
            }
            None => self
                .search_dirs
                .iter()
                .find_map(|dir| find_artifact(dir, &self.artifact_prefix))
                .ok_or_else(|| {
                    ToolError::Unavailable(format!(
                        "no {}*.jar found in {:?}",
                        self.artifact_prefix, self.search_dirs
                    ))
                })?,
        };

        let mut leading_args: Vec<OsString> = self.runtime_args.iter().map(OsString::from).collect();
        leading_args.push(artifact.clone().into_os_string());
        Ok(ToolLauncher {
            program: self.runtime.clone(),
            leading_args,
            artifact,
        })
    }
}

/// Newest (lexicographically last) `<prefix>*.jar` directly inside `dir`.
fn find_artifact(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".jar"))
        })
        .collect();
    candidates.sort();
    candidates.pop()
}

/// A resolved command prefix for the tool.
#[derive(Debug, Clone)]
pub struct ToolLauncher {
    pub program: String,
    pub leading_args: Vec<OsString>,
    pub artifact: PathBuf,
}

// ── Invocation ───────────────────────────────────────────────────────────────

/// Which input the tool reads.
#[derive(Debug, Clone)]
pub enum ToolMode {
    /// `--ir <path>`: a materialized IR document.
    Ir { ir_path: PathBuf },
    /// `--source <dir>`: raw source in the tool's native language.
    DirectSource { language: Language, source_dir: PathBuf },
}

impl ToolMode {
    pub fn label(&self) -> &'static str {
        match self {
            ToolMode::Ir { .. } => "ir",
            ToolMode::DirectSource { .. } => "source",
        }
    }
}

/// A fully prepared tool run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub mode: ToolMode,
    /// Tool arguments, excluding the launcher prefix.
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub output_path: PathBuf,
    pub timeout: Duration,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub exit_code: i32,
    pub output: Bytes,
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// Build the tool's argument list.
///
/// Order: option flags, one `--exclude <glob>` pair per exclusion in caller
/// order, the mode argument, then `--output`.
pub fn build_args(mode: &ToolMode, options: &ConversionOptions, excludes: &[String], output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = options.to_args().into_iter().map(OsString::from).collect();
    for glob in excludes {
        args.push("--exclude".into());
        args.push(glob.into());
    }
    match mode {
        ToolMode::Ir { ir_path } => {
            args.push("--ir".into());
            args.push(ir_path.clone().into_os_string());
        }
        ToolMode::DirectSource { source_dir, .. } => {
            args.push("--source".into());
            args.push(source_dir.clone().into_os_string());
        }
    }
    args.push("--output".into());
    args.push(output.as_os_str().to_owned());
    args
}

/// Runs the model tool.  The resolved location is cached for the life of the
/// invoker; [`invalidate`](Self::invalidate) forces a fresh lookup.
#[derive(Debug)]
pub struct ToolInvoker {
    settings: ToolSettings,
    launcher: RwLock<Option<Arc<ToolLauncher>>>,
}

impl ToolInvoker {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            launcher: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Resolve (or return the cached) tool location.
    pub fn launcher(&self) -> Result<Arc<ToolLauncher>, ToolError> {
        if let Some(cached) = self.launcher.read().ok().and_then(|g| g.clone()) {
            return Ok(cached);
        }
        let mut slot = self
            .launcher
            .write()
            .map_err(|_| ToolError::Unavailable("tool location cache poisoned".into()))?;
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let resolved = Arc::new(self.settings.resolve()?);
        info!(
            runtime = %resolved.program,
            artifact = %resolved.artifact.display(),
            "model tool resolved"
        );
        *slot = Some(Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Drop the cached location.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.launcher.write() {
            *slot = None;
        }
    }

    /// Prepare an invocation; the timeout follows the mode.
    pub fn prepare(
        &self,
        mode: ToolMode,
        options: &ConversionOptions,
        excludes: &[String],
        working_dir: &Path,
        output_path: &Path,
    ) -> Result<ToolInvocation, ToolError> {
        let timeout = match &mode {
            ToolMode::Ir { .. } => self.settings.ir_timeout,
            ToolMode::DirectSource { language, .. } => {
                if !language.is_native() {
                    return Err(ToolError::UnsupportedLanguage(language.to_string()));
                }
                self.settings.source_timeout
            }
        };
        let args = build_args(&mode, options, excludes, output_path);
        Ok(ToolInvocation {
            mode,
            args,
            working_dir: working_dir.to_path_buf(),
            output_path: output_path.to_path_buf(),
            timeout,
        })
    }

    /// Run the tool and read its declared output file.
    ///
    /// The child is killed if the timeout expires or the future is dropped.
    pub async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolOutcome, ToolError> {
        let launcher = self.launcher()?;
        if let Some(parent) = invocation.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut command = Command::new(&launcher.program);
        command
            .args(&launcher.leading_args)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(mode = invocation.mode.label(), args = ?invocation.args, "spawning model tool");
        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::Unavailable(format!("cannot launch {}: {e}", launcher.program))
            } else {
                ToolError::Io(e)
            }
        })?;

        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    mode = invocation.mode.label(),
                    timeout_secs = invocation.timeout.as_secs(),
                    "model tool timed out; process killed"
                );
                return Err(ToolError::Timeout(invocation.timeout));
            }
        };
        let elapsed = started.elapsed();
        let diagnostics = collect_diagnostics(&output.stdout, &output.stderr);

        // A signal-terminated process has no exit code.
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(
                mode = invocation.mode.label(),
                exit_code,
                elapsed_ms = elapsed.as_millis(),
                diagnostics = %diagnostics,
                "model tool failed"
            );
            return Err(ToolError::Execution { exit_code, diagnostics });
        }

        let produced = match tokio::fs::read(&invocation.output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ToolError::MissingOutput),
            Err(e) => return Err(e.into()),
        };
        if produced.is_empty() {
            return Err(ToolError::MissingOutput);
        }

        info!(
            mode = invocation.mode.label(),
            elapsed_ms = elapsed.as_millis(),
            size_bytes = produced.len(),
            "model tool finished"
        );
        Ok(ToolOutcome {
            exit_code,
            output: Bytes::from(produced),
            diagnostics,
            elapsed,
        })
    }
}

fn collect_diagnostics(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stderr).into_owned();
    let out = String::from_utf8_lossy(stdout);
    if !out.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&out);
    }
    let text = text.trim();
    if text.len() <= DIAGNOSTIC_LIMIT {
        return text.to_owned();
    }
    let mut start = text.len() - DIAGNOSTIC_LIMIT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

// ── Tests ──────────────────────────────────────────────────────────────────────

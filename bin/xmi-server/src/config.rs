//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use xmi_core::{AcquireLimits, PipelineConfig, ToolSettings};

/// Runtime configuration for xmi-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8080"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Base URL of the IR-producing stage.
    pub ir_service_url: String,
    pub ir_timeout_secs: u64,

    /// Root under which per-request working directories are created.
    pub work_root: PathBuf,

    /// Explicit model-tool artifact (`JAVA_TO_XMI_JAR`).
    pub tool_artifact: Option<PathBuf>,
    /// Directories scanned for `java-to-xmi*.jar` when no artifact is set.
    pub tool_search_dirs: Vec<PathBuf>,
    pub tool_runtime: String,
    pub tool_runtime_args: Vec<String>,
    pub tool_ir_timeout_secs: u64,
    pub tool_source_timeout_secs: u64,

    /// Ceiling on the whole multipart body, in MiB.
    pub max_upload_mb: u64,
    /// Ceiling on bytes extracted from one archive, in MiB.
    pub max_extract_mb: u64,
    pub git_timeout_secs: u64,

    /// Comma-separated list of allowed CORS origins.  `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let env_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        let tool_runtime = env_or("XMI_TOOL_RUNTIME", "java");
        // `java` needs `-jar` in front of the artifact; other runtimes take
        // the artifact as their first argument unless told otherwise.
        let default_runtime_args = if tool_runtime == "java" { "-jar" } else { "" };

        Self {
            bind_address: env_or("XMI_BIND", "0.0.0.0:8080"),
            log_level: env_or("XMI_LOG", "info"),
            log_json: get("XMI_LOG_JSON").map(|v| parse_bool(&v)).unwrap_or(false),
            ir_service_url: env_or("XMI_IR_SERVICE_URL", "http://localhost:7071"),
            ir_timeout_secs: parse_env(&get, "XMI_IR_TIMEOUT_SECS", 600),
            work_root: get("XMI_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("xmi-gateway")),
            tool_artifact: get("JAVA_TO_XMI_JAR").map(PathBuf::from),
            tool_search_dirs: split_dirs(&env_or("XMI_TOOL_SEARCH_DIRS", "/app/tools:./tools")),
            tool_runtime_args: env_or("XMI_TOOL_RUNTIME_ARGS", default_runtime_args)
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            tool_runtime,
            tool_ir_timeout_secs: parse_env(&get, "XMI_TOOL_IR_TIMEOUT_SECS", 300),
            tool_source_timeout_secs: parse_env(&get, "XMI_TOOL_SOURCE_TIMEOUT_SECS", 480),
            max_upload_mb: parse_env(&get, "XMI_MAX_UPLOAD_MB", 200),
            max_extract_mb: parse_env(&get, "XMI_MAX_EXTRACT_MB", 1024),
            git_timeout_secs: parse_env(&get, "XMI_GIT_TIMEOUT_SECS", 120),
            cors_allowed_origins: get("XMI_CORS_ORIGINS"),
            enable_swagger: get("XMI_ENABLE_SWAGGER").map(|v| parse_bool(&v)).unwrap_or(true),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Settings handed to the conversion pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_root: self.work_root.clone(),
            ir_service_url: self.ir_service_url.clone(),
            ir_timeout: Duration::from_secs(self.ir_timeout_secs),
            tool: ToolSettings {
                runtime: self.tool_runtime.clone(),
                runtime_args: self.tool_runtime_args.clone(),
                artifact: self.tool_artifact.clone(),
                search_dirs: self.tool_search_dirs.clone(),
                ir_timeout: Duration::from_secs(self.tool_ir_timeout_secs),
                source_timeout: Duration::from_secs(self.tool_source_timeout_secs),
                ..ToolSettings::default()
            },
            limits: AcquireLimits {
                max_extract_bytes: self.max_extract_mb.saturating_mul(1024 * 1024),
                clone_timeout: Duration::from_secs(self.git_timeout_secs),
                ..AcquireLimits::default()
            },
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_env<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_dirs(value: &str) -> Vec<PathBuf> {
    value
        .split([':', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

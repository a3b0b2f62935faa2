//! Conversion pipeline: classify a request, pick a route, run its stages in
//! order inside a private working directory, and assemble the output.
//!
//! ```text
//! RawForm ─normalize─▶ ConversionRequest ─route─┬─ java ──────────▶ acquire ─▶ tool(--source)
//!                                               ├─ front-end ─────▶ IR stage ─▶ tool(--ir)
//!                                               ├─ resultFormat=ir ▶ IR stage
//!                                               └─ irFile ────────▶ tool(--ir)
//! ```
//!
//! Validation happens before a working directory exists, so a rejected
//! request leaves nothing behind and performs no network or disk work.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::HeaderMap;
use strum::{AsRefStr, Display};
use tracing::info;

use crate::acquire::{AcquireLimits, SourceAcquirer};
use crate::error::PipelineError;
use crate::request::{
    ConversionRequest, FIELD_INPUT_ZIP, FIELD_REPO_REF, FIELD_REPO_URL, RawForm, RequestInput, ResultFormat,
    SourceOrigin, Upload,
};
use crate::sandbox::{SandboxManager, WorkingDirectory};
use crate::stage::{SCHEMA_VERSION_HEADER, StageBlob, StageClient, StageEndpoint, StagePayload, StageResult};
use crate::tool::{ToolError, ToolInvoker, ToolMode, ToolSettings};

pub const XMI_CONTENT_TYPE: &str = "application/xml";
pub const IR_CONTENT_TYPE: &str = "application/json";
/// Set on the response when the IR stage served another schema version.
pub const SCHEMA_WARNING_HEADER: &str = "x-ir-schema-warning";

/// Everything needed to build a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_root: PathBuf,
    pub ir_service_url: String,
    pub ir_timeout: Duration,
    pub tool: ToolSettings,
    pub limits: AcquireLimits,
}

/// Which sequence of stages a request runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Route {
    /// Native language: acquire source, run the tool on it.
    DirectToolInvocation,
    /// Front-end language: IR stage, then the tool in IR mode.
    IrThenModel,
    /// Front-end language, stop after the IR stage.
    IrOnly,
    /// Caller supplied the IR; run the tool in IR mode.
    ModelFromIr,
}

impl Route {
    pub fn select(request: &ConversionRequest) -> Route {
        match (&request.input, request.result_format) {
            (RequestInput::Ir(_), _) => Route::ModelFromIr,
            (RequestInput::Source(_), _) if request.language.is_native() => Route::DirectToolInvocation,
            (RequestInput::Source(_), ResultFormat::Ir) => Route::IrOnly,
            (RequestInput::Source(_), ResultFormat::Xmi) => Route::IrThenModel,
        }
    }
}

/// A finished conversion, ready to be framed as a 200 response.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub body: Bytes,
    pub content_type: &'static str,
    /// Download name hint.
    pub file_name: String,
    /// Extra informational response headers.
    pub headers: Vec<(&'static str, String)>,
    pub route: Route,
}

#[derive(Debug)]
pub struct Pipeline {
    sandbox: SandboxManager,
    acquirer: SourceAcquirer,
    tool: ToolInvoker,
    stage: StageClient,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            sandbox: SandboxManager::new(config.work_root)?,
            acquirer: SourceAcquirer::new(config.limits),
            tool: ToolInvoker::new(config.tool),
            stage: StageClient::new(&config.ir_service_url, config.ir_timeout)?,
        })
    }

    pub fn sandbox(&self) -> &SandboxManager {
        &self.sandbox
    }

    pub fn tool(&self) -> &ToolInvoker {
        &self.tool
    }

    /// Run one request end to end.
    ///
    /// `forward` headers (trace ids) are passed on to the IR stage.  The
    /// working directory is released in the background once the output is
    /// in memory; the caller never waits on that.
    pub async fn handle(&self, form: RawForm, forward: HeaderMap) -> Result<PipelineOutput, PipelineError> {
        let request = ConversionRequest::from_form(&form.normalized())?;
        let route = Route::select(&request);
        info!(language = %request.language, route = %route, "request routed");

        let started = Instant::now();
        // Only routes that touch disk get a working directory.
        let result = match (&request.input, route) {
            (RequestInput::Source(origin), Route::IrOnly) => self.ir_only(&request, origin, forward).await,
            _ => {
                let scope = self.sandbox.acquire_scope().await?;
                let result = self.execute(&request, route, &scope, forward).await;
                let result = result.map_err(|e| redact(e, &scope));
                drop(scope.release());
                result
            }
        };

        match &result {
            Ok(out) => info!(
                route = %route,
                size_bytes = out.body.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "conversion finished"
            ),
            Err(e) => info!(
                route = %route,
                elapsed_ms = started.elapsed().as_millis(),
                error = %e,
                "conversion failed"
            ),
        }

        result
    }

    async fn ir_only(
        &self,
        request: &ConversionRequest,
        origin: &SourceOrigin,
        forward: HeaderMap,
    ) -> Result<PipelineOutput, PipelineError> {
        let (ir, headers) = self.produce_ir(request, origin, forward).await?;
        Ok(PipelineOutput {
            body: ir,
            content_type: IR_CONTENT_TYPE,
            file_name: format!("{}.ir.json", output_base_name(request)),
            headers,
            route: Route::IrOnly,
        })
    }

    async fn execute(
        &self,
        request: &ConversionRequest,
        route: Route,
        scope: &WorkingDirectory,
        forward: HeaderMap,
    ) -> Result<PipelineOutput, PipelineError> {
        let base_name = output_base_name(request);

        match &request.input {
            RequestInput::Ir(upload) => {
                let xmi = self.model_from_ir(request, &upload.bytes, scope).await?;
                Ok(PipelineOutput {
                    body: xmi,
                    content_type: XMI_CONTENT_TYPE,
                    file_name: format!("{base_name}.xmi"),
                    headers: Vec::new(),
                    route,
                })
            }
            RequestInput::Source(origin) if route == Route::DirectToolInvocation => {
                let source_dir = scope.source_dir();
                self.acquirer.acquire(origin, &source_dir).await?;
                let invocation = self.tool.prepare(
                    ToolMode::DirectSource {
                        language: request.language,
                        source_dir,
                    },
                    &request.options,
                    &request.excludes,
                    scope.path(),
                    &scope.output_path(),
                )?;
                let outcome = self.tool.invoke(&invocation).await?;
                Ok(PipelineOutput {
                    body: outcome.output,
                    content_type: XMI_CONTENT_TYPE,
                    file_name: format!("{base_name}.xmi"),
                    headers: Vec::new(),
                    route,
                })
            }
            RequestInput::Source(origin) => {
                let (ir, headers) = self.produce_ir(request, origin, forward).await?;
                let xmi = self.model_from_ir(request, &ir, scope).await?;
                Ok(PipelineOutput {
                    body: xmi,
                    content_type: XMI_CONTENT_TYPE,
                    file_name: format!("{base_name}.xmi"),
                    headers,
                    route,
                })
            }
        }
    }

    /// Call the IR stage with the caller's source origin.  Returns the IR
    /// bytes and the schema headers to surface.
    async fn produce_ir(
        &self,
        request: &ConversionRequest,
        origin: &SourceOrigin,
        forward: HeaderMap,
    ) -> Result<(Bytes, Vec<(&'static str, String)>), PipelineError> {
        let mut payload = StagePayload::new().text("mode", request.language.as_ref());
        if let Some(deps) = request.options.deps {
            payload = payload.text("deps", deps.to_string());
        }
        payload = match origin {
            SourceOrigin::Archive(Upload { file_name, bytes }) => payload.blob(StageBlob {
                field: FIELD_INPUT_ZIP.to_owned(),
                file_name: file_name.clone(),
                content_type: Some("application/zip".to_owned()),
                bytes: bytes.clone(),
            }),
            SourceOrigin::Repository { url, reference } => {
                let payload = payload.text(FIELD_REPO_URL, url.clone());
                match reference {
                    Some(r) => payload.text(FIELD_REPO_REF, r.clone()),
                    None => payload,
                }
            }
        };

        let success = match self.stage.call(&StageEndpoint::IR, &payload, forward).await? {
            StageResult::Success(s) => s,
            StageResult::Failure(f) => return Err(PipelineError::Downstream(f)),
        };
        if success.body.is_empty() {
            return Err(PipelineError::EmptyStageOutput);
        }

        let served = success.served_version();
        let mut headers = vec![(SCHEMA_VERSION_HEADER, served.clone())];
        if success.version_mismatch() {
            headers.push((
                SCHEMA_WARNING_HEADER,
                format!("requested {}, served {served}", success.requested_version),
            ));
        }
        info!(
            endpoint_version = success.route_version,
            schema = %served,
            size_bytes = success.body.len(),
            "IR produced"
        );
        Ok((success.body, headers))
    }

    /// Materialize `ir` in the working directory and run the tool on it.
    async fn model_from_ir(
        &self,
        request: &ConversionRequest,
        ir: &Bytes,
        scope: &WorkingDirectory,
    ) -> Result<Bytes, PipelineError> {
        let ir_path = scope.ir_path();
        tokio::fs::write(&ir_path, ir).await?;
        let invocation = self.tool.prepare(
            ToolMode::Ir { ir_path },
            &request.options,
            &request.excludes,
            scope.path(),
            &scope.output_path(),
        )?;
        Ok(self.tool.invoke(&invocation).await?.output)
    }
}

/// Keep tool diagnostics free of the working-directory path.
fn redact(err: PipelineError, scope: &WorkingDirectory) -> PipelineError {
    match err {
        PipelineError::Tool(ToolError::Execution { exit_code, diagnostics }) => {
            PipelineError::Tool(ToolError::Execution {
                exit_code,
                diagnostics: scope.redact(&diagnostics),
            })
        }
        other => other,
    }
}

/// Download name: the model name made filesystem-safe, or `model`.
fn output_base_name(request: &ConversionRequest) -> String {
    let sanitized: String = request
        .options
        .name
        .as_deref()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "model".to_owned()
    } else {
        trimmed.to_owned()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::acquire::test::zip_of;
    use crate::error::ErrorClass;
    use crate::request::{FIELD_EXCLUDE, FIELD_IR_FILE, FIELD_LANGUAGE, FIELD_RESULT_FORMAT};
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Writes `<xmi mode="..."/>` to `--output` and logs its argv to
    /// `calls.log`, one line per run.
    const GOOD_TOOL: &str = r#"
echo "$@" >> "$(dirname "$0")/calls.log"
out=""; mode=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2" ;;
    --ir) mode=ir ;;
    --source) mode=source ;;
  esac
  shift
done
printf '<xmi mode="%s"/>' "$mode" > "$out"
"#;

    /// Fails, mentioning its output path on stderr.
    const FAILING_TOOL: &str = r#"
echo "$@" >> "$(dirname "$0")/calls.log"
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then echo "cannot write $2" >&2; fi
  shift
done
exit 2
"#;

    struct Harness {
        dir: TempDir,
        pipeline: Pipeline,
    }

    impl Harness {
        fn new(tool_script: &str, ir_url: &str) -> Self {
            Self::with_tool_timeout(tool_script, ir_url, Duration::from_secs(10))
        }

        fn with_tool_timeout(tool_script: &str, ir_url: &str, timeout: Duration) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let tool_dir = dir.path().join("tools");
            std::fs::create_dir_all(&tool_dir).unwrap();
            let script = tool_dir.join("tool.sh");
            std::fs::write(&script, tool_script).unwrap();

            let pipeline = Pipeline::new(PipelineConfig {
                work_root: dir.path().join("work"),
                ir_service_url: ir_url.to_owned(),
                ir_timeout: Duration::from_secs(5),
                tool: ToolSettings {
                    runtime: "sh".into(),
                    runtime_args: Vec::new(),
                    artifact: Some(script),
                    ir_timeout: timeout,
                    source_timeout: timeout,
                    ..ToolSettings::default()
                },
                limits: AcquireLimits::default(),
            })
            .unwrap();
            Self { dir, pipeline }
        }

        fn tool_calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("tools/calls.log"))
                .map(|s| s.lines().map(str::to_owned).collect())
                .unwrap_or_default()
        }

        async fn assert_no_workdirs_left(&self) {
            let root = self.pipeline.sandbox().root();
            for _ in 0..200 {
                if count_entries(root) == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            panic!("{} working directories left behind", count_entries(root));
        }
    }

    fn count_entries(path: &Path) -> usize {
        std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
    }

    fn java_archive_form() -> RawForm {
        RawForm::new()
            .with_text(FIELD_LANGUAGE, "java")
            .with_file(FIELD_INPUT_ZIP, "shop.zip", zip_of(&[("shop/Order.java", b"class Order {}".as_slice())]))
    }

    #[tokio::test]
    async fn native_archive_runs_tool_once_in_source_mode() {
        let h = Harness::new(GOOD_TOOL, "http://127.0.0.1:1");
        let form = java_archive_form()
            .with_text(FIELD_EXCLUDE, "a/**")
            .with_text(FIELD_EXCLUDE, "b/**");

        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert_eq!(out.route, Route::DirectToolInvocation);
        assert_eq!(out.content_type, XMI_CONTENT_TYPE);
        assert_eq!(out.file_name, "model.xmi");
        assert_eq!(&out.body[..], br#"<xmi mode="source"/>"#);

        let calls = h.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("--exclude a/** --exclude b/** --source "));
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn frontend_repo_makes_one_ir_call_then_one_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .and(body_string_contains("https://github.com/acme/web.git"))
            .and(body_string_contains("react"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(SCHEMA_VERSION_HEADER, "2")
                    .set_body_raw(br#"{"schemaVersion":2}"#.to_vec(), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "react")
            .with_text(FIELD_REPO_URL, "https://github.com/acme/web.git")
            .with_text("name", "Web Shop");

        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert_eq!(out.route, Route::IrThenModel);
        assert_eq!(out.content_type, XMI_CONTENT_TYPE);
        assert_eq!(out.file_name, "Web_Shop.xmi");
        assert_eq!(&out.body[..], br#"<xmi mode="ir"/>"#);
        assert_eq!(out.headers, vec![(SCHEMA_VERSION_HEADER, "2".to_owned())]);

        let calls = h.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("--name Web Shop --ir "));
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn legacy_fallback_surfaces_a_warning_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/ir"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "ts")
            .with_file(FIELD_INPUT_ZIP, "web.zip", &b"PK"[..])
            .with_text("deps", "calls");

        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert!(out.headers.contains(&(SCHEMA_VERSION_HEADER, "1".to_owned())));
        assert!(out.headers.contains(&(SCHEMA_WARNING_HEADER, "requested 2, served 1".to_owned())));
        assert_eq!(h.tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn downstream_failure_is_forwarded_and_tool_never_runs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(422).set_body_raw(br#"{"error":"no sources"}"#.to_vec(), "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "js")
            .with_text(FIELD_REPO_URL, "https://example.com/x.git");

        let err = h.pipeline.handle(form, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Downstream);
        match err {
            PipelineError::Downstream(f) => {
                assert_eq!(f.status, 422);
                assert_eq!(&f.body[..], br#"{"error":"no sources"}"#);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(h.tool_calls().is_empty());
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn unsupported_language_does_no_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "cobol")
            .with_text(FIELD_REPO_URL, "https://example.com/x.git");

        let err = h.pipeline.handle(form, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Caller);
        assert_eq!(err.client_message(), "Unsupported language: cobol");
        assert_eq!(count_entries(h.pipeline.sandbox().root()), 0);
        assert!(h.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn ir_only_result_skips_the_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(200).insert_header(SCHEMA_VERSION_HEADER, "2").set_body_string("{\"ir\":true}"))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "angular")
            .with_text(FIELD_REPO_URL, "https://example.com/x.git")
            .with_text(FIELD_RESULT_FORMAT, "ir");

        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert_eq!(out.route, Route::IrOnly);
        assert_eq!(out.content_type, IR_CONTENT_TYPE);
        assert_eq!(out.file_name, "model.ir.json");
        assert_eq!(&out.body[..], b"{\"ir\":true}");
        assert!(h.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn ir_only_result_needs_no_working_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(200).insert_header(SCHEMA_VERSION_HEADER, "2").set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(GOOD_TOOL, &server.uri());
        // Any attempt to create a working directory now fails.
        let root = h.pipeline.sandbox().root().to_path_buf();
        std::fs::remove_dir(&root).unwrap();
        std::fs::write(&root, "").unwrap();

        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "ts")
            .with_text(FIELD_REPO_URL, "https://example.com/x.git")
            .with_text(FIELD_RESULT_FORMAT, "ir");
        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert_eq!(out.route, Route::IrOnly);

        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "ts")
            .with_file(FIELD_IR_FILE, "model.ir.json", &b"{}"[..]);
        let err = h.pipeline.handle(form, HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sandbox(_)));
    }

    #[tokio::test]
    async fn uploaded_ir_goes_straight_to_the_tool() {
        let h = Harness::new(GOOD_TOOL, "http://127.0.0.1:1");
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "ts")
            .with_file(FIELD_IR_FILE, "model.ir.json", &b"{}"[..]);

        let out = h.pipeline.handle(form, HeaderMap::new()).await.unwrap();
        assert_eq!(out.route, Route::ModelFromIr);
        assert_eq!(&out.body[..], br#"<xmi mode="ir"/>"#);
        assert_eq!(h.tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_ir_stage_is_internal() {
        let h = Harness::new(GOOD_TOOL, "http://127.0.0.1:1");
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "ts")
            .with_text(FIELD_REPO_URL, "https://example.com/x.git");

        let err = h.pipeline.handle(form, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(err.client_message(), "IR stage is unreachable");
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn tool_failure_diagnostics_are_redacted() {
        let h = Harness::new(FAILING_TOOL, "http://127.0.0.1:1");
        let err = h.pipeline.handle(java_archive_form(), HeaderMap::new()).await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Internal);
        let diagnostics = err.diagnostics().unwrap();
        assert!(diagnostics.contains("cannot write <workdir>/out/model.xmi"), "{diagnostics}");
        assert!(!diagnostics.contains(h.pipeline.sandbox().root().to_string_lossy().as_ref()));
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn concurrent_failures_leave_no_directories() {
        let h = std::sync::Arc::new(Harness::new(FAILING_TOOL, "http://127.0.0.1:1"));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let h = std::sync::Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                h.pipeline.handle(java_archive_form(), HeaderMap::new()).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_err());
        }
        assert_eq!(h.tool_calls().len(), 8);
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn hung_tool_times_out_and_is_cleaned_up() {
        let h = Harness::with_tool_timeout("exec sleep 30\n", "http://127.0.0.1:1", Duration::from_millis(300));
        let started = Instant::now();
        let err = h.pipeline.handle(java_archive_form(), HeaderMap::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Tool(ToolError::Timeout(_))));
        assert_eq!(err.class(), ErrorClass::Internal);
        assert!(started.elapsed() < Duration::from_secs(5));
        h.assert_no_workdirs_left().await;
    }

    #[tokio::test]
    async fn unsafe_archive_is_a_caller_error() {
        let h = Harness::new(GOOD_TOOL, "http://127.0.0.1:1");
        let form = RawForm::new()
            .with_text(FIELD_LANGUAGE, "java")
            .with_file(FIELD_INPUT_ZIP, "evil.zip", zip_of(&[("../../evil.sh", b"rm -rf /".as_slice())]));

        let err = h.pipeline.handle(form, HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Caller);
        assert!(h.tool_calls().is_empty());
        assert!(!h.dir.path().join("evil.sh").exists());
        h.assert_no_workdirs_left().await;
    }

    #[test]
    fn base_name_is_sanitized() {
        let mut req = ConversionRequest::from_form(&java_archive_form()).unwrap();
        assert_eq!(output_base_name(&req), "model");
        req.options.name = Some("../etc/passwd".into());
        assert_eq!(output_base_name(&req), "etc_passwd");
        req.options.name = Some("Billing Core".into());
        assert_eq!(output_base_name(&req), "Billing_Core");
    }
}

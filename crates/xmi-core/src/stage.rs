//! HTTP client for downstream transformation stages.
//!
//! A stage is addressed as `{base}/v{version}/{path}`.  The client asks for
//! the preferred version first and, when that route answers 404, tries the
//! fallback version exactly once.  Non-success answers are handed back as a
//! [`DownstreamFailure`] carrying the stage's own status and body, untouched.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Response header in which a stage declares the schema version it produced.
pub const SCHEMA_VERSION_HEADER: &str = "x-ir-schema-version";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid stage URL: {0}")]
    InvalidEndpoint(String),
}

/// A logical stage route with its version preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEndpoint {
    pub path: &'static str,
    pub preferred: u32,
    pub fallback: Option<u32>,
}

impl StageEndpoint {
    /// The IR-producing stage: `/v2/ir`, falling back to `/v1/ir`.
    pub const IR: StageEndpoint = StageEndpoint {
        path: "ir",
        preferred: 2,
        fallback: Some(1),
    };

    fn route(&self, version: u32) -> String {
        format!("/v{version}/{}", self.path)
    }
}

/// An attached file part.
#[derive(Debug, Clone)]
pub struct StageBlob {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Multipart request body.  Kept as plain data so it can be re-sent on the
/// fallback attempt.
#[derive(Debug, Clone, Default)]
pub struct StagePayload {
    fields: Vec<(String, String)>,
    blobs: Vec<StageBlob>,
}

impl StagePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn blob(mut self, blob: StageBlob) -> Self {
        self.blobs.push(blob);
        self
    }

    fn to_form(&self) -> Result<Form, StageError> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for blob in &self.blobs {
            let mut part =
                Part::stream_with_length(blob.bytes.clone(), blob.bytes.len() as u64).file_name(blob.file_name.clone());
            if let Some(ct) = &blob.content_type {
                part = part.mime_str(ct)?;
            }
            form = form.part(blob.field.clone(), part);
        }
        Ok(form)
    }
}

/// A successful stage answer.
#[derive(Debug, Clone)]
pub struct StageSuccess {
    pub body: Bytes,
    pub content_type: Option<String>,
    /// Version the caller asked for first.
    pub requested_version: u32,
    /// Version of the route that actually answered.
    pub route_version: u32,
    /// Schema version the stage declared, if any.
    pub declared_schema: Option<String>,
}

impl StageSuccess {
    /// Schema version actually served: the declared one, else the route's.
    pub fn served_version(&self) -> String {
        self.declared_schema
            .clone()
            .unwrap_or_else(|| self.route_version.to_string())
    }

    pub fn version_mismatch(&self) -> bool {
        self.served_version() != self.requested_version.to_string()
    }
}

/// A non-success stage answer, to be forwarded as-is.
#[derive(Debug, Clone)]
pub struct DownstreamFailure {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub enum StageResult {
    Success(StageSuccess),
    Failure(DownstreamFailure),
}

#[derive(Debug, Clone)]
pub struct StageClient {
    http: Client,
    base_url: String,
}

impl StageClient {
    /// `timeout` bounds each attempt end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StageError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| StageError::InvalidEndpoint(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StageError::InvalidEndpoint(base_url.to_owned()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xmi-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn call(
        &self,
        endpoint: &StageEndpoint,
        payload: &StagePayload,
        headers: HeaderMap,
    ) -> Result<StageResult, StageError> {
        let mut version = endpoint.preferred;
        let mut response = self.send(endpoint, version, payload, &headers).await?;

        if response.status() == StatusCode::NOT_FOUND {
            if let Some(fallback) = endpoint.fallback {
                info!(
                    endpoint = %endpoint.route(version),
                    fallback = %endpoint.route(fallback),
                    "stage route not found; retrying older version"
                );
                version = fallback;
                response = self.send(endpoint, version, payload, &headers).await?;
            }
        }

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if !status.is_success() {
            let body = response.bytes().await?;
            warn!(
                endpoint = %endpoint.route(version),
                status = status.as_u16(),
                "stage answered with an error"
            );
            return Ok(StageResult::Failure(DownstreamFailure {
                status: status.as_u16(),
                content_type,
                body,
            }));
        }

        let declared_schema = response
            .headers()
            .get(SCHEMA_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        let body = response.bytes().await?;

        let success = StageSuccess {
            body,
            content_type,
            requested_version: endpoint.preferred,
            route_version: version,
            declared_schema,
        };
        if success.version_mismatch() {
            warn!(
                endpoint = %endpoint.route(version),
                requested = endpoint.preferred,
                served = %success.served_version(),
                "stage served a different schema version"
            );
        }
        Ok(StageResult::Success(success))
    }

    async fn send(
        &self,
        endpoint: &StageEndpoint,
        version: u32,
        payload: &StagePayload,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, StageError> {
        let url = format!("{}{}", self.base_url, endpoint.route(version));
        debug!(url = %url, "calling stage");
        let response = self
            .http
            .post(&url)
            .headers(headers.clone())
            .multipart(payload.to_form()?)
            .send()
            .await?;
        Ok(response)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use tracing_test::traced_test;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StageClient {
        StageClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn payload() -> StagePayload {
        StagePayload::new().text("mode", "ts").blob(StageBlob {
            field: "inputZip".into(),
            file_name: "src.zip".into(),
            content_type: Some("application/zip".into()),
            bytes: Bytes::from_static(b"PK-archive"),
        })
    }

    fn success(result: StageResult) -> StageSuccess {
        match result {
            StageResult::Success(s) => s,
            StageResult::Failure(f) => panic!("unexpected failure status {}", f.status),
        }
    }

    #[tokio::test]
    async fn preferred_version_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .and(body_string_contains("filename=\"src.zip\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(SCHEMA_VERSION_HEADER, "2")
                    .set_body_raw(br#"{"types":[]}"#.to_vec(), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ok = success(
            client(&server)
                .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
                .await
                .unwrap(),
        );
        assert_eq!(&ok.body[..], br#"{"types":[]}"#);
        assert_eq!(ok.route_version, 2);
        assert!(!ok.version_mismatch());
    }

    #[tokio::test]
    #[traced_test]
    async fn not_found_falls_back_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/ir"))
            .and(body_string_contains("PK-archive"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let ok = success(
            client(&server)
                .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
                .await
                .unwrap(),
        );
        assert_eq!(ok.route_version, 1);
        assert_eq!(ok.served_version(), "1");
        assert!(ok.version_mismatch());
        assert!(logs_contain("retrying older version"));
        assert!(logs_contain("stage served a different schema version"));
    }

    #[tokio::test]
    async fn fallback_not_found_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .expect(2)
            .mount(&server)
            .await;

        match client(&server)
            .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
            .await
            .unwrap()
        {
            StageResult::Failure(f) => {
                assert_eq!(f.status, 404);
                assert_eq!(&f.body[..], b"no such route");
            }
            StageResult::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn declared_schema_mismatch_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(ResponseTemplate::new(200).insert_header(SCHEMA_VERSION_HEADER, "3").set_body_string("{}"))
            .mount(&server)
            .await;

        let ok = success(
            client(&server)
                .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
                .await
                .unwrap(),
        );
        assert_eq!(ok.served_version(), "3");
        assert!(ok.version_mismatch());
    }

    #[tokio::test]
    async fn error_body_and_status_are_forwarded_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_raw(br#"{"error":"tsconfig.json not found"}"#.to_vec(), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/ir"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        match client(&server)
            .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
            .await
            .unwrap()
        {
            StageResult::Failure(f) => {
                assert_eq!(f.status, 422);
                assert_eq!(f.content_type.as_deref(), Some("application/json"));
                assert_eq!(&f.body[..], br#"{"error":"tsconfig.json not found"}"#);
            }
            StageResult::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn forwards_caller_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ir"))
            .and(header("x-trace-id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "abc".parse().unwrap());
        client(&server)
            .call(&StageEndpoint::IR, &payload(), headers)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_stage_is_a_transport_error() {
        let client = StageClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client
            .call(&StageEndpoint::IR, &payload(), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Transport(_)));
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(matches!(
            StageClient::new("ftp://example.com", Duration::from_secs(1)),
            Err(StageError::InvalidEndpoint(_))
        ));
    }
}

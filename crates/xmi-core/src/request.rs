//! Inbound conversion request: raw form fields and the validated model built
//! from them.
//!
//! [`RawForm`] is what the HTTP layer collects from a multipart body.  It is
//! legacy-normalized exactly once ([`RawForm::normalized`]) and then parsed
//! into an immutable [`ConversionRequest`].

use bytes::Bytes;
use strum::{AsRefStr, Display, EnumString};

use crate::error::RequestError;
use crate::options::{self, ConversionOptions};

// ── Form field names ─────────────────────────────────────────────────────────

pub const FIELD_LANGUAGE: &str = "language";
pub const FIELD_INPUT_ZIP: &str = "inputZip";
pub const FIELD_REPO_URL: &str = "repoUrl";
pub const FIELD_REPO_REF: &str = "repoRef";
pub const FIELD_IR_FILE: &str = "irFile";
pub const FIELD_RESULT_FORMAT: &str = "resultFormat";
pub const FIELD_EXCLUDE: &str = "exclude";

// ── Enumerations ─────────────────────────────────────────────────────────────

/// Source language tag accepted on `POST /v1/xmi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    /// The model tool's native language; handled without an IR stage.
    Java,
    Ts,
    Js,
    React,
    Angular,
}

impl Language {
    /// Front-end languages routed through the IR stage.
    pub const FRONTEND: [Language; 4] = [Language::Ts, Language::Js, Language::React, Language::Angular];

    pub fn is_native(self) -> bool {
        matches!(self, Language::Java)
    }
}

/// What the caller wants back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResultFormat {
    #[default]
    Xmi,
    Ir,
}

// ── Raw form ─────────────────────────────────────────────────────────────────

/// An uploaded file part.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Multipart fields in arrival order.  Repeated fields are kept.
#[derive(Debug, Clone, Default)]
pub struct RawForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, Upload)>,
}

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn push_file(&mut self, name: impl Into<String>, upload: Upload) {
        self.files.push((name.into(), upload));
    }

    /// Builder-style variant of [`push_text`](Self::push_text).
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_text(name, value);
        self
    }

    /// Builder-style variant of [`push_file`](Self::push_file).
    pub fn with_file(mut self, name: impl Into<String>, file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.push_file(
            name,
            Upload {
                file_name: file_name.into(),
                bytes: bytes.into(),
            },
        );
        self
    }

    /// First non-blank value of a text field, trimmed.
    pub fn text<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.texts(name).next()
    }

    /// Every non-blank value of a text field, trimmed, in arrival order.
    pub fn texts<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty file part with the given name.
    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files
            .iter()
            .find(|(k, u)| k == name && !u.bytes.is_empty())
            .map(|(_, u)| u)
    }

    /// Rewrite legacy option values to their canonical form.
    ///
    /// Pure and idempotent: `form.normalized().normalized()` carries the same
    /// values as `form.normalized()`.
    pub fn normalized(self) -> Self {
        let fields = self
            .fields
            .into_iter()
            .map(|(k, v)| {
                let canonical = options::normalize_legacy(&k, &v).into_owned();
                (k, canonical)
            })
            .collect();
        Self {
            fields,
            files: self.files,
        }
    }
}

// ── Validated request ────────────────────────────────────────────────────────

/// Where the project source comes from.
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    Archive(Upload),
    Repository { url: String, reference: Option<String> },
}

/// What the pipeline starts from: project source, or an IR document the
/// caller already holds.
#[derive(Debug, Clone)]
pub enum RequestInput {
    Source(SourceOrigin),
    Ir(Upload),
}

/// A fully validated conversion request.  Immutable once built.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub language: Language,
    pub input: RequestInput,
    pub options: ConversionOptions,
    pub excludes: Vec<String>,
    pub result_format: ResultFormat,
}

impl ConversionRequest {
    /// Validate an already-normalized form.
    ///
    /// Caller errors are reported in a fixed order: missing language, unknown
    /// language, source origin, result format, then option values.
    pub fn from_form(form: &RawForm) -> Result<Self, RequestError> {
        let raw_language = form
            .text(FIELD_LANGUAGE)
            .ok_or(RequestError::MissingField(FIELD_LANGUAGE))?;
        let language: Language = raw_language
            .parse()
            .map_err(|_| RequestError::UnsupportedLanguage(raw_language.to_owned()))?;

        let input = parse_input(form)?;
        if matches!(input, RequestInput::Ir(_)) && language.is_native() {
            return Err(RequestError::UnsupportedCombination(
                "irFile requires a front-end language (ts, js, react, angular)",
            ));
        }

        let result_format = match form.text(FIELD_RESULT_FORMAT) {
            None => ResultFormat::default(),
            Some(v) => v.parse().map_err(|_| RequestError::InvalidOption {
                field: FIELD_RESULT_FORMAT,
                value: v.to_owned(),
            })?,
        };
        if result_format == ResultFormat::Ir {
            if language.is_native() {
                return Err(RequestError::UnsupportedCombination(
                    "resultFormat=ir is not available for language=java",
                ));
            }
            if matches!(input, RequestInput::Ir(_)) {
                return Err(RequestError::UnsupportedCombination(
                    "resultFormat=ir cannot be combined with irFile",
                ));
            }
        }

        let options = ConversionOptions::from_form(form)?;

        let mut excludes = Vec::new();
        for glob in form.texts(FIELD_EXCLUDE) {
            options::check_free_text(FIELD_EXCLUDE, glob)?;
            excludes.push(glob.to_owned());
        }

        Ok(Self {
            language,
            input,
            options,
            excludes,
            result_format,
        })
    }
}

fn parse_input(form: &RawForm) -> Result<RequestInput, RequestError> {
    let archive = form.file(FIELD_INPUT_ZIP);
    let repo_url = form.text(FIELD_REPO_URL);
    let ir_file = form.file(FIELD_IR_FILE);

    let present = [archive.is_some(), repo_url.is_some(), ir_file.is_some()]
        .iter()
        .filter(|p| **p)
        .count();
    match present {
        0 => return Err(RequestError::MissingSource),
        1 => {}
        _ => return Err(RequestError::ConflictingSources),
    }

    if let Some(upload) = archive {
        return Ok(RequestInput::Source(SourceOrigin::Archive(upload.clone())));
    }
    if let Some(upload) = ir_file {
        return Ok(RequestInput::Ir(upload.clone()));
    }

    let url = repo_url.unwrap_or_default();
    let parsed = reqwest::Url::parse(url).map_err(|_| RequestError::InvalidRepoUrl(url.to_owned()))?;
    if parsed.scheme() != "https" || parsed.host_str().is_none() {
        return Err(RequestError::InvalidRepoUrl(url.to_owned()));
    }
    let reference = match form.text(FIELD_REPO_REF) {
        Some(r) => {
            options::check_free_text(FIELD_REPO_REF, r)?;
            Some(r.to_owned())
        }
        None => None,
    };
    Ok(RequestInput::Source(SourceOrigin::Repository {
        url: url.to_owned(),
        reference,
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

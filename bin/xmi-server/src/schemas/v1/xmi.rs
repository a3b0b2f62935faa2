use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart form accepted by `POST /v1/xmi`.
///
/// Exactly one of `inputZip`, `repoUrl` or `irFile` must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct XmiRequestUpload {
    /// `java`, `ts`, `js`, `react` or `angular` (case-insensitive).
    pub language: String,
    /// ZIP archive of the project source.
    #[schema(value_type = Option<String>, format = Binary)]
    pub input_zip: Option<Vec<u8>>,
    /// HTTPS URL of a git repository to clone.
    pub repo_url: Option<String>,
    /// Branch or tag to clone; defaults to the remote HEAD.
    pub repo_ref: Option<String>,
    /// A previously produced IR document (front-end languages only).
    #[schema(value_type = Option<String>, format = Binary)]
    pub ir_file: Option<Vec<u8>>,
    /// `xmi` (default) or `ir` (front-end languages only).
    pub result_format: Option<String>,
    /// Model name; also used for the download file name.
    pub name: Option<String>,
    /// `resolved` or `smart` (legacy `basic`/`all` accepted).
    pub associations: Option<String>,
    /// Include dependency edges (legacy `none`/`calls`/`all` accepted).
    pub deps: Option<String>,
    pub nested_types: Option<String>,
    pub include_accessors: Option<bool>,
    pub include_constructors: Option<bool>,
    pub fail_on_unresolved: Option<bool>,
    pub no_stereotypes: Option<bool>,
    /// Glob excluded from analysis; repeat the field for more.
    pub exclude: Option<Vec<String>>,
}

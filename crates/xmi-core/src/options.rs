//! Conversion options: legacy-alias normalization, validation, and the
//! pass-through table that maps request fields onto model-tool flags.

use std::borrow::Cow;

use strum::{AsRefStr, Display, EnumString};

use crate::error::RequestError;
use crate::request::RawForm;

pub const FIELD_NAME: &str = "name";
pub const FIELD_ASSOCIATIONS: &str = "associations";
pub const FIELD_DEPS: &str = "deps";
pub const FIELD_NESTED_TYPES: &str = "nestedTypes";
pub const FIELD_INCLUDE_ACCESSORS: &str = "includeAccessors";
pub const FIELD_INCLUDE_CONSTRUCTORS: &str = "includeConstructors";
pub const FIELD_FAIL_ON_UNRESOLVED: &str = "failOnUnresolved";
pub const FIELD_NO_STEREOTYPES: &str = "noStereotypes";

// ── Legacy normalization ─────────────────────────────────────────────────────

/// Rewrite a legacy option value to its canonical spelling.
///
/// Only `associations` and `deps` have legacy aliases; every other field is
/// returned unchanged.  Applying the function to its own output is a no-op.
pub fn normalize_legacy<'a>(field: &str, value: &'a str) -> Cow<'a, str> {
    let lowered = value.trim().to_ascii_lowercase();
    match (field, lowered.as_str()) {
        (FIELD_ASSOCIATIONS, "basic") => Cow::Borrowed("resolved"),
        (FIELD_ASSOCIATIONS, "all") => Cow::Borrowed("smart"),
        (FIELD_DEPS, "none") => Cow::Borrowed("false"),
        (FIELD_DEPS, "calls" | "all") => Cow::Borrowed("true"),
        _ => Cow::Borrowed(value),
    }
}

// ── Typed options ────────────────────────────────────────────────────────────

/// How the model tool resolves associations between types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AssociationMode {
    Resolved,
    Smart,
}

/// Validated option set.  Built once per request from a normalized form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOptions {
    pub name: Option<String>,
    pub associations: Option<AssociationMode>,
    pub deps: Option<bool>,
    pub nested_types: Option<String>,
    pub include_accessors: Option<bool>,
    pub include_constructors: Option<bool>,
    pub fail_on_unresolved: Option<bool>,
    pub no_stereotypes: bool,
}

impl ConversionOptions {
    pub fn from_form(form: &RawForm) -> Result<Self, RequestError> {
        let name = free_text(form, FIELD_NAME)?;
        let nested_types = free_text(form, FIELD_NESTED_TYPES)?;
        let associations = match form.text(FIELD_ASSOCIATIONS) {
            None => None,
            Some(v) => Some(v.parse().map_err(|_| RequestError::InvalidOption {
                field: FIELD_ASSOCIATIONS,
                value: v.to_owned(),
            })?),
        };

        Ok(Self {
            name,
            associations,
            deps: flag(form, FIELD_DEPS)?,
            nested_types,
            include_accessors: flag(form, FIELD_INCLUDE_ACCESSORS)?,
            include_constructors: flag(form, FIELD_INCLUDE_CONSTRUCTORS)?,
            fail_on_unresolved: flag(form, FIELD_FAIL_ON_UNRESOLVED)?,
            no_stereotypes: flag(form, FIELD_NO_STEREOTYPES)?.unwrap_or(false),
        })
    }

    /// Value handed to the tool for `field`, if the caller set one.
    fn passthrough_value(&self, field: &str) -> Option<String> {
        match field {
            FIELD_NAME => self.name.clone(),
            FIELD_ASSOCIATIONS => self.associations.map(|a| a.to_string()),
            FIELD_DEPS => self.deps.map(|b| b.to_string()),
            FIELD_NESTED_TYPES => self.nested_types.clone(),
            FIELD_INCLUDE_ACCESSORS => self.include_accessors.map(|b| b.to_string()),
            FIELD_INCLUDE_CONSTRUCTORS => self.include_constructors.map(|b| b.to_string()),
            FIELD_FAIL_ON_UNRESOLVED => self.fail_on_unresolved.map(|b| b.to_string()),
            FIELD_NO_STEREOTYPES => Some(self.no_stereotypes.to_string()),
            _ => None,
        }
    }

    /// Tool flags for every option that is set, in [`PASSTHROUGH`] order.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for entry in PASSTHROUGH {
            let Some(value) = self.passthrough_value(entry.field) else {
                continue;
            };
            match entry.kind {
                FlagKind::Valued if !value.is_empty() => {
                    args.push(entry.flag.to_owned());
                    args.push(value);
                }
                FlagKind::Switch if value == "true" => args.push(entry.flag.to_owned()),
                _ => {}
            }
        }
        args
    }
}

// ── Pass-through table ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// `--flag value`
    Valued,
    /// bare `--flag` when true, omitted otherwise
    Switch,
}

#[derive(Debug, Clone, Copy)]
pub struct Passthrough {
    pub field: &'static str,
    pub flag: &'static str,
    pub kind: FlagKind,
}

/// Request field → model-tool flag.  `exclude` is handled separately since it
/// repeats.
pub const PASSTHROUGH: &[Passthrough] = &[
    Passthrough { field: FIELD_NAME, flag: "--name", kind: FlagKind::Valued },
    Passthrough { field: FIELD_ASSOCIATIONS, flag: "--associations", kind: FlagKind::Valued },
    Passthrough { field: FIELD_DEPS, flag: "--deps", kind: FlagKind::Valued },
    Passthrough { field: FIELD_NESTED_TYPES, flag: "--nested-types", kind: FlagKind::Valued },
    Passthrough { field: FIELD_INCLUDE_ACCESSORS, flag: "--include-accessors", kind: FlagKind::Valued },
    Passthrough { field: FIELD_INCLUDE_CONSTRUCTORS, flag: "--include-constructors", kind: FlagKind::Valued },
    Passthrough { field: FIELD_FAIL_ON_UNRESOLVED, flag: "--fail-on-unresolved", kind: FlagKind::Valued },
    Passthrough { field: FIELD_NO_STEREOTYPES, flag: "--no-stereotypes", kind: FlagKind::Switch },
];

// ── private helpers ──────────────────────────────────────────────────────────

/// Values that end up as separate argv entries must never be mistaken for a
/// flag and must stay on one line.
pub(crate) fn check_free_text(field: &'static str, value: &str) -> Result<(), RequestError> {
    if value.starts_with('-') || value.contains(['\0', '\n', '\r']) {
        return Err(RequestError::InvalidOption {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn free_text(form: &RawForm, field: &'static str) -> Result<Option<String>, RequestError> {
    match form.text(field) {
        None => Ok(None),
        Some(v) => {
            check_free_text(field, v)?;
            Ok(Some(v.to_owned()))
        }
    }
}

fn flag(form: &RawForm, field: &'static str) -> Result<Option<bool>, RequestError> {
    let Some(v) = form.text(field) else {
        return Ok(None);
    };
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(RequestError::InvalidOption {
            field,
            value: v.to_owned(),
        }),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

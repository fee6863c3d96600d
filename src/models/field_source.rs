//! The shared `(name) -> Option<String>` lookup used by both the header
//! and JSON-body parsing paths (§9, "dynamic header / JSON reads").
//!
//! `MetaDataExtractor` is written once against this trait so that a
//! pre-request (JSON body) and a chunk/status request (headers) produce
//! identical `Uploadable` values for the same logical input.

use axum::http::HeaderMap;

pub trait FieldSource {
    /// Look up a named field, returning its string representation.
    fn field(&self, name: &str) -> Option<String>;
}

impl FieldSource for HeaderMap {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
    }
}

impl FieldSource for serde_json::Value {
    fn field(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A field source with a handful of fields forced to fixed values —
/// used to fold a path parameter (e.g. `measurementId` on an attachment
/// route) into the same body/header a client supplied, without requiring
/// the client to repeat it.
pub struct WithOverrides<'a> {
    base: &'a dyn FieldSource,
    overrides: Vec<(&'static str, String)>,
}

impl<'a> WithOverrides<'a> {
    pub fn new(base: &'a dyn FieldSource, overrides: Vec<(&'static str, String)>) -> Self {
        Self { base, overrides }
    }
}

impl FieldSource for WithOverrides<'_> {
    fn field(&self, name: &str) -> Option<String> {
        for (key, value) in &self.overrides {
            if *key == name {
                return Some(value.clone());
            }
        }
        self.base.field(name)
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Broadsheet.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Broadsheet operations.
#[derive(Debug, Error)]
pub enum BroadsheetError {
    // -- Input errors --
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed or unsupported PDF: {0}")]
    InvalidPdf(String),

    // -- Render errors --
    #[error("no rasterizer backend available (tried: {0})")]
    RendererUnavailable(String),

    #[error("page {page} failed to render: {reason}")]
    PageRender { page: u32, reason: String },

    // -- Asset store --
    #[error("asset upload failed: {0}")]
    Upload(String),

    // -- Aggregate errors --
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("edition not found: {0}")]
    NotFound(String),

    // -- Internal --
    #[error("image processing failed: {0}")]
    Image(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BroadsheetError>;

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded, otherwise a `Validation` error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BroadsheetError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Caller-facing classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Missing fields or a malformed PDF. Caller must fix the request.
    Input,
    /// No backend could render, or a page failed. Caller must resubmit.
    Render,
    /// The remote asset store rejected or dropped an upload.
    Upload,
    /// The aggregate failed field checks; nothing was applied.
    Validation,
    /// Unknown edition identifier.
    NotFound,
    /// Storage, I/O, or configuration fault on our side.
    Internal,
}

impl ErrorClass {
    /// HTTP-equivalent status code for this class.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input => 400,
            Self::Render => 500,
            Self::Upload => 502,
            Self::Validation => 422,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }

    /// No class is retried automatically; render and upload failures
    /// require the caller to resubmit the whole operation.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Classify a `BroadsheetError` into the caller-facing taxonomy.
pub fn classify_error(err: &BroadsheetError) -> ErrorClass {
    match err {
        BroadsheetError::MissingField(_) | BroadsheetError::InvalidPdf(_) => ErrorClass::Input,

        BroadsheetError::RendererUnavailable(_) | BroadsheetError::PageRender { .. } => {
            ErrorClass::Render
        }

        BroadsheetError::Upload(_) => ErrorClass::Upload,
        BroadsheetError::Validation(_) => ErrorClass::Validation,
        BroadsheetError::NotFound(_) => ErrorClass::NotFound,

        BroadsheetError::Image(_)
        | BroadsheetError::Database(_)
        | BroadsheetError::Config(_)
        | BroadsheetError::Task(_)
        | BroadsheetError::Io(_)
        | BroadsheetError::Serialization(_) => ErrorClass::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_unavailable_is_distinct_from_corrupt_input() {
        let unavailable = BroadsheetError::RendererUnavailable("pdfium, pdftoppm".into());
        let corrupt = BroadsheetError::InvalidPdf("no trailer".into());
        assert_eq!(classify_error(&unavailable), ErrorClass::Render);
        assert_eq!(classify_error(&corrupt), ErrorClass::Input);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = BroadsheetError::NotFound("slug:missing".into());
        assert_eq!(classify_error(&err).status_code(), 404);
    }

    #[test]
    fn nothing_is_retried_automatically() {
        let err = BroadsheetError::Upload("connection reset".into());
        assert!(!classify_error(&err).is_retryable());
    }

    #[test]
    fn validation_errors_keep_first_message_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "must not be empty");
        errors.add("title", "second message");
        errors.add("date", "expected YYYY-MM-DD");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("title"), Some("must not be empty"));
        assert_eq!(
            errors.to_string(),
            "date: expected YYYY-MM-DD; title: must not be empty"
        );
    }

    #[test]
    fn validation_errors_serialize_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("status", "unknown status 'live'");
        let json = serde_json::to_value(&errors).expect("serialize");
        assert_eq!(json["status"], "unknown status 'live'");
    }

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}

//! Parsing error types for the shows page
//!
//! Seance rows report through `RowOutcome` instead; these errors cover a
//! single show row that could not be turned into a `ShowListing`.

use thiserror::Error;

use crate::infrastructure::browser::BrowserError;

#[derive(Error, Debug, Clone)]
pub enum ParsingError {
    #[error("Required field '{field}' not found in {context}")]
    RequiredFieldMissing { field: String, context: String },

    #[error("URL resolution failed: {url} - {reason}")]
    UrlResolutionFailed { url: String, reason: String },

    #[error("Browser error during extraction: {0}")]
    Browser(#[from] BrowserError),
}

impl ParsingError {
    /// Create a required field missing error with context
    pub fn required_field_missing(field: &str, context: &str) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            context: context.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;

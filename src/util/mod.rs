//! Utility functions for common operations.
//!
//! - **URL validation**: scheme and host checks before any outbound request
//! - **Text processing**: plain-text normalization of entry titles

mod text;
mod url_validator;

pub use text::sanitize_title;
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};

//! Header clause grammar.
//!
//! A header is a comma separated list of clauses. Each clause has one or
//! more names followed by `;` separated attributes (`key=value`) and
//! directives (`key:=value`):
//!
//! ```rust
//! use bundlescope::header::Parameters;
//!
//! let header = Parameters::parse("com.acme;version=1.2;uses:=\"a,b\", com.acme.spi").unwrap();
//! assert_eq!(header.len(), 2);
//! assert_eq!(header.get("com.acme").unwrap().get("uses:"), Some("a,b"));
//! ```

mod attrs;
mod parameters;
pub mod version;

pub use attrs::{AttrType, Attrs};
pub use parameters::{is_duplicate, strip_duplicate_marker, Parameters, DUPLICATE_MARKER};
pub use version::{cleanup_version, Version, VersionRange};

use thiserror::Error;

/// Errors raised while parsing header text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid version range: {0}")]
    InvalidRange(String),

    #[error("invalid range mask: {0}, expected something like [==,+)")]
    InvalidRangeMask(String),

    #[error("empty value for directive {key} in clause {clause}")]
    EmptyDirective { key: String, clause: String },

    #[error("missing key before '=' in clause {clause}")]
    MissingKey { clause: String },

    #[error("missing name in clause {clause}")]
    MissingName { clause: String },

    #[error("unterminated quote in header {header}")]
    UnterminatedQuote { header: String },

    #[error("name {name} follows attributes in clause {clause}")]
    NameAfterAttributes { name: String, clause: String },

    #[error("invalid {ty} value for {key}: {value}")]
    InvalidTypedValue { key: String, ty: String, value: String },
}

pub type HeaderResult<T> = Result<T, HeaderError>;

/// Quotes a value unless it is a plain token.
pub(crate) fn quote_if_needed(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c == '-' || c == '_' || c.is_alphanumeric());
    if plain {
        value.to_string()
    } else {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    }
}

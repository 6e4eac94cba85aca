use std::fmt::{self, Display};

use serde::Serialize;
use thiserror::Error;

/// A single data-level validation failure.
///
/// Errors are plain values: comparable, sortable and serializable as
/// `{"message": …, "path": …}`. The path is a JSON pointer (RFC 6901)
/// into the validated data, `/` for the document root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ValidationError {
    pub message: String,
    pub path: String,
}

impl ValidationError {
    /// `path` is the raw pointer as built during traversal; the empty
    /// pointer names the root and renders as `/`.
    pub(crate) fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: if path.is_empty() { "/".into() } else { path.into() },
        }
    }

    /// Rebuilds an error at an already-rendered path. Used when errors
    /// from alternative sub-validations are regrouped.
    pub(crate) fn at(path: String, message: String) -> Self {
        Self { message, path }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Failure while fetching or parsing a schema document.
#[derive(Debug, Error)]
#[error("error loading {url}: {kind}")]
pub struct LoadError {
    pub url: String,
    pub kind: LoadErrorKind,
}

#[derive(Debug)]
pub enum LoadErrorKind {
    Io(std::io::Error),
    Fetch(String),
    /// `body` carries the raw document body when debug mode is on.
    Parse {
        detail: String,
        body: Option<String>,
    },
    Url(url::ParseError),
    InvalidFilePath,
    UnsupportedScheme(String),
    UnknownResource {
        module: String,
        name: String,
    },
    YamlBackendMissing,
}

impl Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Fetch(e) => write!(f, "{e}"),
            Self::Parse { detail, body: None } => write!(f, "parse error: {detail}"),
            Self::Parse {
                detail,
                body: Some(body),
            } => write!(f, "parse error: {detail}; body: {body}"),
            Self::Url(e) => write!(f, "invalid url: {e}"),
            Self::InvalidFilePath => write!(f, "invalid file path"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported scheme {scheme:?}"),
            Self::UnknownResource { module, name } => {
                write!(f, "no embedded resource {module}/{name}")
            }
            Self::YamlBackendMissing => write!(f, "no yaml backend available"),
        }
    }
}

/// Failure while ingesting a schema; validation never raises these.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Load(LoadError),

    #[error("cannot resolve {reference:?} against {namespace}: {reason}")]
    Resolve {
        reference: String,
        namespace: String,
        reason: String,
    },

    #[error("no yaml backend available")]
    YamlBackendMissing,
}

impl From<LoadError> for IngestError {
    fn from(e: LoadError) -> Self {
        if matches!(e.kind, LoadErrorKind::YamlBackendMissing) {
            IngestError::YamlBackendMissing
        } else {
            IngestError::Load(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = ValidationError::new("/age", "-42 < minimum(0)");
        assert_eq!(e.to_string(), "/age: -42 < minimum(0)");
        let root = ValidationError::new("", "Missing property.");
        assert_eq!(root.to_string(), "/: Missing property.");
    }

    #[test]
    fn test_serialize() {
        let e = ValidationError::new("/a", "Missing property.");
        assert_eq!(
            serde_json::to_string(&e).unwrap(),
            r#"{"message":"Missing property.","path":"/a"}"#
        );
    }
}

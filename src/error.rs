//! Errors that abort a chromosome (or the whole run, for configuration problems).
//!
//! Record-level problems never show up here: malformed annotation rows and
//! alignment blocks are skipped and counted by the stage that reads them.

use crate::maf::MafError;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ErvError {
    /// The input exists but nothing usable could be read from it
    Format(String),
    /// Rejected before any chromosome is processed
    Configuration(String),
    /// A required input could not be opened
    Resource { path: PathBuf, source: io::Error },
    Io(io::Error),
}

impl ErvError {
    pub fn resource(path: &Path, source: io::Error) -> Self {
        ErvError::Resource {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for ErvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErvError::Format(msg) => write!(f, "format error: {}", msg),
            ErvError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            ErvError::Resource { path, source } => {
                write!(f, "missing input '{}': {}", path.display(), source)
            }
            ErvError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ErvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ErvError::Resource { source, .. } => Some(source),
            ErvError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ErvError {
    fn from(e: io::Error) -> Self {
        ErvError::Io(e)
    }
}

impl From<MafError> for ErvError {
    fn from(e: MafError) -> Self {
        match e {
            // what the gzip decoder reports for a corrupt stream
            MafError::Io(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
                ) =>
            {
                ErvError::Format(format!("cannot decode alignment: {}", e))
            }
            MafError::Io(e) => ErvError::Io(e),
            other => ErvError::Format(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ErvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_errors_map_to_format() {
        let corrupt = io::Error::new(io::ErrorKind::InvalidInput, "corrupt deflate stream");
        let err = ErvError::from(MafError::Io(corrupt));
        assert!(matches!(err, ErvError::Format(_)));
        assert!(err.to_string().starts_with("format error: cannot decode alignment"));

        let disk = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(ErvError::from(MafError::Io(disk)), ErvError::Io(_)));
        assert!(matches!(
            ErvError::from(MafError::EmptyBlock { line: 3 }),
            ErvError::Format(_)
        ));
    }
}

use crate::parser::StructureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The document could not be parsed: a syntax error or an unbalanced tree
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    /// Reading from the chunk source or writing output failed
    #[error("IO error: {0}")]
    IoError(String),
    /// Invalid input or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A path pattern in a filter list did not compile
    #[error("Regex error: {0}")]
    RegexError(String),
    /// The ZIP container is corrupt or uses an unsupported feature
    #[error("Archive error: {0}")]
    ArchiveError(String),
    /// Building or writing the Parquet output failed
    #[error("Output error: {0}")]
    OutputError(String),
}

impl AppError {
    /// Returns true for failures caused by the document content itself.
    pub fn is_malformed(&self) -> bool {
        matches!(self, AppError::MalformedDocument(_))
    }
}

// Conversion implementations for common errors
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::RegexError(err.to_string())
    }
}

impl From<quick_xml::Error> for AppError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            // Transport failures are not the document's fault
            quick_xml::Error::Io(e) => AppError::IoError(e.to_string()),
            other => AppError::MalformedDocument(other.to_string()),
        }
    }
}

impl From<StructureError> for AppError {
    fn from(err: StructureError) -> Self {
        AppError::MalformedDocument(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => AppError::IoError(e.to_string()),
            other => AppError::ArchiveError(other.to_string()),
        }
    }
}

impl From<polars::prelude::PolarsError> for AppError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AppError::OutputError(err.to_string())
    }
}

// Custom type alias for Results in this application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn test_malformed_document_display() {
        let err = AppError::MalformedDocument("unexpected end tag </B>".to_string());
        let error_msg = err.to_string();
        assert!(error_msg.contains("Malformed document"));
        assert!(error_msg.contains("</B>"));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_io_error_display() {
        let err = AppError::IoError("connection reset".to_string());
        assert!(err.to_string().contains("IO error"));
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_regex_error_from_invalid_pattern() {
        let err: AppError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, AppError::RegexError(_)));
        assert!(err.to_string().contains("Regex error"));
    }

    #[test]
    fn test_structure_error_becomes_malformed() {
        let err: AppError = crate::parser::StructureError.into();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "chunk source gone");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::IoError(_)));
        assert!(err.to_string().contains("chunk source gone"));
    }

    #[test]
    fn test_invalid_input_error_display() {
        let err = AppError::InvalidInput("chunk size must be positive".to_string());
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_app_error_implements_error_trait() {
        use std::error::Error;
        let err: Box<dyn Error> = Box::new(AppError::ArchiveError("bad header".to_string()));
        assert!(!err.to_string().is_empty());
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Run-level error type for failures that abort the whole analysis
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File discovery failed: {path} - {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("Invalid taxpayer RFC: {value}")]
    InvalidTaxId { value: String },

    #[error("No voucher files found under the given paths")]
    NoInputFiles,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },

    #[error("Export failed: {path} - {details}")]
    Export { path: PathBuf, details: String },
}

/// Per-document parse failures.
///
/// These never abort a run: the engine records them against the offending
/// file in the data-quality report and moves on to the next document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed XML: {details}")]
    MalformedXml { details: String },

    #[error("Unsupported root element: {found}")]
    UnsupportedRoot { found: String },

    #[error("Unsupported CFDI version: {version}")]
    UnsupportedVersion { version: String },

    #[error("Missing required field: {element}@{attribute}")]
    MissingField { element: String, attribute: String },

    #[error("Missing fiscal UUID: no TimbreFiscalDigital complement")]
    MissingUuid,

    #[error("Invalid amount in {attribute}: {value}")]
    InvalidAmount { attribute: String, value: String },

    #[error("Invalid issue date: {value}")]
    InvalidDate { value: String },

    #[error("Voucher declares no concepts")]
    EmptyConcepts,

    #[error("Negative total: {total}")]
    NegativeTotal { total: String },
}

impl ParseError {
    pub fn missing_field(element: &str, attribute: &str) -> Self {
        ParseError::MissingField {
            element: element.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// Result type alias for per-document parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_analyze_error_display() {
        let io_error = AnalyzeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(io_error.to_string().contains("IO error"));

        let discovery = AnalyzeError::Discovery {
            path: PathBuf::from("/data/vouchers"),
            reason: "permission denied".to_string(),
        };
        assert!(discovery.to_string().contains("File discovery failed"));
        assert!(discovery.to_string().contains("/data/vouchers"));
        assert!(discovery.to_string().contains("permission denied"));

        let bad_rfc = AnalyzeError::InvalidTaxId {
            value: "NOT-AN-RFC".to_string(),
        };
        assert!(bad_rfc.to_string().contains("Invalid taxpayer RFC"));
        assert!(bad_rfc.to_string().contains("NOT-AN-RFC"));
    }

    #[test]
    fn test_parse_error_display() {
        let malformed = ParseError::MalformedXml {
            details: "unexpected end of input".to_string(),
        };
        assert!(malformed.to_string().contains("Malformed XML"));
        assert!(malformed.to_string().contains("unexpected end of input"));

        let missing = ParseError::missing_field("Comprobante", "Fecha");
        assert_eq!(
            missing.to_string(),
            "Missing required field: Comprobante@Fecha"
        );

        let bad_amount = ParseError::InvalidAmount {
            attribute: "Total".to_string(),
            value: "12,34".to_string(),
        };
        assert!(bad_amount.to_string().contains("Total"));
        assert!(bad_amount.to_string().contains("12,34"));

        let bad_version = ParseError::UnsupportedVersion {
            version: "3.2".to_string(),
        };
        assert!(bad_version.to_string().contains("3.2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Access denied");
        let analyze_error: AnalyzeError = io_error.into();

        match analyze_error {
            AnalyzeError::Io(_) => (),
            _ => panic!("Expected AnalyzeError::Io"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let analyze_error = AnalyzeError::Io(io_error);

        assert!(analyze_error.source().is_some());

        let source = analyze_error.source().unwrap();
        assert_eq!(source.to_string(), "File not found");
    }

    #[test]
    fn test_parse_error_equality() {
        assert_eq!(ParseError::MissingUuid, ParseError::MissingUuid);
        assert_ne!(
            ParseError::missing_field("Emisor", "Rfc"),
            ParseError::missing_field("Receptor", "Rfc"),
        );
    }

    #[test]
    fn test_result_type_aliases() {
        let success: Result<String> = Ok("success".to_string());
        assert!(success.is_ok());

        let failure: Result<String> = Err(AnalyzeError::Config("test error".to_string()));
        assert!(failure.is_err());

        let parse_failure: ParseResult<()> = Err(ParseError::EmptyConcepts);
        assert!(parse_failure.is_err());
    }
}

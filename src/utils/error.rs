use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No data to process")]
    EmptyInput,

    #[error("Name columns not detected. Columns found: {}", found.join(", "))]
    ColumnDetectionError { found: Vec<String> },

    #[error("Reference store error: {message}")]
    ReferenceStoreError { message: String },

    #[error("Run ledger error: {message}")]
    LedgerError { message: String },

    #[error("Lookup for '{name}' exceeded {timeout_ms}ms")]
    LookupTimeout { name: String, timeout_ms: u128 },

    #[error("Run {run_id} cancelled after {rows_processed} rows")]
    Cancelled { run_id: u64, rows_processed: usize },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// 錯誤分類，用於日誌與退出碼決策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Reference,
    Ledger,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::CsvError(_) | EtlError::EmptyInput | EtlError::ColumnDetectionError { .. } => {
                ErrorCategory::Input
            }
            EtlError::ReferenceStoreError { .. } | EtlError::LookupTimeout { .. } => {
                ErrorCategory::Reference
            }
            EtlError::LedgerError { .. } => ErrorCategory::Ledger,
            EtlError::Cancelled { .. }
            | EtlError::ProcessingError { .. }
            | EtlError::SerializationError(_) => ErrorCategory::Processing,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::Cancelled { .. } => ErrorSeverity::Low,
            EtlError::LookupTimeout { .. } | EtlError::ReferenceStoreError { .. } => {
                ErrorSeverity::Medium
            }
            EtlError::IoError(_) | EtlError::LedgerError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the command line flags or the TOML configuration file",
            ErrorCategory::Input => {
                "Make sure the file has rows and a first name / last name column (prenom, nom, first_name, surname...)"
            }
            ErrorCategory::Reference => "Check that the reference first-name file was imported and is reachable",
            ErrorCategory::Ledger => "Check that the run ledger is available, then restart the run",
            ErrorCategory::Processing => "Restart the run; completed batches are reflected in the ledger",
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::EmptyInput => "Aucune donnée à traiter".to_string(),
            EtlError::ColumnDetectionError { found } => {
                format!("Colonnes non détectées. Colonnes trouvées: {}", found.join(", "))
            }
            EtlError::Cancelled { rows_processed, .. } => {
                format!("Traitement interrompu après {} lignes", rows_processed)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_detection_message_lists_fields() {
        let err = EtlError::ColumnDetectionError {
            found: vec!["id".to_string(), "value".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(
            err.user_friendly_message(),
            "Colonnes non détectées. Colonnes trouvées: id, value"
        );
    }

    #[test]
    fn test_cancellation_is_low_severity() {
        let err = EtlError::Cancelled {
            run_id: 3,
            rows_processed: 2000,
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.to_string().contains("2000"));
    }
}

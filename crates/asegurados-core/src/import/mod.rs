//! Import pipeline for roster backups.
//!
//! Two interchange formats are accepted:
//! - CSV with a `dni,apellido,nombre,estado` header (columns in any order)
//! - JSON: an array of person objects, as written by the JSON export
//!
//! Parsed records run through the normalizer and the required-field check
//! before they reach the store. A successful import replaces the whole
//! roster; a failed one changes nothing.

pub mod csv;
pub mod json;
pub mod upsert;

use thiserror::Error;

use crate::models::Person;

pub use self::csv::parse_csv;
pub use self::json::parse_json;
pub use self::upsert::{PersonDraft, UpsertOutcome, UpsertTarget, ValidationError};

/// Interchange format of an import payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Json,
}

impl ImportFormat {
    /// `.csv` files (any case) are CSV; everything else is treated as JSON.
    pub fn from_file_name(name: &str) -> Self {
        if name.to_lowercase().ends_with(".csv") {
            ImportFormat::Csv
        } else {
            ImportFormat::Json
        }
    }
}

/// Broad category of an import failure, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload parsed but a required column or field is missing.
    Validation,
    /// The payload is not the expected shape at all.
    Format,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("CSV must have a dni,apellido,nombre,estado header (missing {0})")]
    MissingColumn(&'static str),

    #[error("Record {record} is missing {field}")]
    MissingField { record: usize, field: &'static str },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid format: expected an array of records")]
    NotAnArray,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::MissingColumn(_) | ImportError::MissingField { .. } => ErrorKind::Validation,
            ImportError::InvalidFormat(_) | ImportError::NotAnArray => ErrorKind::Format,
        }
    }
}

/// Parse a payload in the given format into validated, normalized records.
pub fn parse(payload: &str, format: ImportFormat) -> Result<Vec<Person>, ImportError> {
    let records = match format {
        ImportFormat::Csv => parse_csv(payload)?,
        ImportFormat::Json => parse_json(payload)?,
    };
    ensure_required(&records)?;
    Ok(records)
}

/// Every record needs a DNI and both names. Record numbers in errors are 1-based.
fn ensure_required(records: &[Person]) -> Result<(), ImportError> {
    for (i, person) in records.iter().enumerate() {
        let missing = if person.id.is_empty() {
            Some("dni")
        } else if person.last_name.is_empty() {
            Some("apellido")
        } else if person.first_name.is_empty() {
            Some("nombre")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(ImportError::MissingField {
                record: i + 1,
                field,
            });
        }
    }
    Ok(())
}

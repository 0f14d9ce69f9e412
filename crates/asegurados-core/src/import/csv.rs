//! CSV import.
//!
//! Cells are split on every comma. There is no quoting or escaping, so a
//! value containing a comma shifts the rest of its row one column over.

use super::ImportError;
use crate::models::Person;
use crate::normalize::{normalize_id, normalize_status};

pub const DELIMITER: char = ',';

/// Header names, matched case-insensitively.
pub const ID_COLUMN: &str = "dni";
pub const LAST_NAME_COLUMN: &str = "apellido";
pub const FIRST_NAME_COLUMN: &str = "nombre";
pub const STATUS_COLUMN: &str = "estado";

/// Parse CSV text. Missing cells become empty strings (status: PAGO); the
/// required-field check happens afterwards in [`super::parse`].
pub fn parse_csv(payload: &str) -> Result<Vec<Person>, ImportError> {
    let payload = payload.trim_start_matches('\u{feff}').trim();
    let mut lines = payload.lines();

    let header: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .split(DELIMITER)
        .map(|token| token.trim().to_lowercase())
        .collect();
    let column = |name: &'static str| {
        header
            .iter()
            .position(|token| token == name)
            .ok_or(ImportError::MissingColumn(name))
    };

    let id_col = column(ID_COLUMN)?;
    let last_name_col = column(LAST_NAME_COLUMN)?;
    let first_name_col = column(FIRST_NAME_COLUMN)?;
    let status_col = column(STATUS_COLUMN)?;

    let mut records = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        let cell = |i: usize| cells.get(i).copied().unwrap_or_default();

        records.push(Person::new(
            normalize_id(cell(id_col)),
            cell(last_name_col),
            cell(first_name_col),
            normalize_status(cell(status_col)),
        ));
    }

    Ok(records)
}

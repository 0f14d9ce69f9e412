//! Single-record add/edit coming from the person form.

use thiserror::Error;

use crate::models::{PaymentStatus, Person};
use crate::normalize::{normalize_id, MIN_ID_DIGITS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DNI must have 7 or 8 digits (got {digits})")]
    InvalidId { digits: usize },

    #[error("Apellido is required")]
    MissingLastName,

    #[error("Nombre is required")]
    MissingFirstName,
}

/// Raw form input, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonDraft {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub status: PaymentStatus,
}

impl PersonDraft {
    /// Pre-fill the form from an existing record (edit).
    pub fn from_person(person: &Person) -> Self {
        Self {
            id: person.id.clone(),
            last_name: person.last_name.clone(),
            first_name: person.first_name.clone(),
            status: person.status,
        }
    }

    /// Normalize the DNI, trim the names, and check all three.
    pub fn validate(&self) -> Result<Person, ValidationError> {
        let id = normalize_id(&self.id);
        if id.len() < MIN_ID_DIGITS {
            return Err(ValidationError::InvalidId { digits: id.len() });
        }
        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            return Err(ValidationError::MissingLastName);
        }
        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            return Err(ValidationError::MissingFirstName);
        }
        Ok(Person::new(id, last_name, first_name, self.status))
    }
}

/// Where a form submission goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertTarget {
    /// Add a new record.
    New,
    /// Replace the record at this position.
    Existing(usize),
}

/// What an upsert did. Positions refer to the roster after the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added(usize),
    /// An add collided with an existing DNI and the user confirmed the overwrite.
    Replaced(usize),
    Updated(usize),
    /// The user declined the overwrite; nothing changed.
    Declined,
}

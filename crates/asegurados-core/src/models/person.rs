use serde::{Deserialize, Deserializer, Serialize};

use crate::normalize::normalize_status;
use crate::utils::contains_ignore_case;

/// Payment status of an insured person.
///
/// Serialized as the `PAGO` / `DEBE` tokens used by the interchange files.
/// Deserialization goes through [`normalize_status`], so anything that is not
/// `DEBE` (in any case) reads back as `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum PaymentStatus {
    #[default]
    #[serde(rename = "PAGO")]
    Paid,
    #[serde(rename = "DEBE")]
    Owing,
}

impl PaymentStatus {
    pub const PAID_TOKEN: &'static str = "PAGO";
    pub const OWING_TOKEN: &'static str = "DEBE";

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => Self::PAID_TOKEN,
            PaymentStatus::Owing => Self::OWING_TOKEN,
        }
    }

    /// The other status.
    pub fn toggled(&self) -> Self {
        match self {
            PaymentStatus::Paid => PaymentStatus::Owing,
            PaymentStatus::Owing => PaymentStatus::Paid,
        }
    }

    pub fn is_owing(&self) -> bool {
        matches!(self, PaymentStatus::Owing)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(normalize_status(&raw))
    }
}

/// One insured person.
///
/// Field names on the wire follow the stored backups: `dni`, `apellido`,
/// `nombre`, `estado`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Person {
    #[serde(rename = "dni")]
    pub id: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "estado")]
    pub status: PaymentStatus,
}

impl Person {
    pub fn new(
        id: impl Into<String>,
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id: id.into(),
            last_name: last_name.into(),
            first_name: first_name.into(),
            status,
        }
    }

    /// "Apellido, Nombre" for display.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    /// Case-insensitive substring match against DNI, first and last name.
    /// `query_lower` must already be lowercased.
    pub fn matches(&self, query_lower: &str) -> bool {
        contains_ignore_case(&self.id, query_lower)
            || contains_ignore_case(&self.first_name, query_lower)
            || contains_ignore_case(&self.last_name, query_lower)
    }
}

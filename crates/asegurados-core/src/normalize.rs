//! Canonical forms for the two fields that arrive in many shapes.
//!
//! DNIs are typed with dots, dashes or spaces and sometimes carry extra
//! leading digits; statuses come in any case. Both functions are total.

use crate::models::PaymentStatus;

/// Number of digits kept in a canonical DNI.
pub const ID_DIGITS: usize = 8;

/// Shortest DNI accepted from the add/edit form (legacy 7-digit numbers).
pub const MIN_ID_DIGITS: usize = 7;

/// Strip every non-digit and keep the last [`ID_DIGITS`] digits.
///
/// Shorter inputs keep all their digits; input without digits yields an
/// empty string, which higher-level validation rejects.
pub fn normalize_id(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(ID_DIGITS);
    digits[start..].iter().collect()
}

/// Map a raw status token onto [`PaymentStatus`].
///
/// `DEBE` in any case is `Owing`. Every other value, including empty or
/// unrecognized text, falls back to `Paid`; there is no error outcome.
pub fn normalize_status(raw: &str) -> PaymentStatus {
    if raw.eq_ignore_ascii_case(PaymentStatus::OWING_TOKEN) {
        PaymentStatus::Owing
    } else {
        PaymentStatus::Paid
    }
}

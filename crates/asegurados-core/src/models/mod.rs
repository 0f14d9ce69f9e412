//! Data models for the roster.
//!
//! - `Person`: one insured person with DNI, names and payment status
//! - `PaymentStatus`: the closed PAGO/DEBE enumeration

pub mod person;

pub use person::{PaymentStatus, Person};

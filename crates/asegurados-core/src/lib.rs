//! Core library for asegurados.
//!
//! A small roster of people and whether each one has paid or still owes,
//! kept in local storage and usable offline:
//!
//! - [`roster`]: the owned, write-through [`RecordStore`] plus bundled dataset access
//! - [`normalize`]: canonical DNI and payment status forms
//! - [`import`] / [`export`]: CSV and JSON interchange
//! - [`offline`]: the background worker that caches assets and the bundled dataset
//! - [`net`]: the fetch boundary shared by the store and the worker

pub mod config;
pub mod export;
pub mod import;
pub mod models;
pub mod net;
pub mod normalize;
pub mod offline;
pub mod roster;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use models::{PaymentStatus, Person};
pub use roster::{DatasetClient, RecordStore};

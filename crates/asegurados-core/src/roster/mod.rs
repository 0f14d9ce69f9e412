//! The roster: an owned, write-through record store.
//!
//! `RecordStore` holds the ordered list of people and persists the full list
//! after every mutation. When local storage is empty it bootstraps from the
//! bundled dataset through `DatasetClient`.

pub mod dataset;
pub mod error;
pub mod store;

pub use dataset::DatasetClient;
pub use error::RosterError;
pub use store::{RecordStore, STORAGE_KEY};

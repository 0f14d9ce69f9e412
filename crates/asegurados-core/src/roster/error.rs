use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("No record at position {index} (roster has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Bundled dataset is empty or invalid")]
    EmptyDataset,
}

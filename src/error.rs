//! Error type shared by both containers.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("An entry with the same key already exists: {0}")]
    DuplicateKey(String),

    #[error("The given key was not present: {0}")]
    KeyNotFound(String),

    #[error("Collection was modified; enumeration can not continue")]
    EnumerationInvalidated,

    #[error("Capacity {requested} exceeds the maximum of {max}")]
    CapacityOutOfRange { requested: usize, max: usize },
}

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    /// A block or canonical the operation needs does not exist.
    NotFound(String),
    /// The block is in the wrong REGULAR/LINKED state for the operation.
    InvalidState(String),
    /// A request the caller can correct: bad workspace id, bad placement.
    InvalidInput(String),
}

impl StoreError {
    /// Errors the caller caused and should see as an explicit failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::InvalidState(_) | StoreError::InvalidInput(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            StoreError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            StoreError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

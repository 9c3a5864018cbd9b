//! Error types for the tile store

use thiserror::Error;

/// Result type alias for tile store operations
pub type Result<T> = std::result::Result<T, TileStoreError>;

/// Tile store error types
#[derive(Error, Debug)]
pub enum TileStoreError {
    /// Operation requires an opened store
    #[error("tile store is not opened")]
    NotOpened,

    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Zoom level outside the representable 0..=31 range
    #[error("zoom level {0} out of range")]
    InvalidZoom(u8),

    /// A non-zero specification was used on a store without the column
    #[error("tile specification is not supported by this store")]
    SpecificationNotSupported,

    /// Schema migration failed; the store stays usable without the feature
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// Merging rows from another store failed and was rolled back
    #[error("merge from '{path}' failed: {reason}")]
    Merge { path: String, reason: String },
}

impl TileStoreError {
    /// Check if the error indicates a closed store rather than a data problem
    pub fn is_not_opened(&self) -> bool {
        matches!(self, TileStoreError::NotOpened)
    }
}

//! Error types surfaced at the index boundary.
//!
//! Validation and capacity errors fail the single operation and leave the
//! index untouched. Worker-thread failures during bulk insert are wrapped in
//! [`IndexError::Uncategorized`] and re-raised on the coordinating thread.
//! Persistence errors propagate from the underlying byte stream; a partial
//! load yields no index.

/// Error type for all fallible index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// An item's vector dimensionality does not match the index.
    #[error("item has {actual} dimensions, index expects {expected}")]
    DimensionMismatch {
        /// Dimensionality the index was built with.
        expected: usize,
        /// Dimensionality of the offending item.
        actual: usize,
    },

    /// The node store is full; the index must be resized before further inserts.
    #[error("index is full: {capacity} items")]
    SizeLimitExceeded {
        /// The configured maximum item count.
        capacity: usize,
    },

    /// A worker thread failed during a bulk insert.
    #[error("worker thread failed during bulk insert")]
    Uncategorized(#[source] Box<IndexError>),

    /// An I/O failure in the persistence layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted stream was written by an unknown format version.
    #[error("unsupported index format version: {0:#04x}")]
    UnsupportedVersion(u8),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

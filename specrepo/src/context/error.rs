//! Store error types
//!
//! Structured errors raised by a [`DataContext`](super::DataContext)
//! implementation. The repository passes them through unchanged, except for
//! [`StoreErrorKind::Concurrency`], which drives the save retry loop.
//!
//! # Example
//!
//! ```rust
//! use specrepo::context::{StoreError, StoreErrorKind};
//!
//! let error = StoreError::not_found("User", "usr_123");
//! assert!(matches!(error.kind, StoreErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

/// Store operation in flight when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Staging entities for insertion
    Add,
    /// Attaching entities as unchanged
    Attach,
    /// Staging entities as modified
    Update,
    /// Staging entities for deletion
    Remove,
    /// Primary key lookup
    Find,
    /// Executing a compiled query
    Fetch,
    /// Counting the rows of a compiled query
    Count,
    /// Persisting pending changes
    Save,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Attach => write!(f, "attach"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
            Self::Find => write!(f, "find"),
            Self::Fetch => write!(f, "fetch"),
            Self::Count => write!(f, "count"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Database constraint violation
    ConstraintViolation,
    /// The row changed since it was read (optimistic concurrency)
    Concurrency,
    /// Failed to connect to the store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying database error
    DatabaseError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured store error with operation context
///
/// # Example
///
/// ```rust
/// use specrepo::context::StoreError;
///
/// let error = StoreError::not_found("User", "usr_abc123");
/// assert_eq!(
///     error.to_string(),
///     "Store not_found error during find: Entity not found [User: usr_abc123]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StoreErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved
    pub entity_type: Option<String>,
    /// The key of the entity involved
    pub entity_id: Option<String>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(operation: StoreOperation, kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(StoreOperation::Find, StoreErrorKind::NotFound, "Entity not found")
            .with_entity(entity_type, entity_id)
    }

    /// Create an "already exists" error with entity context
    pub fn already_exists(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Save,
            StoreErrorKind::AlreadyExists,
            "Entity already exists",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create an optimistic concurrency conflict
    ///
    /// # Example
    ///
    /// ```rust
    /// use specrepo::context::{StoreError, StoreOperation};
    ///
    /// let error = StoreError::concurrency(StoreOperation::Save, "row version changed")
    ///     .with_entity("Order", "ord_456");
    /// assert!(error.is_concurrency_conflict());
    /// ```
    pub fn concurrency(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Concurrency, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::ConstraintViolation, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::ConnectionFailed, message)
    }

    /// Create a timeout error
    pub fn timeout(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::DatabaseError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: StoreOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether the save loop should retry after this error
    pub fn is_concurrency_conflict(&self) -> bool {
        self.kind == StoreErrorKind::Concurrency
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match &err {
            E::RowNotFound => Self::new(StoreOperation::Fetch, StoreErrorKind::NotFound, err.to_string()),
            E::PoolTimedOut => Self::timeout(StoreOperation::Fetch, err.to_string()),
            E::Io(_) | E::Tls(_) | E::PoolClosed => {
                Self::connection_failed(StoreOperation::Fetch, err.to_string())
            }
            E::Database(db_err) => {
                let kind = if db_err.is_unique_violation() {
                    StoreErrorKind::AlreadyExists
                } else if db_err.is_foreign_key_violation() || db_err.is_check_violation() {
                    StoreErrorKind::ConstraintViolation
                } else if db_err.code().as_deref() == Some("40001") {
                    // serialization_failure
                    StoreErrorKind::Concurrency
                } else {
                    StoreErrorKind::DatabaseError
                };
                Self::new(StoreOperation::Save, kind, db_err.message())
            }
            _ => Self::database_error(StoreOperation::Fetch, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_operation_display() {
        assert_eq!(format!("{}", StoreOperation::Add), "add");
        assert_eq!(format!("{}", StoreOperation::Fetch), "fetch");
        assert_eq!(format!("{}", StoreOperation::Save), "save");
    }

    #[test]
    fn test_store_error_kind_display() {
        assert_eq!(format!("{}", StoreErrorKind::Concurrency), "concurrency");
        assert_eq!(format!("{}", StoreErrorKind::AlreadyExists), "already_exists");
    }

    #[test]
    fn test_display_without_entity_context() {
        let error = StoreError::timeout(StoreOperation::Count, "Query timed out after 30s");
        assert_eq!(
            error.to_string(),
            "Store timeout error during count: Query timed out after 30s"
        );
    }

    #[test]
    fn test_display_with_entity_context() {
        let error = StoreError::already_exists("Item", "7");
        assert_eq!(
            error.to_string(),
            "Store already_exists error during save: Entity already exists [Item: 7]"
        );
    }

    #[test]
    fn test_only_concurrency_is_a_conflict() {
        assert!(StoreError::concurrency(StoreOperation::Save, "stale").is_concurrency_conflict());
        assert!(!StoreError::timeout(StoreOperation::Save, "slow").is_concurrency_conflict());
        assert!(!StoreError::not_found("Item", "1").is_concurrency_conflict());
    }

    #[test]
    fn test_with_operation_overrides() {
        let error = StoreError::connection_failed(StoreOperation::Fetch, "refused")
            .with_operation(StoreOperation::Save);
        assert_eq!(error.operation, StoreOperation::Save);
    }
}

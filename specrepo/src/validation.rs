//! Pre-save validation
//!
//! Before a save touches the store, every Added or Modified entry is run
//! through a [`ValidationProvider`]. Failures are collected per entity and
//! returned together as [`ValidationErrors`].

use std::fmt;

use serde::Serialize;

use crate::context::{DataContext, EntityState, Record};

/// A single failed field rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    /// Field name
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldFailure {
    /// Create a failure
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Failure for a missing or blank required field
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("The {} field is required.", field);
        Self { field, message }
    }

    /// Failure for a string longer than `max` characters
    pub fn max_length(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        let message = format!(
            "The field {} must be a string with a maximum length of {}.",
            field, max
        );
        Self { field, message }
    }
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Failures of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityValidation {
    /// Entity name
    pub entity: &'static str,
    /// Primary key, formatted
    pub key: String,
    /// Failed rules
    pub failures: Vec<FieldFailure>,
}

/// Validation failures of every pending entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    entries: Vec<EntityValidation>,
}

impl ValidationErrors {
    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of failing entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Per-entity failures
    pub fn entries(&self) -> &[EntityValidation] {
        &self.entries
    }

    /// Failures recorded for a field of any entity
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldFailure> + 'a {
        self.entries
            .iter()
            .flat_map(|e| e.failures.iter())
            .filter(move |f| f.field == field)
    }

    fn push(&mut self, entity: &'static str, key: String, failures: Vec<FieldFailure>) {
        self.entries.push(EntityValidation {
            entity,
            key,
            failures,
        });
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} {}: ", entry.entity, entry.key)?;
            for (j, failure) in entry.failures.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", failure)?;
            }
        }
        Ok(())
    }
}

/// Validates a single entity
pub trait ValidationProvider: Send + Sync {
    /// Field-level failures, empty when valid
    fn validate(&self, record: &dyn Record) -> Vec<FieldFailure>;
}

/// Default provider delegating to [`Record::validate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl ValidationProvider for RecordValidator {
    fn validate(&self, record: &dyn Record) -> Vec<FieldFailure> {
        record.validate()
    }
}

/// Validate every Added or Modified entry of a context
pub fn validate_pending<C: DataContext + ?Sized>(
    context: &C,
    provider: &dyn ValidationProvider,
) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    context.for_each_entry(&mut |entry| {
        if !matches!(entry.state(), EntityState::Added | EntityState::Modified) {
            return;
        }
        let failures = provider.validate(entry.record());
        if !failures.is_empty() {
            errors.push(entry.entity_name(), entry.key(), failures);
        }
    });
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Item;

    #[test]
    fn test_record_validator_delegates() {
        let valid = Item::new(1, "widget", 5);
        let invalid = Item::new(2, "", -1);

        assert!(RecordValidator.validate(&valid).is_empty());
        let failures = RecordValidator.validate(&invalid);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], FieldFailure::required("name"));
    }

    #[test]
    fn test_errors_display_and_lookup() {
        let mut errors = ValidationErrors::default();
        errors.push("Item", "2".into(), vec![FieldFailure::new("price", "must be positive")]);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.to_string(), "Item 2: price: must be positive");
        assert_eq!(errors.for_field("price").count(), 1);
        assert_eq!(errors.for_field("name").count(), 0);
    }

    #[test]
    fn test_errors_serialize() {
        let mut errors = ValidationErrors::default();
        errors.push("Item", "3".into(), vec![FieldFailure::max_length("name", 5)]);
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["entries"][0]["entity"], "Item");
        assert_eq!(json["entries"][0]["failures"][0]["field"], "name");
    }
}

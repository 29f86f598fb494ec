//! Entity fixtures shared by the unit tests

use chrono::{DateTime, Utc};

use crate::audit::{CreatedAudit, SoftDeletable, UpdatedAudit};
use crate::context::{Entity, Record};
use crate::specification::Value;
use crate::validation::FieldFailure;

/// Plain entity with validation rules
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub owner: Option<String>,
}

impl Item {
    pub fn new(id: i64, name: &str, price: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            price,
            owner: None,
        }
    }
}

impl Record for Item {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "price" => Some(self.price.into()),
            "owner" => Some(self.owner.clone().into()),
            _ => None,
        }
    }

    fn validate(&self) -> Vec<FieldFailure> {
        let mut failures = Vec::new();
        if self.name.trim().is_empty() {
            failures.push(FieldFailure::required("name"));
        }
        if self.price < 0 {
            failures.push(FieldFailure::new("price", "must not be negative"));
        }
        failures
    }
}

impl Entity for Item {
    type Key = i64;
    const NAME: &'static str = "Item";

    fn key(&self) -> i64 {
        self.id
    }
}

/// Audited, soft-deletable entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub created_by: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub updated_on: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_on: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl CreatedAudit for Document {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn created_on(&self) -> Option<DateTime<Utc>> {
        self.created_on
    }

    fn stamp_created(&mut self, by: &str, on: DateTime<Utc>) {
        self.created_by = Some(by.to_string());
        self.created_on = Some(on);
    }
}

impl UpdatedAudit for Document {
    fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    fn updated_on(&self) -> Option<DateTime<Utc>> {
        self.updated_on
    }

    fn stamp_updated(&mut self, by: &str, on: DateTime<Utc>) {
        self.updated_by = Some(by.to_string());
        self.updated_on = Some(on);
    }
}

impl SoftDeletable for Document {
    fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }

    fn deleted_on(&self) -> Option<DateTime<Utc>> {
        self.deleted_on
    }

    fn mark_deleted(&mut self, by: &str, on: DateTime<Utc>) {
        self.deleted_by = Some(by.to_string());
        self.deleted_on = Some(on);
    }

    fn restore(&mut self) {
        self.deleted_by = None;
        self.deleted_on = None;
    }
}

impl Record for Document {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "title" => Some(self.title.as_str().into()),
            "deleted_on" => Some(self.deleted_on.into()),
            _ => None,
        }
    }

    fn as_created_mut(&mut self) -> Option<&mut dyn CreatedAudit> {
        Some(self)
    }

    fn as_updated_mut(&mut self) -> Option<&mut dyn UpdatedAudit> {
        Some(self)
    }

    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        Some(self)
    }

    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl Entity for Document {
    type Key = i64;
    const NAME: &'static str = "Document";

    fn key(&self) -> i64 {
        self.id
    }
}

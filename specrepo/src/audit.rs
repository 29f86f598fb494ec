//! Audit stamping and soft delete
//!
//! Entities opt into auditing by implementing [`CreatedAudit`],
//! [`UpdatedAudit`] and/or [`SoftDeletable`] and exposing them through the
//! [`Record`](crate::context::Record) capability accessors.
//!
//! [`StateActions`] is the ordered `state → action` map the repository runs
//! over pending entries after validation and before persistence. The stock
//! map built by [`StateActions::stamping`] does three things:
//!
//! - Added entries get their creation stamp
//! - Modified entries get their modification stamp
//! - Deleted entries of soft-deletable entities get their deletion stamp
//!   and are switched back to Modified, so the row is updated, not removed

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{DataContext, EntityState, TrackedEntry};

/// Creation stamp
pub trait CreatedAudit {
    /// Who created the entity
    fn created_by(&self) -> Option<&str>;
    /// When it was created
    fn created_on(&self) -> Option<DateTime<Utc>>;
    /// Record creation
    fn stamp_created(&mut self, by: &str, on: DateTime<Utc>);
}

/// Modification stamp
pub trait UpdatedAudit {
    /// Who last modified the entity
    fn updated_by(&self) -> Option<&str>;
    /// When it was last modified
    fn updated_on(&self) -> Option<DateTime<Utc>>;
    /// Record a modification
    fn stamp_updated(&mut self, by: &str, on: DateTime<Utc>);
}

/// Soft-delete fields
pub trait SoftDeletable {
    /// Who deleted the entity
    fn deleted_by(&self) -> Option<&str>;
    /// When it was deleted
    fn deleted_on(&self) -> Option<DateTime<Utc>>;
    /// Record a deletion
    fn mark_deleted(&mut self, by: &str, on: DateTime<Utc>);
    /// Clear the deletion fields
    fn restore(&mut self);

    /// Whether the entity is soft-deleted
    fn is_deleted(&self) -> bool {
        self.deleted_on().is_some()
    }
}

/// Audit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Run the stamping actions on save
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// User recorded in the stamps
    #[serde(default = "default_user")]
    pub user: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            user: default_user(),
        }
    }
}

fn default_enabled() -> bool {
    false
}

fn default_user() -> String {
    "system".to_string()
}

/// Callback run for a tracked entry in a given state
pub type StateAction = Arc<dyn Fn(&mut dyn TrackedEntry) + Send + Sync>;

/// Ordered map of entity state to action
///
/// Actions are run grouped by state in declaration order: every entry in the
/// first declared state is visited, then the second, and so on. An action
/// that moves an entry to a state whose group already ran does not trigger
/// that group again.
#[derive(Clone, Default)]
pub struct StateActions {
    actions: Vec<(EntityState, StateAction)>,
}

impl StateActions {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action for a state
    #[must_use]
    pub fn on<F>(mut self, state: EntityState, action: F) -> Self
    where
        F: Fn(&mut dyn TrackedEntry) + Send + Sync + 'static,
    {
        self.actions.push((state, Arc::new(action)));
        self
    }

    /// Stock audit map stamping as `user`
    pub fn stamping(user: impl Into<String>) -> Self {
        let user: Arc<str> = Arc::from(user.into());
        let created_by = Arc::clone(&user);
        let updated_by = Arc::clone(&user);
        let deleted_by = user;

        Self::new()
            .on(EntityState::Added, move |entry| {
                if let Some(audit) = entry.record_mut().as_created_mut() {
                    audit.stamp_created(&created_by, Utc::now());
                }
            })
            .on(EntityState::Modified, move |entry| {
                if let Some(audit) = entry.record_mut().as_updated_mut() {
                    audit.stamp_updated(&updated_by, Utc::now());
                }
            })
            .on(EntityState::Deleted, move |entry| {
                let soft_deleted = match entry.record_mut().as_soft_deletable_mut() {
                    Some(soft) => {
                        soft.mark_deleted(&deleted_by, Utc::now());
                        true
                    }
                    None => false,
                };
                if soft_deleted {
                    entry.set_state(EntityState::Modified);
                }
            })
    }

    /// Map described by the audit settings; empty when auditing is off
    pub fn from_config(config: &AuditConfig) -> Self {
        if config.enabled {
            Self::stamping(config.user.clone())
        } else {
            Self::new()
        }
    }

    /// Number of declared actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no action is declared
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action over the context's pending entries
    pub fn apply<C: DataContext + ?Sized>(&self, context: &C) {
        for (state, action) in &self.actions {
            context.for_each_entry(&mut |entry| {
                if entry.state() == *state {
                    action(entry);
                }
            });
        }
    }
}

impl fmt::Debug for StateActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|(state, _)| state))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::memory::{MemoryContext, MemoryStore};
    use crate::testing::{Document, Item};

    type Log = Arc<Mutex<Vec<(EntityState, String)>>>;

    /// Context with one entry in each pending state plus an attached one
    async fn mixed_context() -> MemoryContext {
        let store = MemoryStore::new();
        store
            .seed(vec![
                Document::new(2, "published"),
                Document::new(3, "stale"),
                Document::new(4, "pinned"),
            ])
            .unwrap();
        store.seed(vec![Item::new(9, "widget", 5)]).unwrap();

        let ctx = MemoryContext::new(store);
        ctx.add(vec![Document::new(1, "draft")]).await.unwrap();
        ctx.update(vec![Document::new(2, "revised")]).unwrap();
        ctx.remove(vec![Document::new(3, "stale")]).unwrap();
        ctx.attach(vec![Document::new(4, "pinned")]).unwrap();
        ctx.add(vec![Document::new(5, "second draft")]).await.unwrap();
        ctx.remove(vec![Item::new(9, "widget", 5)]).unwrap();
        ctx
    }

    fn recorder(log: Log, state: EntityState) -> impl Fn(&mut dyn TrackedEntry) + Send + Sync {
        move |entry| log.lock().unwrap().push((state, entry.key()))
    }

    fn document(ctx: &MemoryContext, id: i64) -> Document {
        ctx.local::<Document>()
            .into_iter()
            .find(|doc| doc.id == id)
            .unwrap()
    }

    #[test]
    fn test_config_defaults_to_disabled() {
        let config = AuditConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.user, "system");
        assert!(StateActions::from_config(&config).is_empty());
    }

    #[test]
    fn test_stamping_declares_three_states() {
        let actions = StateActions::from_config(&AuditConfig {
            enabled: true,
            user: "alice".into(),
        });
        assert_eq!(actions.len(), 3);
        assert_eq!(format!("{:?}", actions), "[Added, Modified, Deleted]");
    }

    #[tokio::test]
    async fn test_apply_visits_entries_grouped_by_declared_state() {
        let ctx = mixed_context().await;
        let log: Log = Arc::default();
        let actions = StateActions::new()
            .on(EntityState::Deleted, recorder(Arc::clone(&log), EntityState::Deleted))
            .on(EntityState::Added, recorder(Arc::clone(&log), EntityState::Added))
            .on(EntityState::Modified, recorder(Arc::clone(&log), EntityState::Modified));

        actions.apply(&ctx);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (EntityState::Deleted, "3".to_string()),
                (EntityState::Deleted, "9".to_string()),
                (EntityState::Added, "1".to_string()),
                (EntityState::Added, "5".to_string()),
                (EntityState::Modified, "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_state_change_does_not_rerun_an_earlier_group() {
        let ctx = mixed_context().await;
        let log: Log = Arc::default();
        let actions = StateActions::new()
            .on(EntityState::Modified, recorder(Arc::clone(&log), EntityState::Modified))
            .on(EntityState::Deleted, |entry| entry.set_state(EntityState::Modified))
            .on(EntityState::Modified, recorder(Arc::clone(&log), EntityState::Modified));

        actions.apply(&ctx);

        // the second Modified action sees the redirected entries, the first does not
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (EntityState::Modified, "2".to_string()),
                (EntityState::Modified, "2".to_string()),
                (EntityState::Modified, "3".to_string()),
                (EntityState::Modified, "9".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stamping_over_mixed_states() {
        let ctx = mixed_context().await;
        StateActions::stamping("alice").apply(&ctx);

        let draft = document(&ctx, 1);
        assert_eq!(draft.created_by.as_deref(), Some("alice"));
        assert!(draft.created_on.is_some());
        assert!(draft.updated_by.is_none());
        assert_eq!(document(&ctx, 5).created_by.as_deref(), Some("alice"));

        let revised = document(&ctx, 2);
        assert_eq!(revised.updated_by.as_deref(), Some("alice"));
        assert!(revised.updated_on.is_some());
        assert!(revised.created_by.is_none());

        let pinned = document(&ctx, 4);
        assert_eq!(pinned, Document::new(4, "pinned"));
        assert_eq!(ctx.entry_state::<Document>(&4), EntityState::Unchanged);
    }

    #[tokio::test]
    async fn test_soft_delete_redirects_to_modified_without_update_stamp() {
        let ctx = mixed_context().await;
        StateActions::stamping("bob").apply(&ctx);

        assert_eq!(ctx.entry_state::<Document>(&3), EntityState::Modified);
        let stale = document(&ctx, 3);
        assert_eq!(stale.deleted_by.as_deref(), Some("bob"));
        assert!(stale.deleted_on.is_some());
        assert!(stale.updated_by.is_none());
        assert!(stale.updated_on.is_none());
    }

    #[tokio::test]
    async fn test_hard_delete_is_left_alone() {
        let ctx = mixed_context().await;
        StateActions::stamping("bob").apply(&ctx);
        assert_eq!(ctx.entry_state::<Item>(&9), EntityState::Deleted);
    }

    #[tokio::test]
    async fn test_custom_actions_run_in_declaration_order() {
        let ctx = MemoryContext::new(MemoryStore::new());
        ctx.update(vec![Item::new(1, "widget", 5)]).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);
        StateActions::new()
            .on(EntityState::Modified, move |_| first.lock().unwrap().push("first"))
            .on(EntityState::Modified, move |_| second.lock().unwrap().push("second"))
            .apply(&ctx);

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}

//! Mirrored entity values and their persistent-state records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity value of a persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// An entity instance as seen by the persistence layer.
///
/// Within one unit of work an entity is identified by reference, not by value:
/// two `EntityRef`s name the same instance only if they point to the same allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Mapped entity name (e.g., "Parent", "Child")
    pub entity_name: String,
    /// Identity, if the in-memory instance carries one
    pub id: Option<EntityId>,
    /// Mapped property values
    pub state: serde_json::Value,
}

/// Shared handle to an entity instance.
pub type EntityRef = Arc<Entity>;

impl Entity {
    /// Create an entity that has not been assigned an identity yet.
    pub fn new(entity_name: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: None,
            state,
        }
    }

    /// Set the identity.
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> EntityRef {
        Arc::new(self)
    }
}

/// Lifecycle status of an entity inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Managed,
    Saving,
    Deleted,
    ReadOnly,
}

/// Persistent-state record the unit of work keeps for a managed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_name: String,
    pub id: Option<EntityId>,
    pub status: EntryStatus,
}

impl EntityEntry {
    pub fn managed(entity_name: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: Some(id.into()),
            status: EntryStatus::Managed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_id_conversions() {
        assert_eq!(EntityId::from(42).as_str(), "42");
        assert_eq!(EntityId::from("abc").to_string(), "abc");
        assert_eq!(
            serde_json::to_string(&EntityId::new("7")).unwrap(),
            "\"7\""
        );
    }

    #[test]
    fn test_entity_reference_identity() {
        let a = Entity::new("Parent", json!({"value": "v"})).into_ref();
        let b = Entity::new("Parent", json!({"value": "v"})).into_ref();

        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &a.clone()));
    }
}

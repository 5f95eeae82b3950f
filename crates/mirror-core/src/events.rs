//! Payloads the persistence layer dispatches to registered listeners.
//!
//! - `EntityEvent` - an entity was inserted, updated or deleted
//! - `CollectionEvent` - an owned collection was recreated, updated or removed
//! - `PersistenceContext` - the unit of work the event originated from

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::EventCategory;
use crate::entity::{EntityEntry, EntityId, EntityRef};
use crate::listener::DeferredInsert;

// ============================================================================
// Unit of work
// ============================================================================

/// View of the unit of work (session) an event was dispatched from.
pub trait PersistenceContext: Send + Sync {
    /// Persistent-state entry of a managed entity, looked up by reference.
    fn entry(&self, entity: &EntityRef) -> Option<EntityEntry>;

    /// Depth of cascaded saves currently in progress. Zero when no cascade is running.
    fn cascade_level(&self) -> usize {
        0
    }

    /// Mark the collections of `entity` as processed so the flush does not treat
    /// collections materialized while mirroring as dirty.
    fn mark_collections_processed(&self, _entity: &EntityRef) {}

    /// Hold `insert` until the running cascade completes.
    ///
    /// Returns `false` when this context cannot hold inserts back; the listener then
    /// forwards the insert at once.
    fn defer_insert(&self, _insert: DeferredInsert) -> bool {
        false
    }
}

/// Shared handle to the originating unit of work.
pub type SessionRef = Arc<dyn PersistenceContext>;

/// A context with no managed entities, for events raised outside any unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedContext;

impl PersistenceContext for DetachedContext {
    fn entry(&self, _entity: &EntityRef) -> Option<EntityEntry> {
        None
    }
}

impl DetachedContext {
    pub fn shared() -> SessionRef {
        Arc::new(DetachedContext)
    }
}

// ============================================================================
// Entity events
// ============================================================================

/// Insert, update or delete of a single entity.
#[derive(Clone)]
pub struct EntityEvent {
    /// The affected entity
    pub entity: EntityRef,
    /// Identity as known to the persistence layer (may be generated)
    pub id: Option<EntityId>,
    /// The unit of work that produced the event
    pub session: SessionRef,
}

impl EntityEvent {
    pub fn new(entity: EntityRef, session: SessionRef) -> Self {
        let id = entity.id.clone();
        Self {
            entity,
            id,
            session,
        }
    }

    /// Override the identity carried by the event.
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl std::fmt::Debug for EntityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEvent")
            .field("entity", &self.entity.entity_name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Collection events
// ============================================================================

/// Kind of owned-collection mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionEventKind {
    Recreate,
    Update,
    Remove,
}

impl CollectionEventKind {
    /// Category this kind of event is dispatched on.
    pub fn category(&self) -> EventCategory {
        match self {
            CollectionEventKind::Recreate => EventCategory::PostCollectionRecreate,
            CollectionEventKind::Update => EventCategory::PostCollectionUpdate,
            CollectionEventKind::Remove => EventCategory::PostCollectionRemove,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionEventKind::Recreate => "recreate",
            CollectionEventKind::Update => "update",
            CollectionEventKind::Remove => "remove",
        }
    }
}

impl std::fmt::Display for CollectionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutation of a collection owned by an entity.
///
/// The dispatch layer cannot always determine the owner (detached instances,
/// property-ref mappings), so both the owner and its identity are optional.
#[derive(Clone)]
pub struct CollectionEvent {
    pub kind: CollectionEventKind,
    /// Collection role, e.g. "Parent.childs"
    pub role: String,
    pub affected_owner: Option<EntityRef>,
    pub affected_owner_id: Option<EntityId>,
    pub affected_owner_entity_name: Option<String>,
    pub session: SessionRef,
}

impl CollectionEvent {
    /// Create an event with the owner and its identity taken from the owner instance.
    pub fn new(
        kind: CollectionEventKind,
        role: impl Into<String>,
        owner: Option<EntityRef>,
        session: SessionRef,
    ) -> Self {
        let affected_owner_id = owner.as_ref().and_then(|o| o.id.clone());
        let affected_owner_entity_name = owner.as_ref().map(|o| o.entity_name.clone());
        Self {
            kind,
            role: role.into(),
            affected_owner: owner,
            affected_owner_id,
            affected_owner_entity_name,
            session,
        }
    }

    /// Drop the owner identity from the payload.
    pub fn without_owner_id(mut self) -> Self {
        self.affected_owner_id = None;
        self
    }

    /// Name of the owning entity type, from the payload or the owner instance.
    pub fn owner_entity_name(&self) -> Option<&str> {
        self.affected_owner_entity_name
            .as_deref()
            .or_else(|| self.affected_owner.as_ref().map(|o| o.entity_name.as_str()))
    }
}

impl std::fmt::Debug for CollectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEvent")
            .field("kind", &self.kind)
            .field("role", &self.role)
            .field("owner", &self.owner_entity_name())
            .field("owner_id", &self.affected_owner_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use serde_json::json;

    #[test]
    fn test_collection_event_takes_owner_identity() {
        let owner = Entity::new("Parent", json!({})).with_id(42).into_ref();
        let event = CollectionEvent::new(
            CollectionEventKind::Update,
            "Parent.childs",
            Some(owner),
            DetachedContext::shared(),
        );

        assert_eq!(event.affected_owner_id, Some(EntityId::from(42)));
        assert_eq!(event.owner_entity_name(), Some("Parent"));
        assert!(event.without_owner_id().affected_owner_id.is_none());
    }

    #[test]
    fn test_collection_kind_categories() {
        assert_eq!(
            CollectionEventKind::Recreate.category(),
            EventCategory::PostCollectionRecreate
        );
        assert!(CollectionEventKind::Remove.category().is_collection());
    }
}

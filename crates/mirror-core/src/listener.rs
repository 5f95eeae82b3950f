//! Listener trait and the bridge's own mirror listener.
//!
//! Listeners declare their capabilities up front; the injector and the dispatcher
//! consult that declaration instead of probing listener types. Every listener also
//! carries a stable [`ListenerKind`] tag, which is what removal filters on.

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::category::Capability;
use crate::entity::{Entity, EntityId, EntityRef};
use crate::error::{ListenerError, MirrorError};
use crate::events::{CollectionEvent, EntityEvent, PersistenceContext, SessionRef};
use crate::mirror::{DeviceContext, MirrorOp};

// ============================================================================
// Listener trait
// ============================================================================

/// Variant of the bridge's own listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorKind {
    /// Handles insert/update/delete only
    Entity,
    /// Handles insert/update/delete and the three collection mutations
    Collection,
}

/// Stable type tag of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Installed by this bridge
    Mirror(MirrorKind),
    /// Installed by another subsystem, tagged with its own name
    Foreign(&'static str),
}

impl ListenerKind {
    /// Returns `true` for listeners installed by this bridge, whatever their variant.
    pub fn is_mirror(&self) -> bool {
        matches!(self, ListenerKind::Mirror(_))
    }
}

/// Handler of dispatched lifecycle events.
///
/// Callbacks run synchronously on the thread performing the unit of work. An error
/// from an immediate-mode callback aborts the triggering flush.
pub trait EventListener: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Type tag used to find this listener again on removal.
    fn kind(&self) -> ListenerKind;

    /// Callbacks this listener implements.
    fn capabilities(&self) -> &[Capability];

    fn handles(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn on_post_insert(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_post_update(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_post_delete(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_post_recreate_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_post_update_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_post_remove_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        Ok(())
    }
}

// ============================================================================
// Owner resolution
// ============================================================================

/// Result of resolving the owning entity of a collection event.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerResolution {
    /// The event does not carry its owner.
    OwnerUnresolved,
    /// The owner is known but neither the event nor the unit of work yields its identity.
    IdentityUnresolved { entity_name: String },
    /// Owner and identity are both known.
    Resolved { owner: EntityRef, id: EntityId },
}

/// Resolve the owner of a collection event and its identity.
///
/// The identity comes from the event payload, falling back to the persistent-state
/// entry the originating unit of work holds for the owner.
pub fn resolve_owner(event: &CollectionEvent) -> OwnerResolution {
    let Some(owner) = &event.affected_owner else {
        return OwnerResolution::OwnerUnresolved;
    };

    let id = event
        .affected_owner_id
        .clone()
        .or_else(|| event.session.entry(owner).and_then(|entry| entry.id));

    match id {
        Some(id) => OwnerResolution::Resolved {
            owner: owner.clone(),
            id,
        },
        None => OwnerResolution::IdentityUnresolved {
            entity_name: event
                .owner_entity_name()
                .unwrap_or(&owner.entity_name)
                .to_string(),
        },
    }
}

/// Terminal state of one collection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// No owner; dropped silently.
    Dropped,
    /// Owner without identity; dropped after a warning.
    DroppedWithWarning,
    /// Owner forwarded to the sink as an update.
    Forwarded,
}

// ============================================================================
// Mirror listener
// ============================================================================

/// The bridge's listener: forwards dispatched events to the device's sink.
///
/// One instance is created per `inject` call.
pub struct MirrorListener {
    id: Uuid,
    kind: MirrorKind,
    name: String,
    device: DeviceContext,
}

impl MirrorListener {
    pub fn new(kind: MirrorKind, device: DeviceContext) -> Self {
        let name = match kind {
            MirrorKind::Entity => format!("mirror:{}", device.name()),
            MirrorKind::Collection => format!("mirror-collection:{}", device.name()),
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            name,
            device,
        }
    }

    /// Listener for insert/update/delete.
    pub fn entity(device: DeviceContext) -> Self {
        Self::new(MirrorKind::Entity, device)
    }

    /// Listener for insert/update/delete and owned-collection mutations.
    pub fn collection(device: DeviceContext) -> Self {
        Self::new(MirrorKind::Collection, device)
    }

    /// Unique id of this instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mirror_kind(&self) -> MirrorKind {
        self.kind
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Handle one collection event, returning its terminal state.
    ///
    /// Recreate, update and remove are handled identically: any mutation of an owned
    /// collection invalidates the owner's mirrored representation.
    pub fn process_collection_event(
        &self,
        event: &CollectionEvent,
    ) -> Result<CollectionOutcome, ListenerError> {
        match resolve_owner(event) {
            OwnerResolution::OwnerUnresolved => {
                trace!(
                    role = %event.role,
                    kind = %event.kind,
                    "Collection event without owner, skipping"
                );
                Ok(CollectionOutcome::Dropped)
            }
            OwnerResolution::IdentityUnresolved { entity_name } => {
                warn!(
                    entity = %entity_name,
                    "Unable to reindex entity on collection change, id cannot be extracted"
                );
                Ok(CollectionOutcome::DroppedWithWarning)
            }
            OwnerResolution::Resolved { owner, id } => {
                debug!(
                    device = %self.device.name(),
                    entity = %owner.entity_name,
                    id = %id,
                    kind = %event.kind,
                    "Reindexing owner on collection change"
                );
                self.forward(MirrorOp::Update, &owner, &event.session)?;
                Ok(CollectionOutcome::Forwarded)
            }
        }
    }

    fn forward(
        &self,
        op: MirrorOp,
        entity: &EntityRef,
        session: &SessionRef,
    ) -> Result<(), MirrorError> {
        let settings = self.device.settings();

        if op == MirrorOp::Persist && settings.pending_cascades && session.cascade_level() > 0 {
            let deferred = DeferredInsert {
                device: self.device.clone(),
                entity: entity.clone(),
            };
            if session.defer_insert(deferred) {
                debug!(
                    device = %self.device.name(),
                    entity = %entity.entity_name,
                    cascade_level = session.cascade_level(),
                    "Deferring insert until cascade completes"
                );
                return Ok(());
            }
        }

        let sink = self.device.sink();
        match op {
            MirrorOp::Persist => sink.post_persist(entity)?,
            MirrorOp::Update => sink.post_update(entity)?,
            MirrorOp::Remove => sink.post_remove(entity)?,
        }

        if settings.process_collection && op != MirrorOp::Remove {
            session.mark_collections_processed(entity);
        }
        Ok(())
    }

    /// The inserted entity, carrying the generated identity when configured to.
    fn inserted_entity(&self, event: &EntityEvent) -> EntityRef {
        if !self.device.settings().marshal_ids || event.entity.id.is_some() {
            return event.entity.clone();
        }
        match &event.id {
            Some(id) => {
                trace!(entity = %event.entity.entity_name, id = %id, "Marshalling generated id");
                Entity {
                    id: Some(id.clone()),
                    ..(*event.entity).clone()
                }
                .into_ref()
            }
            None => event.entity.clone(),
        }
    }
}

impl EventListener for MirrorListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ListenerKind {
        ListenerKind::Mirror(self.kind)
    }

    fn capabilities(&self) -> &[Capability] {
        match self.kind {
            MirrorKind::Entity => &Capability::ENTITY,
            MirrorKind::Collection => &Capability::ENTITY_AND_COLLECTION,
        }
    }

    fn on_post_insert(&self, event: &EntityEvent) -> Result<(), ListenerError> {
        let entity = self.inserted_entity(event);
        Ok(self.forward(MirrorOp::Persist, &entity, &event.session)?)
    }

    fn on_post_update(&self, event: &EntityEvent) -> Result<(), ListenerError> {
        Ok(self.forward(MirrorOp::Update, &event.entity, &event.session)?)
    }

    fn on_post_delete(&self, event: &EntityEvent) -> Result<(), ListenerError> {
        Ok(self.forward(MirrorOp::Remove, &event.entity, &event.session)?)
    }

    fn on_post_recreate_collection(&self, event: &CollectionEvent) -> Result<(), ListenerError> {
        if !self.handles(Capability::CollectionRecreate) {
            return Ok(());
        }
        self.process_collection_event(event).map(|_| ())
    }

    fn on_post_update_collection(&self, event: &CollectionEvent) -> Result<(), ListenerError> {
        if !self.handles(Capability::CollectionUpdate) {
            return Ok(());
        }
        self.process_collection_event(event).map(|_| ())
    }

    fn on_post_remove_collection(&self, event: &CollectionEvent) -> Result<(), ListenerError> {
        if !self.handles(Capability::CollectionRemove) {
            return Ok(());
        }
        self.process_collection_event(event).map(|_| ())
    }
}

impl std::fmt::Debug for MirrorListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorListener")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("device", &self.device.name())
            .finish()
    }
}

// ============================================================================
// Deferred inserts
// ============================================================================

/// An insert held back by its unit of work while a cascade was running.
///
/// The unit of work owns these and forwards them when the cascade that produced
/// them completes. Forwarding makes the one sink call the insert event itself would
/// have made; it does not depend on the listener still being registered.
#[derive(Clone)]
pub struct DeferredInsert {
    device: DeviceContext,
    entity: EntityRef,
}

impl DeferredInsert {
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Send the held insert to the device's sink.
    pub fn forward(&self, session: &dyn PersistenceContext) -> Result<(), MirrorError> {
        self.device.sink().post_persist(&self.entity)?;
        if self.device.settings().process_collection {
            session.mark_collections_processed(&self.entity);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeferredInsert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredInsert")
            .field("device", &self.device.name())
            .field("entity", &self.entity.entity_name)
            .finish()
    }
}

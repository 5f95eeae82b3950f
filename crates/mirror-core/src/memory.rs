//! In-memory unit of work driving the registry the way a persistence engine would.
//!
//! Not a persistence engine: it keeps an identity map, queues actions, fires the
//! immediate categories on [`MemorySession::flush`] and the post-commit categories
//! after [`MemorySession::commit`]. Enough to run the bridge end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::category::TimingMode;
use crate::dispatch::EventDispatcher;
use crate::entity::{Entity, EntityEntry, EntityId, EntityRef, EntryStatus};
use crate::error::{ListenerError, MirrorError};
use crate::events::{
    CollectionEvent, CollectionEventKind, EntityEvent, PersistenceContext, SessionRef,
};
use crate::listener::DeferredInsert;
use crate::registry::{EventRegistry, InMemoryEventRegistry, RegistryProvider};

// ============================================================================
// Persistence context
// ============================================================================

/// Identity map of managed entities, keyed by instance.
#[derive(Default)]
pub struct MemoryPersistenceContext {
    entries: RwLock<Vec<(EntityRef, EntityEntry)>>,
    cascade_level: AtomicUsize,
    processed: Mutex<Vec<EntityRef>>,
    deferred: Mutex<Vec<DeferredInsert>>,
}

impl MemoryPersistenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace the entry of `entity`.
    pub fn insert_entry(&self, entity: &EntityRef, entry: EntityEntry) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(e, _)| Arc::ptr_eq(e, entity)) {
            Some((_, existing)) => *existing = entry,
            None => entries.push((entity.clone(), entry)),
        }
    }

    /// Forget `entity`. Returns the removed entry.
    pub fn evict(&self, entity: &EntityRef) -> Option<EntityEntry> {
        let mut entries = self.entries.write();
        let pos = entries.iter().position(|(e, _)| Arc::ptr_eq(e, entity))?;
        Some(entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn enter_cascade(&self) {
        self.cascade_level.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit_cascade(&self) {
        let _ = self
            .cascade_level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |l| l.checked_sub(1));
    }

    /// Number of inserts held back until the current cascade completes.
    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Forward the inserts held back by completed cascades, in arrival order.
    ///
    /// Does nothing while a cascade is still running. On failure the failed insert
    /// and every insert after it stay held.
    pub fn forward_deferred(&self) -> Result<usize, MirrorError> {
        if self.cascade_level() > 0 {
            return Ok(0);
        }
        let held = std::mem::take(&mut *self.deferred.lock());
        let mut forwarded = 0;
        let mut rest = held.into_iter();
        while let Some(insert) = rest.next() {
            if let Err(e) = insert.forward(self) {
                let mut deferred = self.deferred.lock();
                let newer = std::mem::take(&mut *deferred);
                deferred.extend(std::iter::once(insert).chain(rest).chain(newer));
                return Err(e);
            }
            forwarded += 1;
        }
        if forwarded > 0 {
            debug!(count = forwarded, "Forwarded inserts deferred by a cascade");
        }
        Ok(forwarded)
    }

    /// Drop every held insert. Returns how many were dropped.
    pub fn discard_deferred(&self) -> usize {
        std::mem::take(&mut *self.deferred.lock()).len()
    }

    /// Whether the collections of `entity` were marked processed.
    pub fn is_processed(&self, entity: &EntityRef) -> bool {
        self.processed.lock().iter().any(|e| Arc::ptr_eq(e, entity))
    }

    fn set_status(&self, entity: &EntityRef, status: EntryStatus) {
        if let Some((_, entry)) = self
            .entries
            .write()
            .iter_mut()
            .find(|(e, _)| Arc::ptr_eq(e, entity))
        {
            entry.status = status;
        }
    }
}

impl PersistenceContext for MemoryPersistenceContext {
    fn entry(&self, entity: &EntityRef) -> Option<EntityEntry> {
        self.entries
            .read()
            .iter()
            .find(|(e, _)| Arc::ptr_eq(e, entity))
            .map(|(_, entry)| entry.clone())
    }

    fn cascade_level(&self) -> usize {
        self.cascade_level.load(Ordering::SeqCst)
    }

    fn mark_collections_processed(&self, entity: &EntityRef) {
        let mut processed = self.processed.lock();
        if !processed.iter().any(|e| Arc::ptr_eq(e, entity)) {
            processed.push(entity.clone());
        }
    }

    fn defer_insert(&self, insert: DeferredInsert) -> bool {
        self.deferred.lock().push(insert);
        true
    }
}

impl std::fmt::Debug for MemoryPersistenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPersistenceContext")
            .field("entries", &self.len())
            .field("cascade_level", &self.cascade_level())
            .field("deferred", &self.deferred_count())
            .finish()
    }
}

// ============================================================================
// Session factory
// ============================================================================

/// Opens sessions sharing one registry and one id sequence.
#[derive(Clone)]
pub struct MemorySessionFactory {
    registry: Option<Arc<InMemoryEventRegistry>>,
    sequence: Arc<AtomicI64>,
}

impl MemorySessionFactory {
    pub fn new(registry: Arc<InMemoryEventRegistry>) -> Self {
        Self {
            registry: Some(registry),
            sequence: Arc::new(AtomicI64::new(1)),
        }
    }

    /// A factory that exposes no event registry.
    pub fn without_registry() -> Self {
        Self {
            registry: None,
            sequence: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn registry(&self) -> Option<&Arc<InMemoryEventRegistry>> {
        self.registry.as_ref()
    }

    /// Open a session. Sessions of a factory without a registry fire nothing.
    pub fn open_session(&self) -> MemorySession {
        let registry = self
            .registry
            .clone()
            .unwrap_or_else(|| {
                Arc::new(InMemoryEventRegistry::with_categories(std::iter::empty()))
            });
        MemorySession {
            context: Arc::new(MemoryPersistenceContext::new()),
            dispatcher: EventDispatcher::new(registry),
            sequence: self.sequence.clone(),
            queued: Vec::new(),
            flushed: Vec::new(),
        }
    }
}

impl RegistryProvider for MemorySessionFactory {
    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>> {
        self.registry.as_ref().map(|r| {
            let registry: Arc<dyn EventRegistry> = r.clone();
            registry
        })
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
enum Action {
    Insert { entity: EntityRef, id: EntityId },
    /// Inserts cascaded from a parent save, dispatched as one cascade.
    Cascade { inserts: Vec<Action> },
    Update { entity: EntityRef },
    Delete { entity: EntityRef },
    Collection {
        kind: CollectionEventKind,
        role: String,
        owner: Option<EntityRef>,
        carry_owner_id: bool,
    },
}

/// A unit of work over the in-memory registry.
pub struct MemorySession {
    context: Arc<MemoryPersistenceContext>,
    dispatcher: EventDispatcher,
    sequence: Arc<AtomicI64>,
    queued: Vec<Action>,
    flushed: Vec<Action>,
}

impl MemorySession {
    pub fn context(&self) -> &Arc<MemoryPersistenceContext> {
        &self.context
    }

    fn session_ref(&self) -> SessionRef {
        self.context.clone()
    }

    fn next_id(&self) -> EntityId {
        EntityId::from(self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    /// Make `entity` persistent, assigning it a generated identity.
    pub fn save(&mut self, entity: Entity) -> EntityRef {
        self.save_inner(entity, true)
    }

    /// Like [`Self::save`], but the generated identity is only known to the
    /// persistence layer, not written back to the instance.
    pub fn save_without_id_writeback(&mut self, entity: Entity) -> EntityRef {
        self.save_inner(entity, false)
    }

    /// Save `parent` and cascade the save to `children` through `role`.
    ///
    /// The cascaded child inserts are queued first as one cascade, followed by the
    /// parent insert and a collection recreate for the owner.
    pub fn save_with_children(
        &mut self,
        parent: Entity,
        role: impl Into<String>,
        children: Vec<Entity>,
    ) -> (EntityRef, Vec<EntityRef>) {
        let mut inserts = Vec::with_capacity(children.len());
        let children = children
            .into_iter()
            .map(|child| {
                let (entity, action) = self.register_insert(child, true);
                inserts.push(action);
                entity
            })
            .collect();
        if !inserts.is_empty() {
            self.queued.push(Action::Cascade { inserts });
        }
        let parent = self.save_inner(parent, true);
        self.queued.push(Action::Collection {
            kind: CollectionEventKind::Recreate,
            role: role.into(),
            owner: Some(parent.clone()),
            carry_owner_id: true,
        });
        (parent, children)
    }

    fn save_inner(&mut self, entity: Entity, write_back: bool) -> EntityRef {
        let (entity, action) = self.register_insert(entity, write_back);
        self.queued.push(action);
        entity
    }

    /// Enter `entity` into the persistence context and build its insert action.
    fn register_insert(&mut self, entity: Entity, write_back: bool) -> (EntityRef, Action) {
        let id = entity.id.clone().unwrap_or_else(|| self.next_id());
        let entity = if write_back {
            entity.with_id(id.clone())
        } else {
            entity
        };
        let entity = entity.into_ref();
        self.context.insert_entry(
            &entity,
            EntityEntry {
                entity_name: entity.entity_name.clone(),
                id: Some(id.clone()),
                status: EntryStatus::Saving,
            },
        );
        let action = Action::Insert {
            entity: entity.clone(),
            id,
        };
        (entity, action)
    }

    /// Schedule an update. Detached instances are reattached by their identity.
    pub fn update(&mut self, entity: &EntityRef) {
        if self.context.entry(entity).is_none() {
            if let Some(id) = &entity.id {
                self.context
                    .insert_entry(entity, EntityEntry::managed(&entity.entity_name, id.clone()));
            }
        }
        self.queued.push(Action::Update {
            entity: entity.clone(),
        });
    }

    /// Schedule a delete.
    pub fn delete(&mut self, entity: &EntityRef) {
        self.context.set_status(entity, EntryStatus::Deleted);
        self.queued.push(Action::Delete {
            entity: entity.clone(),
        });
    }

    /// Schedule a collection mutation event.
    ///
    /// With `carry_owner_id` false the event leaves the owner identity out of its
    /// payload, as happens for owners the dispatch layer could not fully resolve.
    pub fn mutate_collection(
        &mut self,
        kind: CollectionEventKind,
        role: impl Into<String>,
        owner: Option<&EntityRef>,
        carry_owner_id: bool,
    ) {
        self.queued.push(Action::Collection {
            kind,
            role: role.into(),
            owner: owner.cloned(),
            carry_owner_id,
        });
    }

    pub fn recreate_collection(&mut self, role: impl Into<String>, owner: &EntityRef) {
        self.mutate_collection(CollectionEventKind::Recreate, role, Some(owner), true);
    }

    pub fn update_collection(&mut self, role: impl Into<String>, owner: &EntityRef) {
        self.mutate_collection(CollectionEventKind::Update, role, Some(owner), true);
    }

    pub fn remove_collection(&mut self, role: impl Into<String>, owner: &EntityRef) {
        self.mutate_collection(CollectionEventKind::Remove, role, Some(owner), true);
    }

    /// Number of actions not yet flushed.
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Fire the immediate categories for every queued action.
    ///
    /// Inserts deferred during a cascade are forwarded right after the cascade
    /// completes. A listener failure stops the flush; the failed action and the
    /// ones after it stay queued.
    pub fn flush(&mut self) -> Result<(), ListenerError> {
        self.context.forward_deferred()?;
        while !self.queued.is_empty() {
            let action = self.queued[0].clone();
            self.fire(&action, TimingMode::Immediate)?;
            self.queued.remove(0);
            self.settle(&action);
            self.flushed.push(action);
            self.context.forward_deferred()?;
        }
        Ok(())
    }

    /// Flush, then fire the post-commit categories. Nothing is committed if the flush fails.
    pub fn commit(&mut self) -> Result<(), ListenerError> {
        self.flush()?;
        let committed = std::mem::take(&mut self.flushed);
        debug!(actions = committed.len(), "Committed unit of work");
        for action in &committed {
            self.fire(action, TimingMode::PostCommit)?;
        }
        Ok(())
    }

    /// Discard queued and flushed actions and held inserts without firing
    /// post-commit events.
    pub fn rollback(&mut self) {
        self.queued.clear();
        self.flushed.clear();
        let dropped = self.context.discard_deferred();
        if dropped > 0 {
            debug!(dropped, "Rollback dropped deferred inserts");
        }
    }

    fn settle(&self, action: &Action) {
        match action {
            Action::Insert { entity, .. } => self.context.set_status(entity, EntryStatus::Managed),
            Action::Cascade { inserts } => inserts.iter().for_each(|a| self.settle(a)),
            Action::Delete { entity } => {
                self.context.evict(entity);
            }
            _ => {}
        }
    }

    fn fire(&self, action: &Action, timing: TimingMode) -> Result<(), ListenerError> {
        let [insert, update, delete] = timing.entity_categories();
        match action {
            Action::Insert { entity, id } => {
                let event = EntityEvent::new(entity.clone(), self.session_ref()).with_id(id.clone());
                self.dispatcher.fire_entity(insert, &event)?;
            }
            Action::Cascade { inserts } if timing == TimingMode::Immediate => {
                self.context.enter_cascade();
                let result = inserts.iter().try_for_each(|a| self.fire(a, timing));
                self.context.exit_cascade();
                if result.is_err() {
                    // The whole cascade is dispatched again on the next flush.
                    self.context.discard_deferred();
                }
                result?;
            }
            Action::Cascade { inserts } => {
                for action in inserts {
                    self.fire(action, timing)?;
                }
            }
            Action::Update { entity } => {
                let event = EntityEvent::new(entity.clone(), self.session_ref());
                self.dispatcher.fire_entity(update, &event)?;
            }
            Action::Delete { entity } => {
                let event = EntityEvent::new(entity.clone(), self.session_ref());
                self.dispatcher.fire_entity(delete, &event)?;
            }
            Action::Collection {
                kind,
                role,
                owner,
                carry_owner_id,
            } => {
                // Collection categories exist in immediate mode only.
                if timing == TimingMode::Immediate {
                    let mut event =
                        CollectionEvent::new(*kind, role.clone(), owner.clone(), self.session_ref());
                    if !carry_owner_id {
                        event = event.without_owner_id();
                    }
                    self.dispatcher.fire_collection(&event)?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("context", &self.context)
            .field("queued", &self.queued.len())
            .field("flushed", &self.flushed.len())
            .finish()
    }
}

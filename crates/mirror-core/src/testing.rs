//! Helpers for exercising the bridge next to listeners installed by other subsystems.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::category::{Capability, EventCategory};
use crate::error::{ListenerError, RegistryError};
use crate::events::{CollectionEvent, EntityEvent};
use crate::listener::{EventListener, ListenerKind};
use crate::registry::{EventRegistry, InMemoryEventRegistry, ListenerGroup, SharedListener};

/// A listener that belongs to some other subsystem and counts its invocations.
pub struct ForeignListener {
    name: String,
    calls: AtomicUsize,
}

impl ForeignListener {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Same as [`Self::new`], already erased to a registry handle.
    pub fn shared(name: impl Into<String>) -> SharedListener {
        Self::new(name)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl EventListener for ForeignListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ListenerKind {
        ListenerKind::Foreign("foreign")
    }

    fn capabilities(&self) -> &[Capability] {
        &Capability::ENTITY_AND_COLLECTION
    }

    fn on_post_insert(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        self.hit()
    }

    fn on_post_update(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        self.hit()
    }

    fn on_post_delete(&self, _event: &EntityEvent) -> Result<(), ListenerError> {
        self.hit()
    }

    fn on_post_recreate_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        self.hit()
    }

    fn on_post_update_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        self.hit()
    }

    fn on_post_remove_collection(&self, _event: &CollectionEvent) -> Result<(), ListenerError> {
        self.hit()
    }
}

/// Returns `true` if both handles point to the same listener instance.
pub fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    Arc::ptr_eq(a, b)
}

/// Registry that refuses writes to selected categories.
///
/// Uses the provided read-filter-replace `retain`, so removal fails on the
/// `set_group` of a refused category.
#[derive(Debug, Default)]
pub struct RejectingRegistry {
    inner: InMemoryEventRegistry,
    refused: Mutex<HashSet<EventCategory>>,
}

impl RejectingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse `append` and `set_group` on `category` from now on.
    pub fn reject(&self, category: EventCategory) {
        self.refused.lock().insert(category);
    }

    pub fn accept(&self, category: EventCategory) {
        self.refused.lock().remove(&category);
    }

    pub fn inner(&self) -> &InMemoryEventRegistry {
        &self.inner
    }

    fn check(&self, category: EventCategory) -> Result<(), RegistryError> {
        if self.refused.lock().contains(&category) {
            Err(RegistryError::rejected(category, "category locked"))
        } else {
            Ok(())
        }
    }
}

impl EventRegistry for RejectingRegistry {
    fn group(&self, category: EventCategory) -> Result<ListenerGroup, RegistryError> {
        self.inner.group(category)
    }

    fn set_group(
        &self,
        category: EventCategory,
        listeners: ListenerGroup,
    ) -> Result<(), RegistryError> {
        self.check(category)?;
        self.inner.set_group(category, listeners)
    }

    fn append(
        &self,
        category: EventCategory,
        listener: SharedListener,
    ) -> Result<(), RegistryError> {
        self.check(category)?;
        self.inner.append(category, listener)
    }
}

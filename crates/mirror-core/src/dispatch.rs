//! Delivery of dispatched events to the listeners of a category.
//!
//! Delivery is synchronous and ordered. For immediate categories the first listener
//! error stops delivery and is returned, aborting the caller's flush. Post-commit
//! categories fire after the transaction is durable, so listener errors there are
//! logged and delivery continues.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::category::{Capability, EventCategory, TimingMode};
use crate::error::ListenerError;
use crate::events::{CollectionEvent, EntityEvent};
use crate::registry::{EventRegistry, SharedListener};

/// Routes events to the listeners registered in an [`EventRegistry`].
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<dyn EventRegistry>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<dyn EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn EventRegistry> {
        &self.registry
    }

    /// Fire an insert/update/delete event on `category`.
    ///
    /// Returns the number of listeners invoked.
    pub fn fire_entity(
        &self,
        category: EventCategory,
        event: &EntityEvent,
    ) -> Result<usize, ListenerError> {
        self.fire(category, |listener| match category.capability() {
            Capability::Insert => listener.on_post_insert(event),
            Capability::Update => listener.on_post_update(event),
            Capability::Delete => listener.on_post_delete(event),
            _ => Ok(()),
        })
    }

    /// Fire a collection event on the category matching its kind.
    pub fn fire_collection(&self, event: &CollectionEvent) -> Result<usize, ListenerError> {
        let category = event.kind.category();
        self.fire(category, |listener| match category.capability() {
            Capability::CollectionRecreate => listener.on_post_recreate_collection(event),
            Capability::CollectionUpdate => listener.on_post_update_collection(event),
            Capability::CollectionRemove => listener.on_post_remove_collection(event),
            _ => Ok(()),
        })
    }

    fn fire(
        &self,
        category: EventCategory,
        call: impl Fn(&SharedListener) -> Result<(), ListenerError>,
    ) -> Result<usize, ListenerError> {
        let group = match self.registry.group(category) {
            Ok(group) => group,
            Err(e) => {
                debug!(category = %category, error = %e, "Category not offered, nothing to fire");
                return Ok(0);
            }
        };

        let capability = category.capability();
        let mut invoked = 0;
        for listener in group.iter().filter(|l| l.handles(capability)) {
            invoked += 1;
            if let Err(e) = call(listener) {
                match category.timing() {
                    TimingMode::Immediate => return Err(e),
                    TimingMode::PostCommit => {
                        warn!(
                            listener = %listener.name(),
                            category = %category,
                            error = %e,
                            "Post-commit listener failed"
                        );
                    }
                }
            }
        }
        Ok(invoked)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::error::MirrorError;
    use crate::events::DetachedContext;
    use crate::listener::MirrorListener;
    use crate::mirror::{DeviceContext, RecordingMirror};
    use crate::registry::InMemoryEventRegistry;
    use crate::testing::ForeignListener;
    use serde_json::json;
    use tracing_test::traced_test;

    fn event() -> EntityEvent {
        EntityEvent::new(
            Entity::new("Parent", json!({})).with_id(1).into_ref(),
            DetachedContext::shared(),
        )
    }

    #[test]
    fn test_fire_in_registration_order() {
        let registry = InMemoryEventRegistry::new_shared();
        let first = ForeignListener::new("first");
        let second = ForeignListener::new("second");
        registry
            .append(EventCategory::PostInsert, first.clone())
            .unwrap();
        registry
            .append(EventCategory::PostInsert, second.clone())
            .unwrap();

        let dispatcher = EventDispatcher::new(registry);
        assert_eq!(
            dispatcher
                .fire_entity(EventCategory::PostInsert, &event())
                .unwrap(),
            2
        );
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[test]
    fn test_immediate_failure_aborts() {
        let registry = InMemoryEventRegistry::new_shared();
        let sink = RecordingMirror::shared();
        sink.fail_with(MirrorError::unavailable("down"));
        let after = ForeignListener::new("after");
        registry
            .append(
                EventCategory::PostUpdate,
                Arc::new(MirrorListener::entity(DeviceContext::new("d", sink))),
            )
            .unwrap();
        registry
            .append(EventCategory::PostUpdate, after.clone())
            .unwrap();

        let dispatcher = EventDispatcher::new(registry);
        assert!(dispatcher
            .fire_entity(EventCategory::PostUpdate, &event())
            .is_err());
        assert_eq!(after.calls(), 0);
    }

    #[traced_test]
    #[test]
    fn test_post_commit_failure_is_logged() {
        let registry = InMemoryEventRegistry::new_shared();
        let sink = RecordingMirror::shared();
        sink.fail_with(MirrorError::unavailable("down"));
        let after = ForeignListener::new("after");
        registry
            .append(
                EventCategory::PostCommitUpdate,
                Arc::new(MirrorListener::entity(DeviceContext::new("d", sink))),
            )
            .unwrap();
        registry
            .append(EventCategory::PostCommitUpdate, after.clone())
            .unwrap();

        let dispatcher = EventDispatcher::new(registry);
        assert_eq!(
            dispatcher
                .fire_entity(EventCategory::PostCommitUpdate, &event())
                .unwrap(),
            2
        );
        assert_eq!(after.calls(), 1);
        assert!(logs_contain("Post-commit listener failed"));
    }

    #[test]
    fn test_unoffered_category_fires_nothing() {
        let registry = Arc::new(InMemoryEventRegistry::with_categories([
            EventCategory::PostInsert,
        ]));
        let dispatcher = EventDispatcher::new(registry);
        assert_eq!(
            dispatcher
                .fire_entity(EventCategory::PostCommitInsert, &event())
                .unwrap(),
            0
        );
    }
}

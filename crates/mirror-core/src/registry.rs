//! Event registry seam and its in-memory implementation.
//!
//! The registry is process-wide shared state owned by the persistence layer.
//! It offers no remove-by-reference: removal is read-filter-replace via
//! [`EventRegistry::retain`].
//!
//! # Concurrency
//!
//! Callers must serialize `inject`/`remove` relative to concurrent dispatch, normally
//! by running them only during startup and shutdown. [`InMemoryEventRegistry`]
//! additionally runs `retain` under the per-category shard lock, so a concurrent
//! `append` on the same category is never lost between the read and the replace.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::category::EventCategory;
use crate::error::RegistryError;
use crate::listener::EventListener;

/// Shared handle to a registered listener.
pub type SharedListener = Arc<dyn EventListener>;

/// Ordered listeners registered under one category. Listeners fire in this order.
pub type ListenerGroup = Vec<SharedListener>;

/// Named-category listener registry of the persistence layer.
pub trait EventRegistry: Send + Sync {
    /// Current listeners of `category`. An empty group is valid.
    fn group(&self, category: EventCategory) -> Result<ListenerGroup, RegistryError>;

    /// Replace every listener of `category`.
    fn set_group(&self, category: EventCategory, listeners: ListenerGroup)
    -> Result<(), RegistryError>;

    /// Append one listener to the end of `category`.
    fn append(&self, category: EventCategory, listener: SharedListener)
    -> Result<(), RegistryError>;

    /// Keep only the listeners for which `keep` returns `true`, preserving order.
    ///
    /// Returns how many listeners were removed. Filtering a group that holds no
    /// matching listener leaves it unchanged.
    fn retain(
        &self,
        category: EventCategory,
        keep: &dyn Fn(&SharedListener) -> bool,
    ) -> Result<usize, RegistryError> {
        let group = self.group(category)?;
        let before = group.len();
        let kept: ListenerGroup = group.into_iter().filter(|l| keep(l)).collect();
        let removed = before - kept.len();
        self.set_group(category, kept)?;
        Ok(removed)
    }
}

/// Handle from which the event registry is obtained, e.g. a session factory.
pub trait RegistryProvider {
    /// The registry, or `None` if this handle does not expose one.
    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>>;
}

impl RegistryProvider for Arc<dyn EventRegistry> {
    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>> {
        Some(self.clone())
    }
}

impl RegistryProvider for Arc<InMemoryEventRegistry> {
    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>> {
        let registry: Arc<dyn EventRegistry> = self.clone();
        Some(registry)
    }
}

// ============================================================================
// In-memory registry
// ============================================================================

/// Registry keeping groups in a concurrent map.
pub struct InMemoryEventRegistry {
    groups: DashMap<EventCategory, ListenerGroup>,
    supported: HashSet<EventCategory>,
}

impl InMemoryEventRegistry {
    /// Create a registry offering every category.
    pub fn new() -> Self {
        Self::with_categories(EventCategory::ALL)
    }

    /// Create a registry offering only `categories`.
    pub fn with_categories(categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self {
            groups: DashMap::new(),
            supported: categories.into_iter().collect(),
        }
    }

    /// Create a registry wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of listeners in `category` (zero for unsupported categories).
    pub fn len(&self, category: EventCategory) -> usize {
        self.groups.get(&category).map(|g| g.len()).unwrap_or(0)
    }

    /// Returns `true` if no category holds a listener.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.is_empty())
    }

    pub fn supports(&self, category: EventCategory) -> bool {
        self.supported.contains(&category)
    }

    fn check(&self, category: EventCategory) -> Result<(), RegistryError> {
        if self.supports(category) {
            Ok(())
        } else {
            Err(RegistryError::UnsupportedCategory(category))
        }
    }
}

impl Default for InMemoryEventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry for InMemoryEventRegistry {
    fn group(&self, category: EventCategory) -> Result<ListenerGroup, RegistryError> {
        self.check(category)?;
        Ok(self
            .groups
            .get(&category)
            .map(|g| g.clone())
            .unwrap_or_default())
    }

    fn set_group(
        &self,
        category: EventCategory,
        listeners: ListenerGroup,
    ) -> Result<(), RegistryError> {
        self.check(category)?;
        trace!(category = %category, count = listeners.len(), "Replacing listener group");
        self.groups.insert(category, listeners);
        Ok(())
    }

    fn append(
        &self,
        category: EventCategory,
        listener: SharedListener,
    ) -> Result<(), RegistryError> {
        self.check(category)?;
        trace!(category = %category, listener = %listener.name(), "Appending listener");
        self.groups.entry(category).or_default().push(listener);
        Ok(())
    }

    fn retain(
        &self,
        category: EventCategory,
        keep: &dyn Fn(&SharedListener) -> bool,
    ) -> Result<usize, RegistryError> {
        self.check(category)?;
        let Some(mut group) = self.groups.get_mut(&category) else {
            return Ok(0);
        };
        let before = group.len();
        group.retain(|l| keep(l));
        Ok(before - group.len())
    }
}

impl std::fmt::Debug for InMemoryEventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.supported.iter().copied().collect();
        categories.sort_by_key(|c| c.as_str());
        let mut s = f.debug_struct("InMemoryEventRegistry");
        for category in categories {
            s.field(category.as_str(), &self.len(category));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ForeignListener;

    fn names(group: &ListenerGroup) -> Vec<&str> {
        group.iter().map(|l| l.name()).collect()
    }

    #[test]
    fn test_empty_group_is_not_an_error() {
        let registry = InMemoryEventRegistry::new();
        let group = registry.group(EventCategory::PostInsert).unwrap();
        assert!(group.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsupported_category() {
        let registry = InMemoryEventRegistry::with_categories(
            EventCategory::ALL.into_iter().filter(|c| !c.is_collection()),
        );
        let Err(err) = registry.group(EventCategory::PostCollectionUpdate) else {
            panic!("collection categories should be unsupported");
        };
        assert_eq!(
            err,
            RegistryError::UnsupportedCategory(EventCategory::PostCollectionUpdate)
        );
        assert!(registry
            .append(EventCategory::PostCollectionUpdate, ForeignListener::shared("audit"))
            .is_err());
    }

    #[test]
    fn test_append_preserves_order() {
        let registry = InMemoryEventRegistry::new();
        registry
            .append(EventCategory::PostUpdate, ForeignListener::shared("a"))
            .unwrap();
        registry
            .append(EventCategory::PostUpdate, ForeignListener::shared("b"))
            .unwrap();

        let group = registry.group(EventCategory::PostUpdate).unwrap();
        assert_eq!(names(&group), vec!["a", "b"]);
        assert_eq!(registry.len(EventCategory::PostUpdate), 2);
        assert_eq!(registry.len(EventCategory::PostDelete), 0);
    }

    #[test]
    fn test_retain_filters_in_place() {
        let registry = InMemoryEventRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .append(EventCategory::PostDelete, ForeignListener::shared(name))
                .unwrap();
        }

        let removed = registry
            .retain(EventCategory::PostDelete, &|l: &SharedListener| l.name() != "b")
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            names(&registry.group(EventCategory::PostDelete).unwrap()),
            vec!["a", "c"]
        );

        let removed = registry
            .retain(EventCategory::PostDelete, &|l: &SharedListener| l.name() != "b")
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(registry.len(EventCategory::PostDelete), 2);
    }
}

//! Dispatch channels, timing modes and listener capabilities.
//!
//! - `EventCategory` - one named channel of the event registry
//! - `TimingMode` - whether entity events fire before or after commit
//! - `Capability` - a callback a listener declares it implements

use serde::{Deserialize, Serialize};

// ============================================================================
// Event Categories
// ============================================================================

/// A dispatch channel of the persistence layer's event registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    /// Entity inserted, fired during flush
    PostInsert,
    /// Entity updated, fired during flush
    PostUpdate,
    /// Entity deleted, fired during flush
    PostDelete,
    /// Entity inserted, fired after the transaction committed
    PostCommitInsert,
    /// Entity updated, fired after the transaction committed
    PostCommitUpdate,
    /// Entity deleted, fired after the transaction committed
    PostCommitDelete,
    /// Owned collection recreated, fired during flush
    PostCollectionRecreate,
    /// Owned collection updated, fired during flush
    PostCollectionUpdate,
    /// Owned collection removed, fired during flush
    PostCollectionRemove,
}

impl EventCategory {
    /// Every category the bridge knows about.
    pub const ALL: [EventCategory; 9] = [
        EventCategory::PostInsert,
        EventCategory::PostUpdate,
        EventCategory::PostDelete,
        EventCategory::PostCommitInsert,
        EventCategory::PostCommitUpdate,
        EventCategory::PostCommitDelete,
        EventCategory::PostCollectionRecreate,
        EventCategory::PostCollectionUpdate,
        EventCategory::PostCollectionRemove,
    ];

    /// The owned-collection categories. The registry only offers these in immediate mode.
    pub const COLLECTION: [EventCategory; 3] = [
        EventCategory::PostCollectionRecreate,
        EventCategory::PostCollectionUpdate,
        EventCategory::PostCollectionRemove,
    ];

    /// Returns the string representation of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::PostInsert => "post-insert",
            EventCategory::PostUpdate => "post-update",
            EventCategory::PostDelete => "post-delete",
            EventCategory::PostCommitInsert => "post-commit-insert",
            EventCategory::PostCommitUpdate => "post-commit-update",
            EventCategory::PostCommitDelete => "post-commit-delete",
            EventCategory::PostCollectionRecreate => "post-collection-recreate",
            EventCategory::PostCollectionUpdate => "post-collection-update",
            EventCategory::PostCollectionRemove => "post-collection-remove",
        }
    }

    /// Timing of the category. Collection categories are always immediate.
    pub fn timing(&self) -> TimingMode {
        match self {
            EventCategory::PostCommitInsert
            | EventCategory::PostCommitUpdate
            | EventCategory::PostCommitDelete => TimingMode::PostCommit,
            _ => TimingMode::Immediate,
        }
    }

    /// Returns `true` for the owned-collection categories.
    pub fn is_collection(&self) -> bool {
        Self::COLLECTION.contains(self)
    }

    /// The capability a listener needs to receive events from this category.
    pub fn capability(&self) -> Capability {
        match self {
            EventCategory::PostInsert | EventCategory::PostCommitInsert => Capability::Insert,
            EventCategory::PostUpdate | EventCategory::PostCommitUpdate => Capability::Update,
            EventCategory::PostDelete | EventCategory::PostCommitDelete => Capability::Delete,
            EventCategory::PostCollectionRecreate => Capability::CollectionRecreate,
            EventCategory::PostCollectionUpdate => Capability::CollectionUpdate,
            EventCategory::PostCollectionRemove => Capability::CollectionRemove,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Timing
// ============================================================================

/// When insert/update/delete listeners fire relative to the enclosing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingMode {
    /// Fire during flush, before commit. Listener failures abort the flush.
    #[default]
    Immediate,
    /// Fire only after the transaction committed. Failures can only be logged.
    PostCommit,
}

impl TimingMode {
    /// The insert/update/delete categories of this timing mode.
    pub fn entity_categories(&self) -> [EventCategory; 3] {
        match self {
            TimingMode::Immediate => [
                EventCategory::PostInsert,
                EventCategory::PostUpdate,
                EventCategory::PostDelete,
            ],
            TimingMode::PostCommit => [
                EventCategory::PostCommitInsert,
                EventCategory::PostCommitUpdate,
                EventCategory::PostCommitDelete,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimingMode::Immediate => "immediate",
            TimingMode::PostCommit => "post-commit",
        }
    }
}

impl std::fmt::Display for TimingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// A callback a listener implements, declared up front instead of discovered by inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Insert,
    Update,
    Delete,
    CollectionRecreate,
    CollectionUpdate,
    CollectionRemove,
}

impl Capability {
    /// Insert/update/delete capabilities.
    pub const ENTITY: [Capability; 3] = [Capability::Insert, Capability::Update, Capability::Delete];

    /// Entity capabilities plus the three collection capabilities.
    pub const ENTITY_AND_COLLECTION: [Capability; 6] = [
        Capability::Insert,
        Capability::Update,
        Capability::Delete,
        Capability::CollectionRecreate,
        Capability::CollectionUpdate,
        Capability::CollectionRemove,
    ];

    /// Category this capability registers into under the given timing.
    ///
    /// Collection capabilities ignore `timing`: there are no post-commit collection categories.
    pub fn category(&self, timing: TimingMode) -> EventCategory {
        match (self, timing) {
            (Capability::Insert, TimingMode::Immediate) => EventCategory::PostInsert,
            (Capability::Update, TimingMode::Immediate) => EventCategory::PostUpdate,
            (Capability::Delete, TimingMode::Immediate) => EventCategory::PostDelete,
            (Capability::Insert, TimingMode::PostCommit) => EventCategory::PostCommitInsert,
            (Capability::Update, TimingMode::PostCommit) => EventCategory::PostCommitUpdate,
            (Capability::Delete, TimingMode::PostCommit) => EventCategory::PostCommitDelete,
            (Capability::CollectionRecreate, _) => EventCategory::PostCollectionRecreate,
            (Capability::CollectionUpdate, _) => EventCategory::PostCollectionUpdate,
            (Capability::CollectionRemove, _) => EventCategory::PostCollectionRemove,
        }
    }

    /// Returns `true` for the three collection capabilities.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Capability::CollectionRecreate
                | Capability::CollectionUpdate
                | Capability::CollectionRemove
        )
    }
}

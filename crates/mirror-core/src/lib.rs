//! # mirror-core
//!
//! Lifecycle event bridge between a persistence engine's event registry and an
//! index mirror.
//!
//! The bridge installs a mirror listener into the registry's named categories and
//! takes it out again. While installed, the listener forwards entity inserts,
//! updates and deletes, plus mutations of owned collections, to an [`IndexMirror`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   inject / remove   ┌──────────────────────────┐
//! │  LifecycleInjector   │ ──────────────────▶ │      EventRegistry       │
//! │ (entity/collection)  │                     │ category -> [listeners]  │
//! └──────────────────────┘                     └──────────────────────────┘
//!                                                           │ dispatch
//!                                                           ▼
//!                                              ┌──────────────────────────┐
//!                                              │      MirrorListener      │
//!                                              │  owner/id resolution     │
//!                                              └──────────────────────────┘
//!                                                           │
//!                                                           ▼
//!                                              ┌──────────────────────────┐
//!                                              │       IndexMirror        │
//!                                              └──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use mirror_core::prelude::*;
//!
//! let registry = InMemoryEventRegistry::new_shared();
//! let device = DeviceContext::new("products", RecordingMirror::shared());
//!
//! let injector = injector_for(device.settings());
//! injector.inject(&registry, &device)?;
//! // ... units of work fire events into the mirror ...
//! injector.remove(&registry, &device)?;
//! ```
//!
//! # Module Structure
//!
//! - [`category`]: event categories, timing modes and listener capabilities
//! - [`events`]: dispatched payloads and the unit-of-work seam
//! - [`listener`]: listener trait and the mirror listener
//! - [`injector`]: listener installation and removal
//! - [`registry`]: registry trait and the in-memory registry
//! - [`dispatch`]: delivery of events to registered listeners
//! - [`memory`]: in-memory unit of work
//! - [`registrar`]: property-driven enablement

pub mod category;
pub mod config;
pub mod dispatch;
pub mod entity;
mod error;
pub mod events;
pub mod injector;
pub mod listener;
pub mod memory;
pub mod mirror;
pub mod observability;
pub mod registrar;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use category::{Capability, EventCategory, TimingMode};
pub use config::{DeviceSettings, LoggingConfig, MirrorConfig};
pub use dispatch::EventDispatcher;
pub use entity::{Entity, EntityEntry, EntityId, EntityRef, EntryStatus};
pub use error::{BridgeError, ConfigError, ListenerError, MirrorError, RegistryError};
pub use events::{
    CollectionEvent, CollectionEventKind, DetachedContext, EntityEvent, PersistenceContext,
    SessionRef,
};
pub use injector::{
    CollectionLifecycleInjector, EntityLifecycleInjector, LifecycleInjector, injector_for,
};
pub use listener::{
    CollectionOutcome, DeferredInsert, EventListener, ListenerKind, MirrorKind, MirrorListener,
    OwnerResolution, resolve_owner,
};
pub use memory::{MemoryPersistenceContext, MemorySession, MemorySessionFactory};
pub use mirror::{
    DeviceContext, IndexMirror, LoggingMirror, MirrorCall, MirrorOp, RecordingMirror,
};
pub use registrar::enable_mirroring;
pub use registry::{
    EventRegistry, InMemoryEventRegistry, ListenerGroup, RegistryProvider, SharedListener,
};

/// Type alias for the result of `inject` and `remove`.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use mirror_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::category::{Capability, EventCategory, TimingMode};
    pub use crate::config::DeviceSettings;
    pub use crate::entity::{Entity, EntityId, EntityRef};
    pub use crate::error::{BridgeError, ListenerError, MirrorError, RegistryError};
    pub use crate::events::{CollectionEvent, CollectionEventKind, EntityEvent};
    pub use crate::injector::{
        CollectionLifecycleInjector, EntityLifecycleInjector, LifecycleInjector, injector_for,
    };
    pub use crate::listener::{EventListener, MirrorListener};
    pub use crate::memory::{MemorySession, MemorySessionFactory};
    pub use crate::mirror::{DeviceContext, IndexMirror, LoggingMirror, RecordingMirror};
    pub use crate::registry::{EventRegistry, InMemoryEventRegistry, RegistryProvider};
    pub use crate::BridgeResult;
}

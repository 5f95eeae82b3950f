//! Installation and removal of mirror listeners.
//!
//! An injector owns at most one live [`MirrorListener`]. `inject` creates it and
//! appends it to the categories its capabilities map to; `remove` filters every
//! mirror listener out of those categories by [`ListenerKind`](crate::listener::ListenerKind)
//! tag and clears the live reference.
//!
//! Removal never looks at instances: a listener left behind by an earlier teardown
//! that failed half way is removed as well. Filtering a clean group leaves it
//! unchanged, so a failed `remove` can simply be called again.
//!
//! Calling `inject` twice without `remove` registers the listener twice. Avoiding
//! that is up to the caller.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::category::{Capability, EventCategory, TimingMode};
use crate::config::DeviceSettings;
use crate::error::BridgeError;
use crate::listener::{EventListener, MirrorListener};
use crate::mirror::DeviceContext;
use crate::registry::{EventRegistry, RegistryProvider, SharedListener};

/// Installs a mirror listener into an event registry and takes it out again.
pub trait LifecycleInjector: Send + Sync {
    /// Timing of the insert/update/delete registrations, fixed at construction.
    fn timing(&self) -> TimingMode;

    /// Build the listener registered by the next `inject`.
    fn create_listener(&self, device: &DeviceContext) -> MirrorListener;

    /// Create a listener and register it under every category its capabilities map to.
    fn inject(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError>;

    /// Filter mirror listeners out of every category this injector registers into.
    fn remove(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError>;

    /// The listener registered by the last successful `inject`, until `remove`.
    fn listener(&self) -> Option<Arc<MirrorListener>>;
}

/// Pick the injector matching the device configuration.
pub fn injector_for(settings: &DeviceSettings) -> Box<dyn LifecycleInjector> {
    if settings.collections {
        Box::new(CollectionLifecycleInjector::new(settings.timing))
    } else {
        Box::new(EntityLifecycleInjector::new(settings.timing))
    }
}

fn event_registry(
    provider: &dyn RegistryProvider,
    device: &DeviceContext,
) -> Result<Arc<dyn EventRegistry>, BridgeError> {
    provider
        .event_registry()
        .ok_or_else(|| BridgeError::registry_unavailable(device.name()))
}

fn strip_mirrors(
    registry: &dyn EventRegistry,
    categories: impl IntoIterator<Item = EventCategory>,
) -> Result<usize, BridgeError> {
    let mut total = 0;
    for category in categories {
        let removed = registry
            .retain(category, &|l: &SharedListener| !l.kind().is_mirror())
            .map_err(BridgeError::removal_failed)?;
        if removed > 0 {
            debug!(category = %category, removed, "Removed mirror listeners");
        }
        total += removed;
    }
    Ok(total)
}

// ============================================================================
// Entity injector
// ============================================================================

/// Registers insert/update/delete mirroring in the categories of one timing mode.
#[derive(Debug)]
pub struct EntityLifecycleInjector {
    timing: TimingMode,
    live: Mutex<Option<Arc<MirrorListener>>>,
}

impl EntityLifecycleInjector {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            timing,
            live: Mutex::new(None),
        }
    }

    /// Append `listener` for each of its insert/update/delete capabilities.
    ///
    /// A listener declaring none of them registers nothing here.
    pub(crate) fn register(
        &self,
        registry: &dyn EventRegistry,
        listener: &Arc<MirrorListener>,
    ) -> Result<(), BridgeError> {
        let shared: SharedListener = listener.clone();
        for capability in listener.capabilities().iter().filter(|c| !c.is_collection()) {
            let category = capability.category(self.timing);
            registry
                .append(category, shared.clone())
                .map_err(BridgeError::injection_failed)?;
        }
        Ok(())
    }

    /// Filter mirror listeners out of the insert/update/delete categories of this timing.
    ///
    /// The categories of the other timing mode are left untouched.
    pub(crate) fn deregister(&self, registry: &dyn EventRegistry) -> Result<usize, BridgeError> {
        strip_mirrors(registry, self.timing.entity_categories())
    }

    pub(crate) fn set_live(&self, listener: Option<Arc<MirrorListener>>) {
        *self.live.lock() = listener;
    }
}

impl LifecycleInjector for EntityLifecycleInjector {
    fn timing(&self) -> TimingMode {
        self.timing
    }

    fn create_listener(&self, device: &DeviceContext) -> MirrorListener {
        MirrorListener::entity(device.clone())
    }

    fn inject(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError> {
        let registry = event_registry(provider, device)?;
        let listener = Arc::new(self.create_listener(device));
        self.register(registry.as_ref(), &listener)?;

        info!(
            device = %device.name(),
            listener = %listener.id(),
            timing = %self.timing,
            "Injected mirror listener"
        );
        self.set_live(Some(listener));
        Ok(())
    }

    fn remove(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError> {
        let registry = event_registry(provider, device)?;
        let removed = self.deregister(registry.as_ref())?;

        info!(
            device = %device.name(),
            timing = %self.timing,
            removed,
            "Removed mirror listeners"
        );
        self.set_live(None);
        Ok(())
    }

    fn listener(&self) -> Option<Arc<MirrorListener>> {
        self.live.lock().clone()
    }
}

// ============================================================================
// Collection injector
// ============================================================================

/// Entity mirroring plus owned-collection mirroring.
///
/// Collection events only exist in immediate mode, so the collection categories are
/// registered and filtered whatever the timing of the entity categories.
#[derive(Debug)]
pub struct CollectionLifecycleInjector {
    base: EntityLifecycleInjector,
}

impl CollectionLifecycleInjector {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            base: EntityLifecycleInjector::new(timing),
        }
    }
}

impl LifecycleInjector for CollectionLifecycleInjector {
    fn timing(&self) -> TimingMode {
        self.base.timing()
    }

    fn create_listener(&self, device: &DeviceContext) -> MirrorListener {
        MirrorListener::collection(device.clone())
    }

    fn inject(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError> {
        let registry = event_registry(provider, device)?;
        let listener = Arc::new(self.create_listener(device));
        self.base.register(registry.as_ref(), &listener)?;

        let shared: SharedListener = listener.clone();
        for capability in listener.capabilities().iter().filter(|c| c.is_collection()) {
            registry
                .append(capability.category(TimingMode::Immediate), shared.clone())
                .map_err(BridgeError::injection_failed)?;
        }

        info!(
            device = %device.name(),
            listener = %listener.id(),
            timing = %self.timing(),
            "Injected mirror listener with collection mirroring"
        );
        self.base.set_live(Some(listener));
        Ok(())
    }

    fn remove(
        &self,
        provider: &dyn RegistryProvider,
        device: &DeviceContext,
    ) -> Result<(), BridgeError> {
        let registry = event_registry(provider, device)?;
        let removed = self.base.deregister(registry.as_ref())?
            + strip_mirrors(registry.as_ref(), EventCategory::COLLECTION)?;

        info!(
            device = %device.name(),
            timing = %self.timing(),
            removed,
            "Removed mirror listeners with collection mirroring"
        );
        self.base.set_live(None);
        Ok(())
    }

    fn listener(&self) -> Option<Arc<MirrorListener>> {
        self.base.listener()
    }
}

/// Categories an injector of `timing` touches, collection categories included or not.
pub fn touched_categories(timing: TimingMode, collections: bool) -> Vec<EventCategory> {
    let mut categories = timing.entity_categories().to_vec();
    if collections {
        categories.extend(
            Capability::ENTITY_AND_COLLECTION
                .iter()
                .filter(|c| c.is_collection())
                .map(|c| c.category(timing)),
        );
    }
    categories
}

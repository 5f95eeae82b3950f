//! Property-driven enablement for embedded deployments.
//!
//! When the persistence unit is configured with mirror properties, a single
//! collection-capable mirror listener is added to the immediate categories, unless
//! a mirror listener is already registered there.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::category::{Capability, TimingMode};
use crate::BridgeResult;
use crate::error::BridgeError;
use crate::listener::MirrorListener;
use crate::mirror::DeviceContext;
use crate::registry::{RegistryProvider, SharedListener};

/// Prefix of the properties that switch mirroring on.
pub const PROPERTY_PREFIX: &str = "mirror.";

/// Legacy prefix that switches mirroring on as well.
pub const GPS_INDEX_PREFIX: &str = "gps.index.";

/// Returns `true` if any property key enables mirroring.
pub fn mirroring_requested(properties: &HashMap<String, String>) -> bool {
    properties
        .keys()
        .any(|k| k.starts_with(PROPERTY_PREFIX) || k.starts_with(GPS_INDEX_PREFIX))
}

/// Add one mirror listener to every immediate category that does not hold one yet.
///
/// Returns `Ok(false)` without touching the registry when no mirror property is set.
pub fn enable_mirroring(
    provider: &dyn RegistryProvider,
    properties: &HashMap<String, String>,
    device: &DeviceContext,
) -> BridgeResult<bool> {
    if !mirroring_requested(properties) {
        debug!(
            device = %device.name(),
            "No mirror properties found, index mirroring not enabled"
        );
        return Ok(false);
    }

    let registry = provider
        .event_registry()
        .ok_or_else(|| BridgeError::registry_unavailable(device.name()))?;
    let listener = Arc::new(MirrorListener::collection(device.clone()));
    let shared: SharedListener = listener.clone();

    let mut added = 0;
    for capability in Capability::ENTITY_AND_COLLECTION {
        let category = capability.category(TimingMode::Immediate);
        let group = registry
            .group(category)
            .map_err(BridgeError::injection_failed)?;
        if group.iter().any(|l| l.kind().is_mirror()) {
            debug!(category = %category, "Mirror listener already registered");
            continue;
        }
        registry
            .append(category, shared.clone())
            .map_err(BridgeError::injection_failed)?;
        added += 1;
    }

    info!(
        device = %device.name(),
        listener = %listener.id(),
        categories = added,
        "Enabled index mirroring from properties"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::EventCategory;
    use crate::listener::{ListenerKind, MirrorKind};
    use crate::mirror::RecordingMirror;
    use crate::registry::{EventRegistry, InMemoryEventRegistry};
    use tracing_test::traced_test;

    fn device() -> DeviceContext {
        DeviceContext::new("embedded", RecordingMirror::shared())
    }

    fn properties(keys: &[&str]) -> HashMap<String, String> {
        keys.iter()
            .map(|k| (k.to_string(), "true".to_string()))
            .collect()
    }

    fn immediate_categories() -> Vec<EventCategory> {
        Capability::ENTITY_AND_COLLECTION
            .iter()
            .map(|c| c.category(TimingMode::Immediate))
            .collect()
    }

    #[traced_test]
    #[test]
    fn test_no_properties_leaves_registry_alone() {
        let registry = InMemoryEventRegistry::new_shared();
        let enabled = enable_mirroring(&registry, &properties(&["persistence.dialect"]), &device())
            .unwrap();

        assert!(!enabled);
        assert!(registry.is_empty());
        assert!(logs_contain("index mirroring not enabled"));
    }

    #[test]
    fn test_enables_all_immediate_categories() {
        for key in ["mirror.device.marshal_ids", "gps.index.name"] {
            let registry = InMemoryEventRegistry::new_shared();
            assert!(enable_mirroring(&registry, &properties(&[key]), &device()).unwrap());

            for category in immediate_categories() {
                assert_eq!(registry.len(category), 1, "{category}");
            }
            for category in TimingMode::PostCommit.entity_categories() {
                assert_eq!(registry.len(category), 0);
            }
        }
    }

    #[test]
    fn test_adds_only_if_needed() {
        let registry = InMemoryEventRegistry::new_shared();
        registry
            .append(
                EventCategory::PostInsert,
                Arc::new(MirrorListener::entity(device())),
            )
            .unwrap();

        let props = properties(&["mirror.connection"]);
        enable_mirroring(&registry, &props, &device()).unwrap();
        enable_mirroring(&registry, &props, &device()).unwrap();

        let insert = registry.group(EventCategory::PostInsert).unwrap();
        assert_eq!(insert.len(), 1);
        assert_eq!(insert[0].kind(), ListenerKind::Mirror(MirrorKind::Entity));
        for category in immediate_categories() {
            assert_eq!(registry.len(category), 1, "{category}");
        }
    }
}

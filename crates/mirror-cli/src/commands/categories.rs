use std::sync::Arc;

use anyhow::{Context, Result, bail};
use mirror_core::injector::touched_categories;
use mirror_core::{
    Capability, DeviceContext, DeviceSettings, EventCategory, EventListener, EventRegistry,
    InMemoryEventRegistry, ListenerKind, RecordingMirror, SharedListener, injector_for,
};

use crate::cli::OutputFormat;
use crate::output::{GroupRow, print_groups, print_success};

/// Stand-in for a listener some other subsystem installed. Ignores every event.
struct AuditListener;

impl EventListener for AuditListener {
    fn name(&self) -> &str {
        "audit"
    }

    fn kind(&self) -> ListenerKind {
        ListenerKind::Foreign("audit")
    }

    fn capabilities(&self) -> &[Capability] {
        &Capability::ENTITY_AND_COLLECTION
    }
}

fn sizes(registry: &InMemoryEventRegistry) -> Vec<usize> {
    EventCategory::ALL
        .into_iter()
        .map(|c| registry.len(c))
        .collect()
}

pub fn run(settings: &DeviceSettings, format: OutputFormat) -> Result<()> {
    let registry = InMemoryEventRegistry::new_shared();
    // Every category starts out with a listener owned by someone else.
    let audit: SharedListener = Arc::new(AuditListener);
    for category in EventCategory::ALL {
        registry
            .append(category, audit.clone())
            .with_context(|| format!("Failed to seed {category}"))?;
    }

    let device = DeviceContext::new("categories", RecordingMirror::shared())
        .with_settings(settings.clone());
    let injector = injector_for(settings);

    let before = sizes(&registry);
    injector
        .inject(&registry, &device)
        .context("Failed to inject mirror listener")?;
    let injected = sizes(&registry);
    injector
        .remove(&registry, &device)
        .context("Failed to remove mirror listeners")?;
    let removed = sizes(&registry);

    let touched = touched_categories(settings.timing, settings.collections);
    let rows: Vec<GroupRow> = EventCategory::ALL
        .into_iter()
        .enumerate()
        .map(|(i, c)| GroupRow {
            category: c.to_string(),
            timing: c.timing().to_string(),
            touched: touched.contains(&c),
            sizes: vec![before[i], injected[i], removed[i]],
        })
        .collect();
    print_groups(&["Before", "Injected", "Removed"], &rows, format);

    if before != removed {
        bail!("Listener groups differ from their pre-injection state");
    }
    if matches!(format, OutputFormat::Table) {
        print_success("Listener groups restored to their pre-injection state");
    }
    Ok(())
}

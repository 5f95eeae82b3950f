use anyhow::{Context, Result};
use mirror_core::injector::touched_categories;
use mirror_core::{
    CollectionEventKind, DeviceContext, DeviceSettings, Entity, EventCategory,
    InMemoryEventRegistry, MemorySessionFactory, RecordingMirror, injector_for,
};
use serde_json::json;
use tracing::info;

use crate::cli::OutputFormat;
use crate::output::{GroupRow, print_calls, print_groups, print_heading, print_success};

const ROLE: &str = "Parent.childs";

pub fn run(settings: &DeviceSettings, format: OutputFormat) -> Result<()> {
    let registry = InMemoryEventRegistry::new_shared();
    let factory = MemorySessionFactory::new(registry.clone());
    let sink = RecordingMirror::shared();
    let device = DeviceContext::new("demo", sink.clone()).with_settings(settings.clone());

    let injector = injector_for(settings);
    injector
        .inject(&factory, &device)
        .context("Failed to inject mirror listener")?;

    // Parent saved with two cascaded children.
    let mut session = factory.open_session();
    let (parent, children) = session.save_with_children(
        Entity::new("Parent", json!({"value": "parentValue"})),
        ROLE,
        vec![
            Entity::new("Child", json!({"value": "child1"})),
            Entity::new("Child", json!({"value": "child2"})),
        ],
    );
    session.commit().context("First unit of work failed")?;
    info!(calls = sink.call_count(), "First unit of work committed");

    // Second unit of work touching the detached graph.
    let mut session = factory.open_session();
    session.update(&parent);
    session.update_collection(ROLE, &parent);
    if let Some(first) = children.first() {
        session.delete(first);
        session.remove_collection(ROLE, &parent);
    }
    session.mutate_collection(CollectionEventKind::Update, ROLE, None, true);
    session.commit().context("Second unit of work failed")?;

    let calls = sink.calls();
    if matches!(format, OutputFormat::Table) {
        print_heading(&format!(
            "Mirrored calls ({} timing, collections {})",
            settings.timing,
            if settings.collections { "on" } else { "off" }
        ));
    }
    print_calls(&calls, format);

    injector
        .remove(&factory, &device)
        .context("Failed to remove mirror listeners")?;

    let touched = touched_categories(settings.timing, settings.collections);
    let rows: Vec<GroupRow> = EventCategory::ALL
        .into_iter()
        .map(|c| GroupRow {
            category: c.to_string(),
            timing: c.timing().to_string(),
            touched: touched.contains(&c),
            sizes: vec![registry.len(c)],
        })
        .collect();
    if matches!(format, OutputFormat::Table) {
        print_heading("Listener groups after teardown");
    }
    print_groups(&["After remove"], &rows, format);

    if matches!(format, OutputFormat::Table) {
        print_success(&format!("Mirrored {} calls", calls.len()));
    }
    Ok(())
}

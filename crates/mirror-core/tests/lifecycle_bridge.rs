//! End-to-end tests: injectors, the in-memory unit of work and a recording sink.

use std::sync::Arc;

use mirror_core::testing::ForeignListener;
use mirror_core::{
    DeviceContext, DeviceSettings, Entity, EntityEvent, EntityId, EntityLifecycleInjector,
    EventCategory, EventListener, EventRegistry, InMemoryEventRegistry, LifecycleInjector,
    LoggingMirror, MemoryPersistenceContext, MemorySessionFactory, MirrorError, MirrorOp,
    RecordingMirror, TimingMode, injector_for,
};
use serde_json::json;

struct Fixture {
    registry: Arc<InMemoryEventRegistry>,
    factory: MemorySessionFactory,
    sink: Arc<RecordingMirror>,
    device: DeviceContext,
}

fn fixture(settings: DeviceSettings) -> Fixture {
    let registry = InMemoryEventRegistry::new_shared();
    let sink = RecordingMirror::shared();
    Fixture {
        factory: MemorySessionFactory::new(registry.clone()),
        device: DeviceContext::new("test", sink.clone()).with_settings(settings),
        registry,
        sink,
    }
}

fn immediate() -> DeviceSettings {
    DeviceSettings {
        collections: false,
        ..DeviceSettings::default()
    }
}

fn post_commit() -> DeviceSettings {
    DeviceSettings {
        timing: TimingMode::PostCommit,
        collections: false,
        ..DeviceSettings::default()
    }
}

#[test]
fn test_insert_group_grows_and_shrinks() {
    let f = fixture(immediate());
    let injector = EntityLifecycleInjector::new(TimingMode::Immediate);

    injector.inject(&f.factory, &f.device).unwrap();
    assert_eq!(f.registry.len(EventCategory::PostInsert), 1);

    injector.remove(&f.factory, &f.device).unwrap();
    assert_eq!(f.registry.len(EventCategory::PostInsert), 0);
}

#[test]
fn test_immediate_mirrors_on_flush() {
    let f = fixture(immediate());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();

    let mut session = f.factory.open_session();
    let parent = session.save(Entity::new("Parent", json!({"value": "v"})));
    session.flush().unwrap();
    assert_eq!(f.sink.count(MirrorOp::Persist), 1);

    session.update(&parent);
    session.delete(&parent);
    session.commit().unwrap();

    let ops: Vec<MirrorOp> = f.sink.calls().iter().map(|c| c.op).collect();
    assert_eq!(ops, vec![MirrorOp::Persist, MirrorOp::Update, MirrorOp::Remove]);
}

#[test]
fn test_removed_injector_mirrors_nothing() {
    let f = fixture(immediate());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();
    injector.remove(&f.factory, &f.device).unwrap();

    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.commit().unwrap();
    assert_eq!(f.sink.call_count(), 0);
}

#[test]
fn test_post_commit_waits_for_commit() {
    let f = fixture(post_commit());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();

    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.flush().unwrap();
    assert_eq!(f.sink.call_count(), 0);

    session.commit().unwrap();
    assert_eq!(f.sink.count(MirrorOp::Persist), 1);
}

#[test]
fn test_rolled_back_work_is_not_mirrored_post_commit() {
    let f = fixture(post_commit());
    injector_for(f.device.settings())
        .inject(&f.factory, &f.device)
        .unwrap();

    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.flush().unwrap();
    session.rollback();
    session.commit().unwrap();
    assert_eq!(f.sink.call_count(), 0);
}

#[test]
fn test_immediate_sink_failure_aborts_flush() {
    let f = fixture(immediate());
    injector_for(f.device.settings())
        .inject(&f.factory, &f.device)
        .unwrap();
    f.sink.fail_with(MirrorError::unavailable("index closed"));

    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    assert!(session.flush().is_err());
    assert!(session.commit().is_err());
    assert_eq!(session.queued(), 1);

    f.sink.recover();
    session.commit().unwrap();
    assert_eq!(f.sink.count(MirrorOp::Persist), 1);
}

#[test]
fn test_post_commit_sink_failure_does_not_fail_commit() {
    let f = fixture(post_commit());
    injector_for(f.device.settings())
        .inject(&f.factory, &f.device)
        .unwrap();
    f.sink.fail_with(MirrorError::rejected("Parent", "mapping missing"));

    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.commit().unwrap();
    assert_eq!(f.sink.call_count(), 0);
}

#[test]
fn test_logging_mirror_absorbs_immediate_failures() {
    let registry = InMemoryEventRegistry::new_shared();
    let factory = MemorySessionFactory::new(registry);
    let recording = RecordingMirror::new();
    recording.fail_with(MirrorError::unavailable("index closed"));
    let device = DeviceContext::new("lenient", Arc::new(LoggingMirror::new(recording)))
        .with_settings(immediate());
    injector_for(device.settings())
        .inject(&factory, &device)
        .unwrap();

    let mut session = factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.commit().unwrap();
}

#[test]
fn test_marshal_ids_recovers_generated_identity() {
    let f = fixture(DeviceSettings {
        marshal_ids: true,
        ..immediate()
    });
    injector_for(f.device.settings())
        .inject(&f.factory, &f.device)
        .unwrap();

    let mut session = f.factory.open_session();
    let saved = session.save_without_id_writeback(Entity::new("Parent", json!({})));
    session.flush().unwrap();

    assert!(saved.id.is_none());
    let calls = f.sink.calls();
    assert_eq!(calls[0].entity_id(), Some(&EntityId::from(1)));
}

#[test]
fn test_foreign_listeners_keep_firing_after_teardown() {
    let f = fixture(immediate());
    let audit = ForeignListener::new("audit");
    f.registry
        .append(EventCategory::PostInsert, audit.clone())
        .unwrap();

    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();
    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.commit().unwrap();

    injector.remove(&f.factory, &f.device).unwrap();
    let mut session = f.factory.open_session();
    session.save(Entity::new("Parent", json!({})));
    session.commit().unwrap();

    assert_eq!(audit.calls(), 2);
    assert_eq!(f.sink.call_count(), 1);
    assert_eq!(f.registry.len(EventCategory::PostInsert), 1);
}

#[test]
fn test_one_update_event_makes_one_sink_call_while_inserts_are_deferred() {
    let f = fixture(immediate());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();
    let listener = injector.listener().unwrap();

    let cascading = Arc::new(MemoryPersistenceContext::new());
    cascading.enter_cascade();
    for value in ["child1", "child2"] {
        let child = Entity::new("Child", json!({"value": value})).into_ref();
        listener
            .on_post_insert(&EntityEvent::new(child, cascading.clone()))
            .unwrap();
    }

    let mut session = f.factory.open_session();
    let other = Entity::new("Other", json!({})).with_id(9).into_ref();
    session.update(&other);
    session.flush().unwrap();

    let calls = f.sink.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].op, calls[0].entity_name()), (MirrorOp::Update, "Other"));
    assert_eq!(cascading.deferred_count(), 2);
}

#[test]
fn test_deferred_failure_does_not_leak_into_other_sessions() {
    let f = fixture(immediate());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();
    let listener = injector.listener().unwrap();

    let cascading = Arc::new(MemoryPersistenceContext::new());
    cascading.enter_cascade();
    listener
        .on_post_insert(&EntityEvent::new(
            Entity::new("Child", json!({})).into_ref(),
            cascading.clone(),
        ))
        .unwrap();
    cascading.exit_cascade();

    f.sink.fail_with(MirrorError::rejected("Child", "bad child"));
    assert!(cascading.forward_deferred().is_err());
    f.sink.recover();

    let mut session = f.factory.open_session();
    session.update(&Entity::new("Other", json!({})).with_id(9).into_ref());
    session.flush().unwrap();
    assert_eq!(f.sink.count(MirrorOp::Update), 1);
    assert_eq!(f.sink.count(MirrorOp::Persist), 0);
    assert_eq!(cascading.deferred_count(), 1);
}

#[test]
fn test_remove_keeps_inserts_deferred_before_removal() {
    let f = fixture(immediate());
    let injector = injector_for(f.device.settings());
    injector.inject(&f.factory, &f.device).unwrap();
    let listener = injector.listener().unwrap();

    let cascading = Arc::new(MemoryPersistenceContext::new());
    cascading.enter_cascade();
    let child = Entity::new("Child", json!({})).into_ref();
    listener
        .on_post_insert(&EntityEvent::new(child.clone(), cascading.clone()))
        .unwrap();

    injector.remove(&f.factory, &f.device).unwrap();
    assert!(injector.listener().is_none());
    assert_eq!(cascading.deferred_count(), 1);

    cascading.exit_cascade();
    assert_eq!(cascading.forward_deferred().unwrap(), 1);
    let calls = f.sink.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, MirrorOp::Persist);
    assert!(Arc::ptr_eq(&calls[0].entity, &child));
}

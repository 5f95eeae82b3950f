//! The index-facing side of the bridge.
//!
//! The indexing engine itself lives elsewhere; the bridge only needs the three
//! [`IndexMirror`] callbacks and a [`DeviceContext`] binding a sink to its options.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DeviceSettings;
use crate::entity::{EntityId, EntityRef};
use crate::error::MirrorError;

/// Sink receiving mirrored entity changes.
///
/// Failures are the sink's to define. In immediate mode they propagate back through
/// the listener and abort the triggering flush; wrap the sink in [`LoggingMirror`]
/// when failures must never reach the unit of work.
pub trait IndexMirror: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str {
        "index"
    }

    /// An entity was persisted for the first time.
    fn post_persist(&self, entity: &EntityRef) -> Result<(), MirrorError>;

    /// An entity changed and its mirrored representation must be re-derived.
    fn post_update(&self, entity: &EntityRef) -> Result<(), MirrorError>;

    /// An entity was deleted.
    fn post_remove(&self, entity: &EntityRef) -> Result<(), MirrorError>;
}

/// Mirroring target handed to `inject`: sink, name and listener options.
#[derive(Clone)]
pub struct DeviceContext {
    name: String,
    settings: DeviceSettings,
    sink: Arc<dyn IndexMirror>,
}

impl DeviceContext {
    pub fn new(name: impl Into<String>, sink: Arc<dyn IndexMirror>) -> Self {
        Self {
            name: name.into(),
            settings: DeviceSettings::default(),
            sink,
        }
    }

    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn sink(&self) -> &Arc<dyn IndexMirror> {
        &self.sink
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("sink", &self.sink.name())
            .finish()
    }
}

// ============================================================================
// Logging wrapper
// ============================================================================

/// Wrapper turning sink failures into warnings.
///
/// Post-commit listeners cannot affect the committed transaction, so their sink
/// errors have nowhere to go but the log.
pub struct LoggingMirror<M: IndexMirror> {
    inner: M,
}

impl<M: IndexMirror> LoggingMirror<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    fn absorb(&self, op: &str, entity: &EntityRef, result: Result<(), MirrorError>) {
        if let Err(e) = result {
            warn!(
                sink = %self.inner.name(),
                operation = op,
                entity = %entity.entity_name,
                error = %e,
                "Index mirror call failed, change not mirrored"
            );
        }
    }
}

impl<M: IndexMirror> IndexMirror for LoggingMirror<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn post_persist(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.absorb("persist", entity, self.inner.post_persist(entity));
        Ok(())
    }

    fn post_update(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.absorb("update", entity, self.inner.post_update(entity));
        Ok(())
    }

    fn post_remove(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.absorb("remove", entity, self.inner.post_remove(entity));
        Ok(())
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// Sink operation recorded by [`RecordingMirror`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorOp {
    Persist,
    Update,
    Remove,
}

impl MirrorOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorOp::Persist => "persist",
            MirrorOp::Update => "update",
            MirrorOp::Remove => "remove",
        }
    }
}

impl std::fmt::Display for MirrorOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One call received by [`RecordingMirror`].
#[derive(Debug, Clone)]
pub struct MirrorCall {
    pub op: MirrorOp,
    pub entity: EntityRef,
}

impl MirrorCall {
    pub fn entity_name(&self) -> &str {
        &self.entity.entity_name
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity.id.as_ref()
    }
}

/// In-memory sink that records every call, optionally failing on demand.
#[derive(Default)]
pub struct RecordingMirror {
    calls: Mutex<Vec<MirrorCall>>,
    failure: Mutex<Option<MirrorError>>,
}

impl RecordingMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fail every following call with `error` until [`Self::recover`] is called.
    pub fn fail_with(&self, error: MirrorError) {
        *self.failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<MirrorCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of recorded calls of one kind.
    pub fn count(&self, op: MirrorOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, op: MirrorOp, entity: &EntityRef) -> Result<(), MirrorError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        debug!(operation = %op, entity = %entity.entity_name, "Recorded mirror call");
        self.calls.lock().push(MirrorCall {
            op,
            entity: entity.clone(),
        });
        Ok(())
    }
}

impl IndexMirror for RecordingMirror {
    fn name(&self) -> &str {
        "recording"
    }

    fn post_persist(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.record(MirrorOp::Persist, entity)
    }

    fn post_update(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.record(MirrorOp::Update, entity)
    }

    fn post_remove(&self, entity: &EntityRef) -> Result<(), MirrorError> {
        self.record(MirrorOp::Remove, entity)
    }
}

impl std::fmt::Debug for RecordingMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingMirror")
            .field("calls", &self.call_count())
            .finish()
    }
}

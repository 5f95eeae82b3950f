//! Error types for the lifecycle event bridge.
//!
//! Owner and identity resolution failures on collection events are not errors:
//! they are expected and handled by dropping the event (see [`crate::listener`]).

use crate::category::EventCategory;

/// Errors returned by an [`EventRegistry`](crate::registry::EventRegistry) operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry does not offer this category. This is a configuration error,
    /// distinct from a category whose group is empty.
    #[error("Unsupported event category: {0}")]
    UnsupportedCategory(EventCategory),

    /// The registry refused the operation for this category.
    #[error("Registry rejected {category}: {reason}")]
    Rejected {
        category: EventCategory,
        reason: String,
    },
}

impl RegistryError {
    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(category: EventCategory, reason: impl Into<String>) -> Self {
        Self::Rejected {
            category,
            reason: reason.into(),
        }
    }

    /// The category the failed operation addressed.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::UnsupportedCategory(category) => *category,
            Self::Rejected { category, .. } => *category,
        }
    }
}

/// Errors surfaced by `inject` and `remove`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The event registry cannot be obtained from the supplied handle.
    #[error("Event registry unavailable for device '{device}'")]
    RegistryUnavailable { device: String },

    /// Registering the mirror listener into a category failed.
    #[error("Failed to inject mirror listener into {category}")]
    InjectionFailed {
        category: EventCategory,
        #[source]
        source: RegistryError,
    },

    /// Filtering mirror listeners out of a category failed.
    /// Categories processed before the failure are already clean; retrying is safe.
    #[error("Failed to remove mirror listeners from {category}")]
    RemovalFailed {
        category: EventCategory,
        #[source]
        source: RegistryError,
    },
}

impl BridgeError {
    /// Creates a new `RegistryUnavailable` error.
    #[must_use]
    pub fn registry_unavailable(device: impl Into<String>) -> Self {
        Self::RegistryUnavailable {
            device: device.into(),
        }
    }

    #[must_use]
    pub fn injection_failed(source: RegistryError) -> Self {
        Self::InjectionFailed {
            category: source.category(),
            source,
        }
    }

    #[must_use]
    pub fn removal_failed(source: RegistryError) -> Self {
        Self::RemovalFailed {
            category: source.category(),
            source,
        }
    }

    /// Returns `true` if this is a registry unavailable error.
    #[must_use]
    pub fn is_registry_unavailable(&self) -> bool {
        matches!(self, Self::RegistryUnavailable { .. })
    }

    /// Returns `true` if this error came from `remove` and the call can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemovalFailed { .. })
    }
}

/// Errors raised by an [`IndexMirror`](crate::mirror::IndexMirror) sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    /// The index rejected the entity.
    #[error("Index rejected {entity_name}: {message}")]
    Rejected {
        entity_name: String,
        message: String,
    },

    /// The index could not be reached.
    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

impl MirrorError {
    #[must_use]
    pub fn rejected(entity_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            entity_name: entity_name.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Error returned by a listener callback.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The mirror sink failed.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// Listener execution failed with a message.
    #[error("Listener execution failed: {0}")]
    Execution(String),
}

impl ListenerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        ListenerError::Execution(msg.into())
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid property {key}: {message}")]
    Property { key: String, message: String },
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn property(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Property {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_carries_category() {
        let err = BridgeError::removal_failed(RegistryError::rejected(
            EventCategory::PostUpdate,
            "locked",
        ));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Failed to remove mirror listeners from post-update"
        );

        let err = BridgeError::injection_failed(RegistryError::UnsupportedCategory(
            EventCategory::PostCommitDelete,
        ));
        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            BridgeError::InjectionFailed {
                category: EventCategory::PostCommitDelete,
                ..
            }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::registry_unavailable("orders");
        assert!(err.is_registry_unavailable());
        assert_eq!(
            err.to_string(),
            "Event registry unavailable for device 'orders'"
        );

        let err: ListenerError = MirrorError::rejected("Parent", "mapping missing").into();
        assert_eq!(err.to_string(), "Index rejected Parent: mapping missing");
    }
}

//! Hook resolution: which hooks run for an instance on an event, and with which engine.
//!
//! Pure over its inputs. Engines are inherited field-wise through three levels,
//! first set wins: the hook, the type's behavior, the catalog default. A hook
//! whose engine is still empty after inheritance is returned as-is and fails
//! at engine dispatch.

use stackhook_core::{BehaviorCatalog, EngineChoice, EventName, HookSpec, Instance, Result, TypeKey};

/// Hooks to run for one pass, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedHooks {
    pub type_key: TypeKey,
    pub event: EventName,
    /// Artifact image, from the behavior or the catalog. `None` fails each hook at build time.
    pub source: Option<String>,
    /// Hooks with their effective engine filled in.
    pub hooks: Vec<HookSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// The catalog does not govern this type. Idle, not an error.
    NoBehaviorConfigured(TypeKey),
    /// The type is governed but declares nothing for this event.
    NoHooksForEvent(TypeKey, EventName),
    Hooks(ResolvedHooks),
}

impl Resolution {
    pub fn hooks(&self) -> &[HookSpec] {
        match self {
            Self::Hooks(resolved) => &resolved.hooks,
            _ => &[],
        }
    }
}

/// Resolve the hooks `instance` runs on `event`.
///
/// Only an instance without a usable type identity is an error.
pub fn resolve(instance: &Instance, catalog: &BehaviorCatalog, event: EventName) -> Result<Resolution> {
    let type_key = instance.type_identity()?.type_key();

    let Some(behavior) = catalog.get(&type_key) else {
        return Ok(Resolution::NoBehaviorConfigured(type_key));
    };

    let declared = behavior.hooks_for(event);
    if declared.is_empty() {
        return Ok(Resolution::NoHooksForEvent(type_key, event));
    }

    let hooks = declared
        .iter()
        .map(|hook| HookSpec {
            directory: hook.directory.clone(),
            engine: effective_engine(&hook.engine, &behavior.engine, &catalog.default_engine),
        })
        .collect();

    Ok(Resolution::Hooks(ResolvedHooks {
        source: catalog.artifact_source(behavior).map(str::to_string),
        type_key,
        event,
        hooks,
    }))
}

/// Apply the three-level override chain.
pub fn effective_engine(
    hook: &EngineChoice,
    behavior: &EngineChoice,
    catalog: &EngineChoice,
) -> EngineChoice {
    let mut engine = hook.clone();
    engine.inherit(behavior);
    engine.inherit(catalog);
    engine
}

/// Event for a pass: an explicit event when given, else derived from the instance.
/// A deletion timestamp always means `Deleted`.
pub fn derive_event(instance: &Instance, explicit: Option<EventName>) -> EventName {
    if instance.deletion_timestamp().is_some() {
        return EventName::Deleted;
    }
    if let Some(event) = explicit {
        return event;
    }
    match instance.generation() {
        Some(generation) if generation > 1 => EventName::Updated,
        _ => EventName::Created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackhook_core::EngineType;

    fn instance(metadata: serde_json::Value) -> Instance {
        Instance::new(json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": metadata,
        }))
        .unwrap()
    }

    #[test]
    fn hook_engine_wins() {
        let overlay = EngineChoice {
            engine_type: EngineType::Overlay,
            kustomize: None,
        };
        let resolved = effective_engine(&overlay, &EngineChoice::chart(), &EngineChoice::chart());
        assert_eq!(resolved.engine_type, EngineType::Overlay);
    }

    #[test]
    fn empty_everywhere_stays_unset() {
        let empty = EngineChoice::default();
        assert_eq!(effective_engine(&empty, &empty, &empty), EngineChoice::default());
    }

    #[test]
    fn event_from_generation() {
        assert_eq!(derive_event(&instance(json!({"name": "a", "generation": 1})), None), EventName::Created);
        assert_eq!(derive_event(&instance(json!({"name": "a"})), None), EventName::Created);
        assert_eq!(derive_event(&instance(json!({"name": "a", "generation": 4})), None), EventName::Updated);
    }

    #[test]
    fn deletion_timestamp_wins() {
        let deleting = instance(json!({
            "name": "a",
            "generation": 4,
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }));
        assert_eq!(derive_event(&deleting, Some(EventName::Updated)), EventName::Deleted);
    }

    #[test]
    fn explicit_event_used() {
        let created = instance(json!({"name": "a", "generation": 1}));
        assert_eq!(derive_event(&created, Some(EventName::Updated)), EventName::Updated);
    }
}

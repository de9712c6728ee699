use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{MutagraphError, Result};
use crate::snapshot::PlainValue;

/// Storage-format collaborator: turns field snapshots into bytes and back.
pub trait PersistenceBinding: Send + Sync {
    fn encode(&self, fields: &BTreeMap<String, PlainValue>) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<BTreeMap<String, PlainValue>>;
}

/// Associates each owner type with exactly one binding, registered once at
/// startup (declarative model registration in the host application).
pub struct BindingRegistry {
    bindings: DashMap<String, Arc<dyn PersistenceBinding>>,
}

static GLOBAL: Lazy<BindingRegistry> = Lazy::new(BindingRegistry::new);

impl BindingRegistry {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Process-wide registry.
    pub fn global() -> &'static BindingRegistry {
        &GLOBAL
    }

    /// Register the binding for `owner_type`. First-wins: a second
    /// registration is rejected, never silently replaced.
    pub fn register(&self, owner_type: &str, binding: Arc<dyn PersistenceBinding>) -> Result<()> {
        match self.bindings.entry(owner_type.to_string()) {
            Entry::Occupied(_) => Err(MutagraphError::BindingConflict(owner_type.to_string())),
            Entry::Vacant(slot) => {
                debug!(owner_type, "persistence binding registered");
                slot.insert(binding);
                Ok(())
            }
        }
    }

    pub fn get(&self, owner_type: &str) -> Result<Arc<dyn PersistenceBinding>> {
        self.bindings
            .get(owner_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MutagraphError::BindingMissing(owner_type.to_string()))
    }

    pub fn owner_types(&self) -> Vec<String> {
        self.bindings.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in JSON binding, suitable for any owner type whose fields are plain
/// structural data.
pub struct JsonBinding;

impl PersistenceBinding for JsonBinding {
    fn encode(&self, fields: &BTreeMap<String, PlainValue>) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(fields)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<BTreeMap<String, PlainValue>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_binding_round_trips_fields() {
        let fields = BTreeMap::from([
            ("n".to_string(), PlainValue::Int(3)),
            (
                "items".to_string(),
                PlainValue::List(vec![PlainValue::Str("a".into()), PlainValue::Null]),
            ),
        ]);
        let bytes = JsonBinding.encode(&fields).unwrap();
        assert_eq!(JsonBinding.decode(&bytes).unwrap(), fields);
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        assert!(matches!(
            JsonBinding.decode(b"{not json"),
            Err(MutagraphError::Serialization(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = BindingRegistry::new();
        registry.register("Widget", Arc::new(JsonBinding)).unwrap();
        assert!(matches!(
            registry.register("Widget", Arc::new(JsonBinding)),
            Err(MutagraphError::BindingConflict(name)) if name == "Widget"
        ));
        assert_eq!(registry.owner_types(), vec!["Widget".to_string()]);
    }

    #[test]
    fn missing_binding_is_an_error() {
        let registry = BindingRegistry::new();
        assert!(matches!(
            registry.get("Order"),
            Err(MutagraphError::BindingMissing(name)) if name == "Order"
        ));
    }

    #[test]
    fn registered_binding_round_trips_through_the_registry() {
        let registry = BindingRegistry::new();
        registry.register("Widget", Arc::new(JsonBinding)).unwrap();
        let binding = registry.get("Widget").unwrap();
        let fields = BTreeMap::from([("x".to_string(), PlainValue::Bool(true))]);
        let bytes = binding.encode(&fields).unwrap();
        assert_eq!(binding.decode(&bytes).unwrap(), fields);
    }
}

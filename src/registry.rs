//! Deserializer bindings and the registry that resolves them on workers.
//!
//! A [`DeserializerBinding`] is the serializable reference a descriptor carries:
//! a name plus optional string parameters. Each worker owns a
//! [`DeserializerRegistry<T>`] for the record type it consumes; resolving a
//! binding the registry does not know fails with a configuration error, which
//! is also what happens when a descriptor built for one record type is handed
//! to a worker expecting another.

use crate::deserializer::{
    ByteDeserializer, JsonLinesDeserializer, LineDeserializer, RecordDeserializer, Row,
    RowDeserializer,
};
use crate::error::{PartitionError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Serializable reference to a deserializer implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeserializerBinding {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DeserializerBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn bytes() -> Self {
        Self::new(ByteDeserializer::NAME)
    }

    #[must_use]
    pub fn rows() -> Self {
        Self::new(RowDeserializer::NAME)
    }

    #[must_use]
    pub fn lines() -> Self {
        Self::new(LineDeserializer::NAME)
    }

    #[must_use]
    pub fn json_lines() -> Self {
        Self::new(JsonLinesDeserializer::<()>::NAME)
    }
}

impl fmt::Display for DeserializerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "({})", params.join(","))?;
        }
        Ok(())
    }
}

/// Builds a deserializer from a binding.
pub type DeserializerFactory<T> =
    Arc<dyn Fn(&DeserializerBinding) -> Result<Arc<dyn RecordDeserializer<T>>> + Send + Sync>;

/// Maps binding names to deserializer factories for record type `T`.
pub struct DeserializerRegistry<T> {
    factories: HashMap<String, DeserializerFactory<T>>,
}

impl<T> Clone for DeserializerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

impl<T: 'static> Default for DeserializerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> DeserializerRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DeserializerBinding) -> Result<Arc<dyn RecordDeserializer<T>>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a parameterless deserializer under its own name.
    pub fn register_instance<D>(&mut self, deserializer: D) -> &mut Self
    where
        D: RecordDeserializer<T> + 'static,
    {
        let name = deserializer.name().to_string();
        let shared: Arc<dyn RecordDeserializer<T>> = Arc::new(deserializer);
        self.register(name, move |_| Ok(shared.clone()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered binding names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a binding into a deserializer.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if no factory is registered under the
    /// binding's name, or if the factory rejects the binding's parameters.
    pub fn resolve(&self, binding: &DeserializerBinding) -> Result<Arc<dyn RecordDeserializer<T>>> {
        let factory = self.factories.get(&binding.name).ok_or_else(|| {
            PartitionError::configuration(format!(
                "unresolvable deserializer binding '{binding}' (registered: {})",
                self.names().join(", ")
            ))
        })?;
        factory(binding)
    }
}

impl<T: DeserializeOwned + Send + 'static> DeserializerRegistry<T> {
    /// Register [`JsonLinesDeserializer<T>`] under `"jsonl"`.
    pub fn register_json_lines(&mut self) -> &mut Self {
        self.register_instance(JsonLinesDeserializer::<T>::new())
    }
}

/// Record types with built-in deserializers.
pub trait BuiltinRecord: Sized + Send + 'static {
    fn register_builtins(registry: &mut DeserializerRegistry<Self>);
}

impl BuiltinRecord for u8 {
    fn register_builtins(registry: &mut DeserializerRegistry<Self>) {
        registry.register_instance(ByteDeserializer);
    }
}

impl BuiltinRecord for Row {
    fn register_builtins(registry: &mut DeserializerRegistry<Self>) {
        registry.register_instance(RowDeserializer);
    }
}

impl BuiltinRecord for String {
    fn register_builtins(registry: &mut DeserializerRegistry<Self>) {
        registry.register_instance(LineDeserializer);
    }
}

impl<T: BuiltinRecord> DeserializerRegistry<T> {
    /// A registry preloaded with the built-in deserializers for `T`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        T::register_builtins(&mut registry);
        registry
    }
}

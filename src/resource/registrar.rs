// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Registry of the resources known to the coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{RegistrarError, ResourceProducer};
use crate::journal::validate_unique_name;

/// Registered producers, keyed by unique name.
///
/// Owned by [`TmServices`](crate::TmServices) and shared with the recoverer.
#[derive(Default)]
pub struct ResourceRegistrar {
    producers: RwLock<BTreeMap<String, Arc<dyn ResourceProducer>>>,
}

impl ResourceRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer under its unique name.
    pub fn register(&self, producer: Arc<dyn ResourceProducer>) -> Result<(), RegistrarError> {
        let name = producer.unique_name().to_string();
        validate_unique_name(&name).map_err(|e| RegistrarError::InvalidName {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let mut producers = self.producers.write();
        if producers.contains_key(&name) {
            return Err(RegistrarError::DuplicateName(name));
        }
        tracing::debug!(resource = %name, "registered resource");
        producers.insert(name, producer);
        Ok(())
    }

    /// Removes a producer. Returns it if it was registered.
    pub fn unregister(&self, unique_name: &str) -> Option<Arc<dyn ResourceProducer>> {
        let removed = self.producers.write().remove(unique_name);
        if removed.is_some() {
            tracing::debug!(resource = unique_name, "unregistered resource");
        }
        removed
    }

    pub fn get(&self, unique_name: &str) -> Option<Arc<dyn ResourceProducer>> {
        self.producers.read().get(unique_name).cloned()
    }

    /// Snapshot of every registered producer, ordered by name.
    pub fn resources(&self) -> Vec<Arc<dyn ResourceProducer>> {
        self.producers.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.producers.read().keys().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.producers.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.producers.read().is_empty()
    }
}

impl std::fmt::Debug for ResourceRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistrar")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProducer, MockXaResource};

    fn producer(name: &str) -> Arc<dyn ResourceProducer> {
        Arc::new(MockProducer::new(name, Arc::new(MockXaResource::new())))
    }

    #[test]
    fn test_register_and_lookup() {
        let registrar = ResourceRegistrar::new();
        registrar.register(producer("orders-db")).unwrap();
        registrar.register(producer("audit-queue")).unwrap();

        assert_eq!(registrar.len(), 2);
        assert_eq!(registrar.names(), vec!["audit-queue", "orders-db"]);
        assert_eq!(registrar.get("orders-db").unwrap().unique_name(), "orders-db");
        assert!(registrar.get("missing").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let registrar = ResourceRegistrar::new();
        registrar.register(producer("db")).unwrap();
        assert_eq!(
            registrar.register(producer("db")),
            Err(RegistrarError::DuplicateName("db".into()))
        );
    }

    #[test]
    fn test_rejects_invalid_names() {
        let registrar = ResourceRegistrar::new();
        assert!(matches!(
            registrar.register(producer("")),
            Err(RegistrarError::InvalidName { .. })
        ));
        assert!(matches!(
            registrar.register(producer("bäse")),
            Err(RegistrarError::InvalidName { .. })
        ));
        assert!(registrar.is_empty());
    }

    #[test]
    fn test_unregister() {
        let registrar = ResourceRegistrar::new();
        registrar.register(producer("db")).unwrap();
        assert!(registrar.unregister("db").is_some());
        assert!(registrar.unregister("db").is_none());
        registrar.register(producer("db")).unwrap();
    }
}

//! Service manager
//!
//! Owns every active service module of one machine. Modules are started on
//! demand by the emulated OS, so the active set is dynamic; activation order is
//! kept because savestates are written in that order.

use std::sync::Arc;
use tracing::{debug, info};

use crate::module::{ModuleError, ModuleState, ServiceModule, ServiceRegistry};

/// Serialized form of one module inside a savestate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Machine-state container for service modules
#[derive(Debug)]
pub struct ServiceManager {
    registry: Arc<ServiceRegistry>,
    modules: Vec<Box<dyn ServiceModule>>,
}

impl ServiceManager {
    /// Create an empty manager backed by `registry`
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            modules: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Start the service registered under `key`, or return it if it is already running
    pub fn start_service(&mut self, key: &str) -> Result<&mut dyn ServiceModule, ModuleError> {
        let index = match self.position(key) {
            Some(index) => index,
            None => {
                let module = self.registry.construct(key)?;
                debug!("Starting service {}", key);
                self.modules.push(module);
                self.modules.len() - 1
            }
        };
        Ok(self.modules[index].as_mut())
    }

    /// Start a typed service and return it
    pub fn start<T: ModuleState>(&mut self) -> Result<&mut T, ModuleError> {
        self.start_service(T::KEY)?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(ModuleError::TypeMismatch { key: T::KEY })
    }

    /// Stop a running service. Returns whether it was running.
    pub fn stop_service(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(index) => {
                debug!("Stopping service {}", key);
                self.modules.remove(index);
                true
            }
            None => false,
        }
    }

    /// Get a running service by key
    pub fn service(&self, key: &str) -> Option<&dyn ServiceModule> {
        self.position(key).map(|i| self.modules[i].as_ref())
    }

    /// Get a running typed service
    pub fn get<T: ModuleState>(&self) -> Option<&T> {
        self.service(T::KEY)?.as_any().downcast_ref::<T>()
    }

    /// Get a running typed service mutably
    pub fn get_mut<T: ModuleState>(&mut self) -> Option<&mut T> {
        let index = self.position(T::KEY)?;
        self.modules[index].as_any_mut().downcast_mut::<T>()
    }

    /// Keys of running services in activation order
    pub fn active_keys(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Drop every running service
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Serialize every running service in activation order
    pub fn capture(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        self.modules
            .iter()
            .map(|module| -> Result<ModuleRecord, ModuleError> {
                Ok(ModuleRecord {
                    key: module.key().to_string(),
                    payload: self.registry.serialize(module.as_ref())?,
                })
            })
            .collect()
    }

    /// Replace every running service with the ones described by `records`.
    ///
    /// Nothing is touched unless every record restores successfully.
    pub fn restore(&mut self, records: &[ModuleRecord]) -> Result<(), ModuleError> {
        let modules = records
            .iter()
            .map(|record| self.registry.restore(&record.key, &record.payload))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Restored {} service modules (replacing {})",
            modules.len(),
            self.modules.len()
        );
        self.modules = modules;
        Ok(())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.key() == key)
    }
}

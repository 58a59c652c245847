//! Service module registry
//!
//! Every emulated OS service that can appear in a savestate is registered here
//! under a stable string key, together with a factory and the pair of
//! functions used to (de)serialize its state. Savestates store the key in
//! front of each module's payload, so restoring only needs this table.

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while (de)serializing or instantiating modules
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Unknown service module key: {0}")]
    UnknownKey(String),

    #[error("Module {key} has unexpected concrete type")]
    TypeMismatch { key: &'static str },

    #[error("Failed to encode {key}: {message}")]
    Encode { key: &'static str, message: String },

    #[error("Failed to decode {key}: {message}")]
    Decode { key: &'static str, message: String },
}

/// Errors raised while building the registry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Service module key registered twice: {0}")]
    DuplicateKey(&'static str),

    #[error("Service registry already installed")]
    AlreadyInstalled,
}

/// A live emulated service
pub trait ServiceModule: Any + Send + fmt::Debug {
    /// Registry key of this module type
    fn key(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Typed view of a service module whose state round-trips through serde.
///
/// Implementing this is all a module needs to do to become snapshot-able;
/// [`ServiceModule`] and [`RegistryEntry::of`] come for free.
pub trait ModuleState: Default + Serialize + DeserializeOwned + Send + fmt::Debug + 'static {
    /// Service port name, used as the registry key
    const KEY: &'static str;
}

impl<T: ModuleState> ServiceModule for T {
    fn key(&self) -> &'static str {
        T::KEY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Factory for a fresh module instance
pub type ConstructFn = fn() -> Box<dyn ServiceModule>;

/// Serialize a module's private state
pub type SerializeFn = fn(&dyn ServiceModule) -> Result<Vec<u8>, ModuleError>;

/// Overwrite a freshly constructed module with serialized state
pub type DeserializeFn = fn(&mut dyn ServiceModule, &[u8]) -> Result<(), ModuleError>;

/// One row of the registry
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub key: &'static str,
    pub construct: ConstructFn,
    pub serialize: SerializeFn,
    pub deserialize: DeserializeFn,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry").field("key", &self.key).finish()
    }
}

fn construct_module<T: ModuleState>() -> Box<dyn ServiceModule> {
    Box::new(T::default())
}

fn serialize_module<T: ModuleState>(module: &dyn ServiceModule) -> Result<Vec<u8>, ModuleError> {
    let state = module
        .as_any()
        .downcast_ref::<T>()
        .ok_or(ModuleError::TypeMismatch { key: T::KEY })?;
    bincode::serde::encode_to_vec(state, bincode::config::standard()).map_err(|e| {
        ModuleError::Encode {
            key: T::KEY,
            message: e.to_string(),
        }
    })
}

fn deserialize_module<T: ModuleState>(
    module: &mut dyn ServiceModule,
    bytes: &[u8],
) -> Result<(), ModuleError> {
    let target = module
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or(ModuleError::TypeMismatch { key: T::KEY })?;
    let (state, read): (T, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
            ModuleError::Decode {
                key: T::KEY,
                message: e.to_string(),
            }
        })?;
    if read != bytes.len() {
        return Err(ModuleError::Decode {
            key: T::KEY,
            message: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    *target = state;
    Ok(())
}

impl RegistryEntry {
    /// Entry for a serde-backed module type
    pub fn of<T: ModuleState>() -> Self {
        Self {
            key: T::KEY,
            construct: construct_module::<T>,
            serialize: serialize_module::<T>,
            deserialize: deserialize_module::<T>,
        }
    }
}

/// Collects entries before the registry is frozen
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module type. Keys must be unique.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<&mut Self, RegistryError> {
        if self.entries.iter().any(|e| e.key == entry.key) {
            return Err(RegistryError::DuplicateKey(entry.key));
        }
        debug!("Registered service module {}", entry.key);
        self.entries.push(entry);
        Ok(self)
    }

    /// Register every module that ships with the emulator
    pub fn register_default_modules(&mut self) -> Result<&mut Self, RegistryError> {
        self.register(RegistryEntry::of::<crate::am::AmNet>())?
            .register(RegistryEntry::of::<crate::cfg::CfgU>())?
            .register(RegistryEntry::of::<crate::nfc::NfcU>())?
            .register(RegistryEntry::of::<crate::ptm::PtmU>())
    }

    /// Freeze the table
    pub fn build(self) -> ServiceRegistry {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key, i))
            .collect();
        ServiceRegistry {
            entries: self.entries,
            index,
        }
    }
}

/// Immutable key → entry table
#[derive(Debug)]
pub struct ServiceRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<&'static str, usize>,
}

static GLOBAL_REGISTRY: OnceCell<Arc<ServiceRegistry>> = OnceCell::new();

impl ServiceRegistry {
    /// Registry containing the default modules
    pub fn with_default_modules() -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        builder.register_default_modules()?;
        Ok(builder.build())
    }

    /// Install a custom process-wide registry. Only the first install wins.
    pub fn install_global(registry: ServiceRegistry) -> Result<Arc<ServiceRegistry>, RegistryError> {
        let registry = Arc::new(registry);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        Ok(registry)
    }

    /// Process-wide registry, built with the default modules on first use
    pub fn global() -> Result<Arc<ServiceRegistry>, RegistryError> {
        GLOBAL_REGISTRY
            .get_or_try_init(|| Self::with_default_modules().map(Arc::new))
            .cloned()
    }

    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Whether a key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Construct a fresh module for `key`
    pub fn construct(&self, key: &str) -> Result<Box<dyn ServiceModule>, ModuleError> {
        let entry = self
            .get(key)
            .ok_or_else(|| ModuleError::UnknownKey(key.to_string()))?;
        Ok((entry.construct)())
    }

    /// Serialize a live module through its registered entry
    pub fn serialize(&self, module: &dyn ServiceModule) -> Result<Vec<u8>, ModuleError> {
        let entry = self
            .get(module.key())
            .ok_or_else(|| ModuleError::UnknownKey(module.key().to_string()))?;
        (entry.serialize)(module)
    }

    /// Construct a module for `key` and load `bytes` into it
    pub fn restore(&self, key: &str, bytes: &[u8]) -> Result<Box<dyn ServiceModule>, ModuleError> {
        let entry = self
            .get(key)
            .ok_or_else(|| ModuleError::UnknownKey(key.to_string()))?;
        let mut module = (entry.construct)();
        (entry.deserialize)(module.as_mut(), bytes)?;
        Ok(module)
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptm::PtmU;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Probe {
        value: u32,
    }

    impl ModuleState for Probe {
        const KEY: &'static str = "probe";
    }

    #[test]
    fn test_default_registry() {
        let registry = ServiceRegistry::with_default_modules().unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.contains("am:net"));
        assert!(registry.contains("cfg:u"));
        assert!(registry.contains("nfc:u"));
        assert!(registry.contains("ptm:u"));
        assert!(!registry.contains("hid:user"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(RegistryEntry::of::<Probe>()).unwrap();
        let err = builder.register(RegistryEntry::of::<Probe>()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey("probe"));
    }

    #[test]
    fn test_serialize_restore() {
        let mut builder = RegistryBuilder::new();
        builder.register(RegistryEntry::of::<Probe>()).unwrap();
        let registry = builder.build();

        let module = Probe { value: 0xCAFE };
        let bytes = registry.serialize(&module).unwrap();
        let restored = registry.restore("probe", &bytes).unwrap();
        let restored = restored.as_any().downcast_ref::<Probe>().unwrap();
        assert_eq!(restored.value, 0xCAFE);
    }

    #[test]
    fn test_restore_unknown_key() {
        let registry = ServiceRegistry::with_default_modules().unwrap();
        assert!(matches!(
            registry.restore("mvd:std", &[]),
            Err(ModuleError::UnknownKey(key)) if key == "mvd:std"
        ));
    }

    #[test]
    fn test_deserialize_type_mismatch() {
        let entry = RegistryEntry::of::<Probe>();
        let mut other = PtmU::default();
        assert!(matches!(
            (entry.deserialize)(&mut other, &[0]),
            Err(ModuleError::TypeMismatch { key: "probe" })
        ));
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let mut builder = RegistryBuilder::new();
        builder.register(RegistryEntry::of::<Probe>()).unwrap();
        let registry = builder.build();

        let mut bytes = registry.serialize(&Probe { value: 1 }).unwrap();
        bytes.push(0xFF);
        assert!(matches!(
            registry.restore("probe", &bytes),
            Err(ModuleError::Decode { .. })
        ));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = ServiceRegistry::global().unwrap();
        let b = ServiceRegistry::global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.contains("nfc:u"));
    }
}

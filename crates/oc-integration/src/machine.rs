//! Emulated machine
//!
//! A booted program: its running services plus the execution core that
//! advances it. Everything a savestate captures lives in the services.

use oc_core::ResultStatus;
use oc_hle::{ServiceManager, ServiceRegistry};
use oc_loader::{ExecutionCore, Loader};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::snapshot::{self, SavestateEntry, SnapshotEngine};

pub struct Machine {
    services: ServiceManager,
    core: Box<dyn ExecutionCore>,
    program_id: u64,
    movie_id: u64,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("program_id", &format_args!("{:016X}", self.program_id))
            .field("movie_id", &self.movie_id)
            .field("services", &self.services.active_keys())
            .finish()
    }
}

impl Machine {
    /// Resolve and load the program at `path` into a fresh machine
    pub fn boot(
        loader: &dyn Loader,
        registry: Arc<ServiceRegistry>,
        path: &Path,
        movie_id: u64,
    ) -> Result<Self, ResultStatus> {
        let mut handle = loader.resolve(path)?;
        let program_id = handle.read_program_id()?;
        let mut services = ServiceManager::new(registry);
        let core = handle.load(&mut services)?;
        info!("Booted program {:016X}", program_id);
        Ok(Self {
            services,
            core,
            program_id,
            movie_id,
        })
    }

    /// Build a machine from parts, bypassing the loader
    pub fn from_parts(services: ServiceManager, core: Box<dyn ExecutionCore>, program_id: u64, movie_id: u64) -> Self {
        Self {
            services,
            core,
            program_id,
            movie_id,
        }
    }

    pub fn run_quantum(&mut self) -> ResultStatus {
        self.core.run_quantum(&mut self.services)
    }

    pub fn status_details(&self) -> String {
        self.core.status_details()
    }

    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    pub fn movie_id(&self) -> u64 {
        self.movie_id
    }

    pub fn set_movie_id(&mut self, movie_id: u64) {
        self.movie_id = movie_id;
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut ServiceManager {
        &mut self.services
    }

    pub fn save_state(&self, engine: &SnapshotEngine, slot: u32) -> snapshot::Result<SavestateEntry> {
        engine.save(&self.services, self.program_id, self.movie_id, slot)
    }

    pub fn load_state(&mut self, engine: &SnapshotEngine, slot: u32) -> snapshot::Result<()> {
        engine.load(&mut self.services, self.program_id, self.movie_id, slot)
    }

    /// Stop every service
    pub fn shutdown(&mut self) {
        info!("Shutting down machine {:016X} ({} services)", self.program_id, self.services.len());
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_hle::PtmU;
    use oc_loader::{ImageLoader, ProgramImage};

    #[test]
    fn test_boot_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.oxp");
        ProgramImage::new(0x1234).with_services(&["cfg:u"]).write_to(&path).unwrap();

        let registry = Arc::new(ServiceRegistry::with_default_modules().unwrap());
        let mut machine = Machine::boot(&ImageLoader, registry, &path, 0).unwrap();
        assert_eq!(machine.program_id(), 0x1234);

        assert_eq!(machine.run_quantum(), ResultStatus::Success);
        let engine = SnapshotEngine::new(dir.path().join("states"));
        machine.save_state(&engine, 1).unwrap();

        machine.run_quantum();
        assert_eq!(machine.services().get::<PtmU>().unwrap().step_count(), 2);
        machine.load_state(&engine, 1).unwrap();
        assert_eq!(machine.services().get::<PtmU>().unwrap().step_count(), 1);

        machine.shutdown();
        assert!(machine.services().is_empty());
    }

    #[test]
    fn test_boot_missing_program() {
        let registry = Arc::new(ServiceRegistry::with_default_modules().unwrap());
        let err = Machine::boot(&ImageLoader, registry, Path::new("/nonexistent.oxp"), 0).unwrap_err();
        assert_eq!(err, ResultStatus::ErrorGetLoader);
    }
}

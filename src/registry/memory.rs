//! # In-process service registry.
//!
//! [`MemoryRegistry`] keeps service definitions in a map guarded by a mutex.
//! Every mutating call requires the registry to be opened
//! [`elevated`](MemoryRegistry::elevated); an [`unprivileged`](MemoryRegistry::unprivileged)
//! registry answers them with [`RegistryError::PermissionDenied`], like the
//! real authority does for a non-administrator.
//!
//! `restart` stops synchronously and starts again on a detached thread after
//! the grace delay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::RegistryError;
use crate::registry::{ServiceDefinition, ServiceRegistry};

const TARGET: &str = "servicevisor::registry";

struct Entry {
    definition: ServiceDefinition,
    running: bool,
}

#[derive(Default)]
struct Shared {
    services: Mutex<HashMap<String, Entry>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.services.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-process service registry.
#[derive(Clone)]
pub struct MemoryRegistry {
    shared: Arc<Shared>,
    elevated: bool,
    restart_grace: Duration,
}

impl MemoryRegistry {
    /// Registry opened with administrative privileges.
    #[must_use]
    pub fn elevated() -> Self {
        Self {
            shared: Arc::default(),
            elevated: true,
            restart_grace: Duration::from_secs(5),
        }
    }

    /// Registry opened without privileges; only queries succeed.
    #[must_use]
    pub fn unprivileged() -> Self {
        Self {
            elevated: false,
            ..Self::elevated()
        }
    }

    /// Same registry contents, different privilege.
    #[must_use]
    pub fn with_privilege(&self, elevated: bool) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            elevated,
            restart_grace: self.restart_grace,
        }
    }

    /// Delay between stop and start in [`restart`](ServiceRegistry::restart). Default: 5s.
    #[must_use]
    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    /// Installed definition, if any.
    pub fn definition(&self, name: &str) -> Option<ServiceDefinition> {
        self.shared.lock().get(name).map(|e| e.definition.clone())
    }

    fn require_privilege(&self, operation: &'static str, name: &str) -> Result<(), RegistryError> {
        if self.elevated {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied {
                operation,
                service: name.to_string(),
            })
        }
    }
}

fn not_found(name: &str) -> RegistryError {
    RegistryError::NotFound {
        service: name.to_string(),
    }
}

impl ServiceRegistry for MemoryRegistry {
    fn is_installed(&self, name: &str) -> bool {
        self.shared.lock().contains_key(name)
    }

    fn is_running(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.shared.lock().get(name).is_some_and(|e| e.running))
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = %definition.name,
            display_name = %definition.display_name,
            binary_path = %definition.binary_path.display(), "install");
        self.require_privilege("install", &definition.name)?;

        let mut services = self.shared.lock();
        if services.contains_key(&definition.name) {
            return Err(RegistryError::AlreadyExists {
                service: definition.name.clone(),
            });
        }
        services.insert(
            definition.name.clone(),
            Entry {
                definition: definition.clone(),
                running: false,
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "remove");
        self.require_privilege("remove", name)?;
        self.shared.lock().remove(name).map(|_| ()).ok_or_else(|| not_found(name))
    }

    fn start(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "start");
        self.require_privilege("start", name)?;

        let mut services = self.shared.lock();
        let entry = services.get_mut(name).ok_or_else(|| not_found(name))?;
        if entry.running {
            return Err(RegistryError::InvalidState {
                operation: "start",
                service: name.to_string(),
                reason: "already running".to_string(),
            });
        }
        entry.running = true;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "stop");
        self.require_privilege("stop", name)?;

        let mut services = self.shared.lock();
        let entry = services.get_mut(name).ok_or_else(|| not_found(name))?;
        if !entry.running {
            return Err(RegistryError::InvalidState {
                operation: "stop",
                service: name.to_string(),
                reason: "not running".to_string(),
            });
        }
        entry.running = false;
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, grace_ms = self.restart_grace.as_millis() as u64, "restart");
        self.require_privilege("restart", name)?;
        {
            let mut services = self.shared.lock();
            let entry = services.get_mut(name).ok_or_else(|| not_found(name))?;
            entry.running = false;
        }

        let shared = Arc::clone(&self.shared);
        let grace = self.restart_grace;
        let service = name.to_string();
        std::thread::Builder::new()
            .name("registry-restart".to_string())
            .spawn(move || {
                std::thread::sleep(grace);
                if let Some(entry) = shared.lock().get_mut(&service) {
                    entry.running = true;
                }
            })
            .map(|_| ())
            .map_err(|e| RegistryError::Os {
                operation: "restart",
                code: e.raw_os_error().unwrap_or(-1) as u32,
            })
    }
}

//! # Service registry clients.
//!
//! Request/response operations against the control authority's persistent
//! service registry: install, remove, query, start, stop, restart. There is no
//! internal state machine here; each call maps to one authority request.
//!
//! - [`MemoryRegistry`]: in-process registry with an explicit privilege flag.
//! - `ScmRegistry` (Windows only): the Service Control Manager database.

mod memory;
#[cfg(windows)]
mod scm;

use std::path::PathBuf;

use crate::error::RegistryError;

pub use memory::MemoryRegistry;
#[cfg(windows)]
pub use scm::ScmRegistry;

/// Registry entry to create with [`ServiceRegistry::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: String,
    pub binary_path: PathBuf,
    /// Set after creation when non-empty.
    pub description: String,
}

impl ServiceDefinition {
    /// Definition with `display_name == name` and no description.
    pub fn new(name: impl Into<String>, binary_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            binary_path: binary_path.into(),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Installer surface of the control authority.
pub trait ServiceRegistry: Send + Sync {
    /// `false` when the service is unknown or the registry cannot be opened.
    fn is_installed(&self, name: &str) -> bool;

    /// Current run state. An unknown service is reported as not running.
    fn is_running(&self, name: &str) -> Result<bool, RegistryError>;

    /// Creates an own-process, auto-start service.
    fn install(&self, definition: &ServiceDefinition) -> Result<(), RegistryError>;

    /// Sends a best-effort stop, then deletes the service.
    fn remove(&self, name: &str) -> Result<(), RegistryError>;

    fn start(&self, name: &str) -> Result<(), RegistryError>;

    fn stop(&self, name: &str) -> Result<(), RegistryError>;

    /// Stop, grace delay, start. Returns once the restart has been scheduled.
    fn restart(&self, name: &str) -> Result<(), RegistryError>;
}

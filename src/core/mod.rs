//! Host core: activation, control dispatch and lifecycle.
//!
//! The public API from this module is [`ServiceHost`], its builder and
//! [`HostConfig`].
//!
//! Internal modules:
//! - [`reporter`]: single-owner status record and checkpoint discipline;
//! - [`dispatcher`]: non-blocking control handler on the authority thread;
//! - [`lifecycle`]: start/run/stop sequencing with heartbeats and a stop latch;
//! - [`host`]: wiring of the above around one authority activation.

mod builder;
mod config;
mod dispatcher;
mod host;
mod lifecycle;
mod reporter;

pub use builder::ServiceHostBuilder;
pub use config::HostConfig;
pub use host::ServiceHost;

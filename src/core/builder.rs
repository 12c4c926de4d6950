use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    authority::ControlAuthority,
    error::ServiceError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
    workload::WorkloadRef,
};

use super::{
    config::HostConfig,
    host::{ServiceHost, listen},
};

/// Builder for constructing a [`ServiceHost`].
pub struct ServiceHostBuilder {
    cfg: HostConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ServiceHostBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: HostConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive host events (controls, status reports, workload
    /// phases) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the host.
    ///
    /// This consumes the builder and initializes:
    /// - the host-owned multi-thread runtime
    /// - event bus for broadcasting
    /// - subscriber workers and the bus listener
    ///
    /// # Errors
    /// [`ServiceError::Runtime`] when the runtime cannot be created.
    pub fn build(
        self,
        authority: Arc<dyn ControlAuthority>,
        workload: WorkloadRef,
    ) -> Result<ServiceHost, ServiceError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.cfg.worker_threads_clamped())
            .thread_name(format!("{}-worker", self.cfg.service_name))
            .enable_time()
            .build()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutdown = CancellationToken::new();

        let listener = {
            let _enter = runtime.enter();
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            let rx = bus.subscribe();
            runtime.spawn(listen(rx, subs, shutdown.clone()))
        };

        Ok(ServiceHost::new_internal(
            self.cfg, runtime, bus, authority, workload, listener, shutdown,
        ))
    }
}

//! Hosted workload abstraction.
//!
//! - [`Workload`]: the three-phase contract (`start`, `run`, `stop`) the host drives.
//! - [`WorkloadFn`]: closure-backed workload for the common "just run this loop" case.
//! - [`WorkloadRef`]: shared handle (`Arc<dyn Workload>`).

mod workload;
mod workload_fn;

pub use workload::{Workload, WorkloadRef};
pub use workload_fn::WorkloadFn;

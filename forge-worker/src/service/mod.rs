//! Service layer
//!
//! Services contain the worker's business logic beyond HTTP plumbing.
//! Today that is the compute invocation; it is trait-based so the worker
//! loop can be tested against fakes and so other invocation strategies can
//! replace the child process.

mod compute;

// Re-export traits
pub use compute::ComputeInvoker;

// Re-export implementations
pub use compute::{ComputeError, ComputeSettings, ProcessComputeInvoker};

//! Repository layer
//!
//! Repositories abstract communication with the outside world: the control
//! plane and the storage behind capability URLs. They carry no business
//! logic; the HTTP implementations are the clients from `forge-client`.
//!
//! All repositories are trait-based to enable testing and mocking.

mod artifacts;
mod tasks;

// Re-export traits
pub use artifacts::ArtifactStore;
pub use tasks::TaskRepository;

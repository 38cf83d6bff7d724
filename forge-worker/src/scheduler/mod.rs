//! Scheduler layer for the worker
//!
//! This layer polls the control plane for work and drives each claimed task
//! through its pipeline, from lease to report. It owns the lease deadline
//! and the optional heartbeat that extends it.

pub mod lease;
pub mod poller;


pub use poller::TaskPoller;

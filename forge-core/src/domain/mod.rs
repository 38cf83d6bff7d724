//! Core domain types
//!
//! These types represent the entities a worker handles while it holds a task.
//! They are created by the control plane and only ever read or reported on
//! by the worker.

pub mod task;
pub mod transfer;

//! Forge Core
//!
//! Core types and abstractions shared by the forge worker crates.
//!
//! This crate contains:
//! - Domain types: Task, capability URLs, task outcomes
//! - DTOs: Wire shapes of the control-plane HTTP contract
//! - Parameter resolution: the frame-count precedence chain and its validator

pub mod domain;
pub mod dto;
pub mod params;

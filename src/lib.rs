// ABOUTME: Library root for drover - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod balancer;
pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod model;
pub mod remote;
pub mod scheduler;
pub mod store;
pub mod swarm;
pub mod types;

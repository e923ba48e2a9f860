// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution engine for gridflow.
//!
//! This crate turns a [`gridflow_network::Network`] into results:
//! - Deterministic topological scheduling with a creation-order tie-break
//! - Serial and wave-parallel executors with cooperative cancellation
//! - A controller that owns the network and exposes the command surface
//!
//! ## Architecture
//!
//! The scheduler only reads the graph; executors only walk a precomputed
//! order. All mutation funnels through the [`Controller`], which holds the
//! network behind a mutex so hosts can drive it from any thread.

pub mod controller;
pub mod executor;
pub mod scheduler;

pub use controller::Controller;
pub use executor::{
    CancellationToken, NetworkExecutor, ParallelExecutor, RunReport, SerialExecutor,
};
pub use scheduler::{CycleError, Scheduler, TopologicalScheduler};

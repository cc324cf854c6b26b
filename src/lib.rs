//! Heuristic CI failure triage.
//!
//! Two independent engines live here:
//! - [`heuristic`] scores how likely a changelist caused a failed build step
//!   by matching touched files, blamed lines and dependency rolls against the
//!   failure signal, then aggregates suspects across a build.
//! - [`flake`] resolves a commit position to the nearest build number from
//!   sparse, previously measured data points, falling back to a binary search
//!   over a build-info service.
//!
//! Network lookups sit behind the traits in [`oracles`]; [`providers`] ships
//! HTTP implementations of them.

pub mod auth;
pub mod config;
pub mod error;
pub mod flake;
pub mod heuristic;
pub mod oracles;
pub mod providers;

//! Core library for the cross-engine compatibility campaign service. A campaign describes a
//! target url and a matrix of (engine, user agent) combinations; every cycle the service expands
//! the matrix into render jobs, leases sessions from a capacity-constrained remote farm, captures
//! page snapshots, and compares successive runs for regressions.

/// Analyzer implementations and the static registry that resolves them by name.
pub mod analyzers;

/// The long-lived worker that executes one-off render jobs submitted outside of campaigns.
pub mod conductor;

/// Deserializable configuration sections shared by the bins.
pub mod config;

/// Shared constants; screen size presets and scheduling defaults.
pub mod constants;

/// The campaign driver; claims one campaign at a time and runs it end-to-end.
pub mod executor;

/// The remote render farm contract and its http client implementation.
pub mod farm;

/// The scheduling core; tab admission control, retry and sequencing.
pub mod scheduler;

/// Mongo-backed persistence for campaigns, jobs and comparison results.
pub mod store;

/// Document types persisted by the store and passed between modules.
pub mod types;

//! Indexer health monitoring with automatic remediation.
//!
//! An [`orchestrator::Orchestrator`] drives a health agent and an auto-heal
//! agent over Radarr, Sonarr and Prowlarr indexers. Outbound calls go through
//! a per-indexer circuit breaker with retry, probe results are cached, and
//! every run is recorded in metrics and an event log.

pub mod agents;
pub mod api;
pub mod app;
pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod resilience;
pub mod services;

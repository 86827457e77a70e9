//! Smart bin orchestrator
//!
//! Coordinates the lifecycle of waste classification jobs: devices request an upload
//! grant, an external classifier reports back through a callback, and a rule-based
//! decision picks the bin compartment.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

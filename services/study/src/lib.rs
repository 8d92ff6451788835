//! services/study/src/lib.rs
//!
//! The HiveMind study client library: workflow controllers, the HTTP
//! adapter for the knowledge service, and configuration.

pub mod adapters;
pub mod config;
pub mod error;
pub mod workflow;

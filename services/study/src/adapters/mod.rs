//! services/study/src/adapters/mod.rs
//!
//! Declares the adapter modules that implement the core service ports
//! against the remote knowledge service.

pub mod failure;
pub mod http;

//! Optional JSON Schema validation of command params.
//!
//! A [`SchemaRegistry`] maps a method name to a compiled JSON Schema
//! (2020-12 by default). The dispatcher consults it before a call is queued
//! for the host thread, so malformed params are rejected as
//! `InvalidParams` without costing a turn on the privileged thread.

pub mod config;
pub mod error;
pub mod registry;
mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;

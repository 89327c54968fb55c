//! Configuration and shared types
//!
//! Error type, wire constants, and deployment settings.

pub mod settings;
pub mod types;

//! Observability
//!
//! Explicit logger setup and structured security audit events.

pub mod audit;
pub mod logging;

//! staunch: secure launch links
//!
//! A secure link is a symbolic link to a trusted launcher whose inode carries
//! a `security.staunch` extended attribute naming the real target, the
//! security identity, and the supplementary groups it runs with.
//!
//! # Architecture
//!
//! ## Links ([`link`])
//! - [`link::record`]: `LinkRecord` and validated group ids
//! - [`link::codec`]: bounded, versioned attribute encoding
//! - [`link::store`]: link creation with read-back verification
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::xattr`]: extended attributes on the link itself
//! - [`kernel::fs`]: existence, symlink and executability predicates
//! - [`kernel::groups`]: supplementary group reconciliation
//! - [`kernel::capabilities`]: bounding set and capability sets
//! - [`kernel::process`]: the process-control seam used by the launch
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: type-state enforced privilege drop
//! - [`exec::launch`]: launch engine behind `stauncher`
//! - [`exec::identity`]: external identity service interface
//!
//! ## Administration ([`admin`])
//! `set`, `get` and `check` behind `staunch`.
//!
//! ## Observability ([`observability`])
//! - [`observability::logging`]: explicit, once-only logger setup
//! - [`observability::audit`]: structured audit events
//!
//! # Design Principles
//!
//! 1. **Fail closed** - no launch continues past a failed step
//! 2. **Types prevent errors** - the privilege drop cannot be reordered
//! 3. **Minimal unsafe** - thin wrappers in [`kernel`] with SAFETY notes
//! 4. **Bounded input** - attribute payloads are size-checked both ways

// Kernel Primitives
pub mod kernel;

// Secure links
pub mod link;

// Execution Control
pub mod exec;

// Administration
pub mod admin;

// Observability
pub mod observability;

// Configuration & shared types
pub mod config;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring shared by the staunch/stauncher binaries.
pub mod cli;

pub use config::types::{Result, StaunchError};
pub use exec::preexec;
pub use link::record::{GroupId, LinkRecord};

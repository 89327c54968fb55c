//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: fs -> xattr -> groups -> capabilities -> process

pub mod capabilities;
pub mod fs;
pub mod groups;
pub mod process;
pub mod xattr;

//! Testing infrastructure
//!
//! Fakes for the two privileged seams: the attribute store (writing
//! `security.*` attributes needs CAP_SYS_ADMIN) and the process controls
//! (setgroups, bounding set, capset, execve).

pub mod fakes;

pub use fakes::*;

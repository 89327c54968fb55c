//! Execution control
//!
//! Turns a link record into a running target: identity collaborator,
//! type-state privilege drop, and the launch engine tying them together.

pub mod identity;
pub mod launch;
pub mod preexec;

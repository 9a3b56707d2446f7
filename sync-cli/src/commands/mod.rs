//! CLI command implementations.

pub mod check;
pub mod queue;
pub mod status;
pub mod sync;

//! CLI command implementations.

pub mod poll;
pub mod remote;
pub mod serve;

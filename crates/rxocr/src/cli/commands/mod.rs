//! Command implementations.

pub mod recognize;
pub mod session;

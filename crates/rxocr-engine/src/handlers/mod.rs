//! Request handlers for daemon operations.

pub mod recognize;

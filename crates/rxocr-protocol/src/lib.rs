//! Protocol types for rxocr.
//!
//! This crate defines the recognition result types and the request and
//! response types used between the CLI and the recognition daemon.

mod recognition;
mod request;
mod response;

pub use recognition::*;
pub use request::*;
pub use response::*;

//! Endpoint groups exposed by the client.

pub mod health;

pub use health::*;

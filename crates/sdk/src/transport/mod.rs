//! Transport layer for the PRTG MCP SDK.

pub mod http;
pub mod sse;

pub use http::{Auth, HttpTransport, RawResponse};
pub use sse::{ListenerHandle, StreamListener};

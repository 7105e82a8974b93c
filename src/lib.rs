//! ur-web - embeddable static file server
//!
//! Core library: listener, connection and request sessions, header framing
//! and response composition for serving a single webroot over HTTP/1.x.

pub mod config;
pub mod error;
pub mod http;
pub mod server;

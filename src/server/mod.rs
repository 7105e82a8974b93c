//! Network listeners and TLS setup.

pub mod listener;
pub mod tls;

pub use listener::Server;

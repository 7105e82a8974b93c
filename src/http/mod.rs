//! HTTP/1.x protocol implementation.
//!
//! This module frames requests straight from the socket byte stream and
//! answers them from the webroot, with keep-alive connection reuse.
//!
//! # Architecture
//!
//! - **`connection`**: Per-socket loop running request sessions over a plain or TLS transport
//! - **`session`**: Routes one request to an outcome and emits the response
//! - **`parser`**: Frames header blocks out of the shared read buffer
//! - **`headers`**: Case-insensitive header field map
//! - **`request`**: Request line and header accessors
//! - **`response`**: Status codes and the response header composer
//! - **`writer`**: Timed writes and chunked body streaming
//! - **`range`**: `Range` header arithmetic
//! - **`encoding`**: gzip/deflate negotiation and compression
//! - **`mime`**: Content type lookup by file extension
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for request bytes (skipped if some are buffered)
//!        └──────┬──────┘
//!               │ Bytes available
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Frame header, route, send response
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! A zero-byte read in `Reading` is an orderly close. Framing failures,
//! timeouts and I/O errors end the connection without a response.

pub mod connection;
pub mod encoding;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod range;
pub mod request;
pub mod response;
pub mod session;
pub mod writer;

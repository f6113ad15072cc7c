//! Streaming HTTP/1.1 codec and WebSocket framing engine for the Tokio stack.
//!
//! Two subsystems make up the crate. The HTTP side turns an asynchronous
//! byte stream into start lines, validated header blocks and lazy bodies
//! (chunked, fixed-length or read-until-EOF, optionally gzip/deflate
//! decoded), and writes messages back out with optional compression and
//! chunked transfer-encoding. The WebSocket side completes the
//! [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455) upgrade over
//! that codec and then reads and writes frames: masking, fragmentation
//! reassembly, control-frame policing and the close handshake.
//!
//! Transport bytes enter through [`stream::ByteStream`] (fed by the pump in
//! [`connection`]), flow through [`message`]/[`body`] or
//! [`frame`]/[`session`], and leave through [`writer::MessageWriter`] or
//! [`frame::FrameWriter`].

pub mod body;
pub mod client;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod headers;
pub mod message;
pub mod request;
pub mod server;
pub mod session;
pub mod split;
pub mod stream;
pub mod writer;

#[cfg(test)]
mod tests;

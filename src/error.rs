use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    // General Errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // HTTP read path
    #[error("bad status line: {0:?}")]
    BadStatusLine(String),

    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    #[error("line too long: {0}")]
    LineTooLong(&'static str),

    #[error("invalid Content-Length: {0:?}")]
    InvalidLength(String),

    #[error("incomplete read: {0}")]
    IncompleteRead(String),

    #[error("unsupported content encoding: {0:?}")]
    UnsupportedEncoding(String),

    // Client URL handling
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in request URL")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    // Handshake Errors
    #[error("handshake error: {0}")]
    HandshakeError(&'static str),

    // Framing Errors
    #[error("websocket protocol error: {0}")]
    ProtocolError(&'static str),

    #[error("control frame with invalid payload size, can't be greater than 125")]
    FrameTooLarge,

    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("max frame size reached")]
    MaxFrameSize,

    #[error("max message size reached")]
    MaxMessageSize,
}

use std::time::Duration;

/// Hard cap on the total size of a header block, in bytes.
pub const MAX_HEADERS: usize = 32768;

/// Hard cap on a single header field, continuation lines included.
pub const MAX_HEADERFIELD_SIZE: usize = 8190;

/// Chunk size used when a chunked body is written without an explicit size.
pub const DEFAULT_CHUNK_SIZE: usize = 8196;

/// High-water mark for the `ByteStream` buffer.
pub const DEFAULT_BUFFER_LIMIT: usize = 65536;

/// Control frames can't carry more payload than this.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub max_frame_size: Option<usize>,
    pub max_message_size: Option<usize>,
}

impl Default for WsConfig {
    fn default() -> Self {
        WsConfig {
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Reuse the connection for further requests when neither side asked
    /// for a close. Off by default: one request per connection.
    pub keep_alive: bool,
    /// Include handler error text in 500 response bodies.
    pub debug: bool,
    pub buffer_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            keep_alive: false,
            debug: false,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for connect + request write + response-header read.
    pub timeout: Option<Duration>,
    /// Decode gzip/deflate response bodies transparently.
    pub compression: bool,
    pub buffer_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: None,
            compression: true,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        }
    }
}

use crate::body::Body;
use crate::config::ClientConfig;
use crate::connection::attach;
use crate::error::Error;
use crate::headers::Headers;
use crate::message::{read_message, read_response_status, HttpMessage, StatusLine};
use crate::request::HttpRequest;
use crate::stream::ByteStream;
use crate::writer::MessageWriter;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Read a response off the stream: status line, then the message with the
/// body strategy picked for it. HEAD responses and the statuses defined to
/// carry no payload (1xx, 204, 304) force a zero-length body regardless of
/// their headers.
pub async fn read_response(
    stream: &mut ByteStream,
    method: &str,
    compression: bool,
) -> Result<(StatusLine, HttpMessage), Error> {
    let status = read_response_status(stream).await?;
    let bodyless = method.eq_ignore_ascii_case("HEAD")
        || status.code == 204
        || status.code == 304
        || (100..200).contains(&status.code);
    let hint = if bodyless { Some(0) } else { None };
    let message = read_message(stream, status.version, hint, compression, true).await?;
    Ok((status, message))
}

/// A response with its connection still attached; the body reads lazily.
pub struct ClientResponse {
    pub status: u16,
    pub reason: String,
    pub version: (u8, u8),
    pub headers: Headers,
    pub close_after: bool,
    body: Body,
    stream: ByteStream,
    writer: MessageWriter<OwnedWriteHalf>,
    pump: JoinHandle<()>,
}

impl ClientResponse {
    /// Drain the rest of the body.
    pub async fn body(&mut self) -> Result<Vec<u8>, Error> {
        self.body.read(&mut self.stream).await
    }

    /// Next decoded body chunk, `None` once the body is exhausted.
    pub async fn body_chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        self.body.chunk(&mut self.stream).await
    }

    /// Shut the write side down, signalling we are done with the connection.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.writer.get_mut().shutdown().await?;
        Ok(())
    }
}

impl Drop for ClientResponse {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Send one request and read the response headers, with default options.
pub async fn fetch(request: &HttpRequest) -> Result<ClientResponse, Error> {
    fetch_with_config(request, &ClientConfig::default()).await
}

/// Send one request, racing connect + write + header read against the
/// configured deadline.
pub async fn fetch_with_config(
    request: &HttpRequest,
    config: &ClientConfig,
) -> Result<ClientResponse, Error> {
    match config.timeout {
        Some(deadline) => timeout(deadline, open_and_send(request, config)).await?,
        None => open_and_send(request, config).await,
    }
}

async fn open_and_send(
    request: &HttpRequest,
    config: &ClientConfig,
) -> Result<ClientResponse, Error> {
    let socket = TcpStream::connect((request.host.as_str(), request.port)).await?;
    let (read_half, write_half) = socket.into_split();

    let mut stream = ByteStream::with_limit(config.buffer_limit);
    let pump = attach(read_half, &stream);
    let mut writer = MessageWriter::new(write_half);

    request.send(&mut writer).await?;
    let (status, message) = read_response(&mut stream, &request.method, config.compression).await?;

    Ok(ClientResponse {
        status: status.code,
        reason: status.reason,
        version: status.version,
        headers: message.headers,
        close_after: message.close_after,
        body: message.body,
        stream,
        writer,
        pump,
    })
}

use crate::client::read_response;
use crate::config::WsConfig;
use crate::connection::attach;
use crate::error::Error;
use crate::frame::{FrameWriter, Role};
use crate::headers::Headers;
use crate::message::{read_message, read_request_line};
use crate::request::HttpRequest;
use crate::session::WsSession;
use crate::stream::ByteStream;
use crate::writer::MessageWriter;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::random;
use sha1::{Digest, Sha1};
use tokio::io::{split, AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use url::Url;

const UUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Accept-key proof: base64(SHA1(key + magic)).
pub fn generate_websocket_accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(UUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Client nonce: base64 of 16 random bytes.
pub fn generate_websocket_key() -> String {
    let random_bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(random_bytes)
}

/// Complete a server-side upgrade over a freshly accepted transport.
///
/// Reads the upgrade request through the HTTP codec and answers either
/// `101 Switching Protocols` or, when the request doesn't qualify, a
/// `400 Bad Request` with `Connection: close` before failing.
pub async fn accept_async<S>(stream: S) -> Result<WsSession<WriteHalf<S>>, Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    accept_async_with_config(stream, WsConfig::default()).await
}

pub async fn accept_async_with_config<S>(
    stream: S,
    config: WsConfig,
) -> Result<WsSession<WriteHalf<S>>, Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = split(stream);
    let mut bstream = ByteStream::new();
    let pump = attach(read_half, &bstream);
    let mut writer = MessageWriter::new(write_half);

    let request = read_request_line(&mut bstream).await?;
    let message = read_message(&mut bstream, request.version, None, false, false).await?;

    match check_upgrade(&message.headers) {
        Ok(accept_value) => {
            writer
                .write_status_line((1, 1), 101, "Switching Protocols")
                .await?;
            let mut headers = Headers::new();
            headers.push("Upgrade", "websocket");
            headers.push("Connection", "Upgrade");
            headers.push("Sec-WebSocket-Accept", accept_value);
            writer.write_headers(&headers).await?;
            writer.end_headers().await?;
            writer.flush().await?;

            Ok(WsSession::new(
                bstream,
                FrameWriter::new(writer.into_inner(), Role::Server),
                config,
                Some(pump),
            ))
        }
        Err(err) => {
            writer.write_status_line((1, 1), 400, "Bad Request").await?;
            let mut headers = Headers::new();
            headers.push("Connection", "close");
            headers.push("Content-Length", "0");
            writer.write_headers(&headers).await?;
            writer.end_headers().await?;
            writer.flush().await?;
            Err(err)
        }
    }
}

// The four conditions a qualifying upgrade request must meet.
fn check_upgrade(headers: &Headers) -> Result<String, Error> {
    let upgrade = headers.get("UPGRADE").unwrap_or("");
    if !upgrade.to_ascii_lowercase().contains("websocket") {
        return Err(Error::HandshakeError("no websocket upgrade header"));
    }

    let connection = headers.get("CONNECTION").unwrap_or("");
    if !connection.to_ascii_lowercase().contains("upgrade") {
        return Err(Error::HandshakeError("no connection upgrade header"));
    }

    let version = headers.get("SEC-WEBSOCKET-VERSION").unwrap_or("").trim();
    if version != "13" && version != "8" {
        return Err(Error::HandshakeError("unsupported websocket version"));
    }

    let key = headers
        .get("SEC-WEBSOCKET-KEY")
        .ok_or(Error::HandshakeError("no Sec-WebSocket-Key header present"))?
        .trim();
    let decoded = BASE64_STANDARD
        .decode(key)
        .map_err(|_| Error::HandshakeError("Sec-WebSocket-Key is not valid base64"))?;
    if decoded.len() != 16 {
        return Err(Error::HandshakeError("Sec-WebSocket-Key must be 16 bytes"));
    }

    Ok(generate_websocket_accept_value(key))
}

/// Open a TCP connection to a `ws://` (or plain `http://`) URL and complete
/// the client side of the upgrade.
pub async fn connect_async(url: &str) -> Result<WsSession<OwnedWriteHalf>, Error> {
    connect_async_with_config(url, WsConfig::default()).await
}

pub async fn connect_async_with_config(
    url: &str,
    config: WsConfig,
) -> Result<WsSession<OwnedWriteHalf>, Error> {
    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "ws" | "http") {
        return Err(Error::InvalidSchemeURL);
    }
    let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
    let port = parsed.port().unwrap_or(80);

    let socket = TcpStream::connect((host.as_str(), port)).await?;
    let (read_half, write_half) = socket.into_split();
    client_handshake(read_half, write_half, url, config).await
}

/// Client-side upgrade over an already connected transport; used directly
/// by tests and by in-process transports.
pub async fn connect_async_with_stream<S>(
    stream: S,
    url: &str,
) -> Result<WsSession<WriteHalf<S>>, Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = split(stream);
    client_handshake(read_half, write_half, url, WsConfig::default()).await
}

async fn client_handshake<R, W>(
    read_half: R,
    write_half: W,
    url: &str,
    config: WsConfig,
) -> Result<WsSession<W>, Error>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut bstream = ByteStream::new();
    let pump = attach(read_half, &bstream);
    let mut writer = MessageWriter::new(write_half);

    let key = generate_websocket_key();
    let request = HttpRequest::new("GET", url)?
        .header("Upgrade", "WebSocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", key.clone());
    request.send(&mut writer).await?;

    let (status, message) = read_response(&mut bstream, "GET", false).await?;
    if status.code != 101 {
        return Err(Error::HandshakeError("invalid response status"));
    }

    let upgrade = message.headers.get("UPGRADE").unwrap_or("").trim();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::HandshakeError("invalid upgrade header"));
    }

    let connection = message.headers.get("CONNECTION").unwrap_or("").trim();
    if !connection.eq_ignore_ascii_case("upgrade") {
        return Err(Error::HandshakeError("invalid connection header"));
    }

    let accept = message.headers.get("SEC-WEBSOCKET-ACCEPT").unwrap_or("").trim();
    if accept != generate_websocket_accept_value(&key) {
        return Err(Error::HandshakeError("invalid challenge response"));
    }

    Ok(WsSession::new(
        bstream,
        FrameWriter::new(writer.into_inner(), Role::Client),
        config,
        Some(pump),
    ))
}

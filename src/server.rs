use crate::config::{ServerConfig, DEFAULT_CHUNK_SIZE};
use crate::connection::attach;
use crate::error::Error;
use crate::headers::Headers;
use crate::message::{read_message, read_request_line, RequestLine};
use crate::stream::ByteStream;
use crate::writer::MessageWriter;
use log::{debug, error, info};
use rand::random;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

const DEFAULT_ERROR_MESSAGE: &str = "\
<html>
  <head>
    <title>{status} {reason}</title>
  </head>
  <body>
    <h1>{status} {reason}</h1>
    {mesg}
  </body>
</html>";

fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "",
    }
}

// Every connection gets an id for its log lines.
fn connection_id() -> Uuid {
    Uuid::new_v8(random::<[u8; 16]>())
}

/// One parsed inbound request, body already drained.
pub struct ServerRequest {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub method: String,
    pub uri: String,
    pub version: (u8, u8),
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// What a handler gives back.
pub struct ServerResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ServerResponse {
    pub fn new(status: u16) -> Self {
        ServerResponse {
            status,
            reason: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_reason(status: u16, reason: impl Into<String>) -> Self {
        ServerResponse {
            status,
            reason: reason.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = data.into();
        self
    }
}

/// Accept loop: one task per connection, each running the dispatcher.
pub async fn serve<H, Fut>(
    listener: TcpListener,
    handler: H,
    config: ServerConfig,
) -> std::io::Result<()>
where
    H: Fn(ServerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ServerResponse, Error>> + Send + 'static,
{
    let handler = Arc::new(handler);
    loop {
        let (socket, peer) = listener.accept().await?;
        let handler = handler.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let id = connection_id();
            info!("{} connected: {}", id, peer);
            if let Err(err) = handle_connection(socket, peer, id, handler, &config).await {
                debug!("{} connection ended with error: {}", id, err);
            }
            info!("{} disconnected", id);
        });
    }
}

/// Dispatcher for one connection: read a request, run the handler, write the
/// response; 400 on a malformed request, 500 on handler failure. Whether the
/// connection survives the response depends on the keep-alive knob and both
/// sides' Connection headers.
async fn handle_connection<H, Fut>(
    socket: TcpStream,
    peer: SocketAddr,
    id: Uuid,
    handler: Arc<H>,
    config: &ServerConfig,
) -> Result<(), Error>
where
    H: Fn(ServerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ServerResponse, Error>> + Send + 'static,
{
    let (read_half, write_half) = socket.into_split();
    let mut stream = ByteStream::with_limit(config.buffer_limit);
    let _pump = attach(read_half, &stream);
    let mut writer = MessageWriter::new(write_half);

    loop {
        if !stream.wait_readable().await {
            break;
        }

        let parsed = read_one_request(&mut stream).await;
        let (rline, headers, body, close_requested) = match parsed {
            Ok(ok) => ok,
            Err(err) => {
                error!("{} malformed request: {}", id, err);
                write_error(&mut writer, 400, &err.to_string(), config.debug).await?;
                break;
            }
        };

        debug!("{} {} {}", id, rline.method, rline.uri);
        let request = ServerRequest {
            id,
            peer,
            method: rline.method.clone(),
            uri: rline.uri.clone(),
            version: rline.version,
            headers,
            body,
        };

        let response = match (*handler)(request).await {
            Ok(response) => response,
            Err(err) => {
                error!("{} handler failed: {}", id, err);
                write_error(&mut writer, 500, &err.to_string(), config.debug).await?;
                break;
            }
        };

        let keep_open = config.keep_alive && !close_requested;
        let closing = write_response(&mut writer, &rline, response, keep_open).await?;
        if closing {
            break;
        }
    }

    writer.get_mut().shutdown().await.ok();
    Ok(())
}

async fn read_one_request(
    stream: &mut ByteStream,
) -> Result<(RequestLine, Headers, Vec<u8>, bool), Error> {
    let rline = read_request_line(stream).await?;
    let mut message = read_message(stream, rline.version, None, true, false).await?;
    let body = message.body.read(stream).await?;
    Ok((rline, message.headers, body, message.close_after))
}

async fn write_response<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut MessageWriter<W>,
    rline: &RequestLine,
    response: ServerResponse,
    keep_open: bool,
) -> Result<bool, Error> {
    let ServerResponse {
        status,
        reason,
        mut headers,
        mut body,
    } = response;

    let declared: Option<u64> = headers
        .get("Content-Length")
        .and_then(|value| value.trim().parse().ok());
    let mut chunked = headers
        .get("Transfer-Encoding")
        .map(|value| value.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    // chunk 1.1 responses with no declared length, except the statuses that
    // are guaranteed bodyless
    if declared.is_none() && !chunked && rline.version > (1, 0) && status != 204 && status != 304 {
        chunked = true;
        headers.push("Transfer-Encoding", "chunked");
    }
    if declared.is_none() && !chunked {
        headers.push("Content-Length", body.len().to_string());
    }

    let closing = !keep_open
        || headers
            .get("Connection")
            .map(|value| value.to_ascii_lowercase().contains("close"))
            .unwrap_or(false);
    if headers.get("Connection").is_none() {
        headers.push("Connection", if closing { "close" } else { "keep-alive" });
    }

    // never write more than the declared length
    if let Some(limit) = declared {
        if (body.len() as u64) > limit {
            body.truncate(limit as usize);
        }
    }

    writer.write_status_line(rline.version, status, &reason).await?;
    writer.write_headers(&headers).await?;
    writer.end_headers().await?;
    if chunked {
        writer.write_body(&body, Some(DEFAULT_CHUNK_SIZE), None).await?;
    } else if !body.is_empty() {
        writer.write_raw(&body).await?;
    }
    writer.flush().await?;

    Ok(closing)
}

async fn write_error<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut MessageWriter<W>,
    status: u16,
    detail: &str,
    debug: bool,
) -> Result<(), Error> {
    let reason = reason_phrase(status);
    let mesg = if debug {
        format!("<pre>{}</pre>", detail)
    } else {
        String::new()
    };
    let html = DEFAULT_ERROR_MESSAGE
        .replace("{status}", &status.to_string())
        .replace("{reason}", reason)
        .replace("{mesg}", &mesg);

    writer.write_status_line((1, 1), status, reason).await?;
    let mut headers = Headers::new();
    headers.push("Connection", "close");
    headers.push("Content-Type", "text/html");
    headers.push("Content-Length", html.len().to_string());
    writer.write_headers(&headers).await?;
    writer.end_headers().await?;
    writer.write_raw(html.as_bytes()).await?;
    writer.flush().await
}

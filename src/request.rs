use crate::config::DEFAULT_CHUNK_SIZE;
use crate::decoder::ContentCoding;
use crate::error::Error;
use crate::headers::Headers;
use crate::writer::MessageWriter;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use tokio::io::AsyncWrite;
use url::Url;

/// An outbound HTTP request under construction.
///
/// The URL is split once at construction time; the builder methods configure
/// headers, body and framing, and [`send`](HttpRequest::send) emits the whole
/// request through a [`MessageWriter`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub version: (u8, u8),
    /// Request target: path plus query string.
    pub path: String,
    /// Host to open the TCP connection to.
    pub host: String,
    pub port: u16,
    /// Value for the Host header: host, plus the port when the URL had one.
    pub netloc: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    compress: Option<ContentCoding>,
    chunked: Option<usize>,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Result<Self, Error> {
        let parsed = Url::parse(url)?;

        let default_port = match parsed.scheme() {
            "http" | "ws" => 80,
            _ => return Err(Error::InvalidSchemeURL),
        };
        let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
        let port = parsed.port().unwrap_or(default_port);

        // the Host header carries the port only when the URL spelled one out
        let netloc = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };

        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let path = if path.is_empty() {
            String::from("/")
        } else {
            path
        };

        Ok(HttpRequest {
            method: method.to_ascii_uppercase(),
            version: (1, 1),
            path,
            host,
            port,
            netloc,
            headers: Headers::new(),
            body: Vec::new(),
            compress: None,
            chunked: None,
        })
    }

    pub fn version(mut self, version: (u8, u8)) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Basic access authentication.
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let token = BASE64_STANDARD.encode(format!("{}:{}", user, password));
        self.header("Authorization", format!("Basic {}", token))
    }

    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = data.into();
        self
    }

    /// Compress the body; implies chunked transfer-encoding.
    pub fn compress(mut self, coding: ContentCoding) -> Self {
        self.compress = Some(coding);
        self
    }

    /// Compress with the default coding, deflate.
    pub fn compressed(self) -> Self {
        self.compress(ContentCoding::Deflate)
    }

    /// Use chunked transfer-encoding with the given chunk size, or the
    /// default of [`DEFAULT_CHUNK_SIZE`] bytes.
    pub fn chunked(mut self, size: Option<usize>) -> Self {
        self.chunked = Some(size.unwrap_or(DEFAULT_CHUNK_SIZE));
        self
    }

    /// Emit the whole request: start line, headers, body.
    ///
    /// Default headers are applied only when absent. An explicit
    /// Content-Encoding header, or the compress option, switches the body to
    /// the compress-then-chunk pipeline; the chunked option alone frames the
    /// body without compressing. Otherwise the body travels with a measured
    /// Content-Length.
    pub async fn send<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut MessageWriter<W>,
    ) -> Result<(), Error> {
        let mut headers = self.headers.clone();

        if headers.get("Accept").is_none() {
            headers.push("Accept", "*/*");
        }
        if headers.get("Accept-Encoding").is_none() {
            headers.push("Accept-Encoding", "gzip, deflate");
        }
        if headers.get("Host").is_none() {
            headers.push("Host", self.netloc.clone());
        }

        let mut coding = None;
        let declared_encoding = headers.get("Content-Encoding").map(str::to_string);
        if let Some(value) = declared_encoding {
            coding = Some(
                ContentCoding::from_value(&value)
                    .ok_or(Error::UnsupportedEncoding(value))?,
            );
        } else if let Some(chosen) = self.compress {
            headers.push("Content-Encoding", chosen.name());
            coding = Some(chosen);
        }

        let mut chunk_size = self.chunked;
        if coding.is_some() && chunk_size.is_none() {
            chunk_size = Some(DEFAULT_CHUNK_SIZE);
        }

        if chunk_size.is_some() {
            headers.replace("Transfer-Encoding", "chunked");
            headers.remove("Content-Length");
        } else if !self.body.is_empty() && headers.get("Content-Length").is_none() {
            headers.push("Content-Length", self.body.len().to_string());
        }

        writer
            .write_request_line(&self.method, &self.path, self.version)
            .await?;
        writer.write_headers(&headers).await?;
        writer.end_headers().await?;
        if chunk_size.is_some() || !self.body.is_empty() {
            writer.write_body(&self.body, chunk_size, coding).await?;
        }
        writer.flush().await
    }
}

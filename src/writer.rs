use crate::decoder::ContentCoding;
use crate::encoder::Encoder;
use crate::error::Error;
use crate::headers::Headers;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Streaming writer for one side of a connection: start line, header block,
/// then a body that is optionally compressed and/or chunk-framed.
pub struct MessageWriter<W> {
    transport: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(transport: W) -> Self {
        MessageWriter { transport }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.transport
    }

    pub fn into_inner(self) -> W {
        self.transport
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.transport.write_all(data).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.transport.flush().await?;
        Ok(())
    }

    pub async fn write_request_line(
        &mut self,
        method: &str,
        path: &str,
        version: (u8, u8),
    ) -> Result<(), Error> {
        let line = format!("{} {} HTTP/{}.{}\r\n", method, path, version.0, version.1);
        self.write_raw(line.as_bytes()).await
    }

    pub async fn write_status_line(
        &mut self,
        version: (u8, u8),
        code: u16,
        reason: &str,
    ) -> Result<(), Error> {
        let line = format!("HTTP/{}.{} {} {}\r\n", version.0, version.1, code, reason);
        self.write_raw(line.as_bytes()).await
    }

    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), Error> {
        let mut block = String::new();
        for (name, value) in headers.iter() {
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
        self.write_raw(block.as_bytes()).await
    }

    /// Blank line terminating the header block.
    pub async fn end_headers(&mut self) -> Result<(), Error> {
        self.write_raw(b"\r\n").await
    }

    /// One chunk in chunked transfer-encoding framing. An empty chunk is a
    /// close signal and writes nothing; the terminator comes from
    /// [`write_chunked_eof`](Self::write_chunked_eof).
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let size = format!("{:x}\r\n", data.len());
        self.write_raw(size.as_bytes()).await?;
        self.write_raw(data).await?;
        self.write_raw(b"\r\n").await
    }

    pub async fn write_chunked_eof(&mut self) -> Result<(), Error> {
        self.write_raw(b"0\r\n\r\n").await
    }

    /// Emit a materialized body. Compression runs before chunking, so the
    /// chunk sizes on the wire reflect the compressed output.
    pub async fn write_body(
        &mut self,
        body: &[u8],
        chunk_size: Option<usize>,
        compress: Option<ContentCoding>,
    ) -> Result<(), Error> {
        let compressed;
        let payload = match compress {
            Some(coding) => {
                compressed = Encoder::compress_all(coding, body)?;
                compressed.as_slice()
            }
            None => body,
        };
        match chunk_size {
            Some(size) => {
                for chunk in payload.chunks(size.max(1)) {
                    self.write_chunk(chunk).await?;
                }
                self.write_chunked_eof().await
            }
            None => self.write_raw(payload).await,
        }
    }
}

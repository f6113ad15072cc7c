use crate::error::Error;
use flate2::write::{DeflateDecoder, GzDecoder};
use std::io::Write;
use std::mem;

/// Content codings the codec understands. "deflate" is the raw stream,
/// no zlib wrapper, on both the read and the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    pub fn name(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }

    /// Match a `Content-Encoding` value, gzip taking precedence.
    pub fn from_value(value: &str) -> Option<Self> {
        let value = value.to_ascii_lowercase();
        if value.contains("gzip") {
            Some(ContentCoding::Gzip)
        } else if value.contains("deflate") {
            Some(ContentCoding::Deflate)
        } else {
            None
        }
    }
}

enum Backend {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(DeflateDecoder<Vec<u8>>),
}

// A decoder that reached the end of its stream stops consuming input and
// reports no progress; whatever follows is trailing garbage, not an error.
fn feed_decoder<W: Write>(decoder: &mut W, mut chunk: &[u8]) -> std::io::Result<()> {
    while !chunk.is_empty() {
        let consumed = decoder.write(chunk)?;
        if consumed == 0 {
            break;
        }
        chunk = &chunk[consumed..];
    }
    Ok(())
}

/// Streaming decompressor for a message body, fed one chunk at a time.
pub struct Decoder {
    backend: Option<Backend>,
}

impl Decoder {
    pub fn new(coding: ContentCoding) -> Self {
        let backend = match coding {
            ContentCoding::Gzip => Backend::Gzip(GzDecoder::new(Vec::new())),
            ContentCoding::Deflate => Backend::Deflate(DeflateDecoder::new(Vec::new())),
        };
        Decoder {
            backend: Some(backend),
        }
    }

    /// Feed one compressed chunk, returning whatever decompressed output it
    /// produced. A chunk ending mid-block legitimately produces nothing.
    /// Input past the logical end of the stream is left unconsumed.
    pub fn decompress(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Error> {
        match self.backend.as_mut() {
            Some(Backend::Gzip(dec)) => {
                feed_decoder(dec, chunk)?;
                Ok(mem::take(dec.get_mut()))
            }
            Some(Backend::Deflate(dec)) => {
                feed_decoder(dec, chunk)?;
                Ok(mem::take(dec.get_mut()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Flush the remaining output. Garbage trailing the logical end of the
    /// compressed stream is ignored here; errors mid-stream are not.
    pub fn finish(&mut self) -> Result<Vec<u8>, Error> {
        let result = match self.backend.take() {
            Some(Backend::Gzip(dec)) => dec.finish(),
            Some(Backend::Deflate(dec)) => dec.finish(),
            None => return Ok(Vec::new()),
        };
        Ok(result.unwrap_or_default())
    }
}

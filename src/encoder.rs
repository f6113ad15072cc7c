use crate::decoder::ContentCoding;
use crate::error::Error;
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use std::io::Write;
use std::mem;

enum Backend {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

/// Streaming compressor feeding the writer's compress-then-chunk pipeline.
pub struct Encoder {
    backend: Option<Backend>,
}

impl Encoder {
    pub fn new(coding: ContentCoding) -> Self {
        let backend = match coding {
            ContentCoding::Gzip => {
                Backend::Gzip(GzEncoder::new(Vec::new(), Compression::default()))
            }
            ContentCoding::Deflate => {
                Backend::Deflate(DeflateEncoder::new(Vec::new(), Compression::default()))
            }
        };
        Encoder {
            backend: Some(backend),
        }
    }

    /// Compress one chunk, flushing so the output can go on the wire
    /// immediately.
    pub fn compress(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Error> {
        match self.backend.as_mut() {
            Some(Backend::Gzip(enc)) => {
                enc.write_all(chunk)?;
                enc.flush()?;
                Ok(mem::take(enc.get_mut()))
            }
            Some(Backend::Deflate(enc)) => {
                enc.write_all(chunk)?;
                enc.flush()?;
                Ok(mem::take(enc.get_mut()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Terminate the compressed stream and return its tail.
    pub fn finish(&mut self) -> Result<Vec<u8>, Error> {
        match self.backend.take() {
            Some(Backend::Gzip(enc)) => Ok(enc.finish()?),
            Some(Backend::Deflate(enc)) => Ok(enc.finish()?),
            None => Ok(Vec::new()),
        }
    }

    /// One-shot helper for bodies that are already materialized.
    pub fn compress_all(coding: ContentCoding, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut encoder = Encoder::new(coding);
        match encoder.backend.as_mut() {
            Some(Backend::Gzip(enc)) => enc.write_all(data)?,
            Some(Backend::Deflate(enc)) => enc.write_all(data)?,
            None => unreachable!(),
        }
        encoder.finish()
    }
}

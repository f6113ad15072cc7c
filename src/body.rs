use crate::decoder::{ContentCoding, Decoder};
use crate::error::Error;
use crate::headers::latin1;
use crate::stream::ByteStream;

/// Payload strategy for one HTTP message.
///
/// Each call to [`read`](BodyReader::read) yields the next lazy chunk of the
/// body; an empty chunk signals the end.
pub enum BodyReader {
    Chunked { finished: bool },
    Length { remaining: u64 },
    Eof { finished: bool },
}

impl BodyReader {
    pub fn chunked() -> Self {
        BodyReader::Chunked { finished: false }
    }

    pub fn length(n: u64) -> Self {
        BodyReader::Length { remaining: n }
    }

    pub fn eof() -> Self {
        BodyReader::Eof { finished: false }
    }

    pub async fn read(&mut self, stream: &mut ByteStream) -> Result<Vec<u8>, Error> {
        match self {
            BodyReader::Chunked { finished } => {
                if *finished {
                    return Ok(Vec::new());
                }
                let size = read_chunk_size(stream).await?;
                if size > 0 {
                    let data = stream.read_exactly(size).await?;
                    // toss the CRLF at the end of the chunk
                    stream.read_exactly(2).await?;
                    return Ok(data);
                }
                // terminator seen; discard the trailer section
                loop {
                    let line = stream.readline().await;
                    if line == b"\r\n" || line == b"\n" || line.is_empty() {
                        break;
                    }
                }
                *finished = true;
                Ok(Vec::new())
            }
            BodyReader::Length { remaining } => {
                if *remaining == 0 {
                    return Ok(Vec::new());
                }
                let n = usize::try_from(*remaining)
                    .map_err(|_| Error::InvalidLength(remaining.to_string()))?;
                let data = stream.read_exactly(n).await?;
                *remaining = 0;
                Ok(data)
            }
            BodyReader::Eof { finished } => {
                if *finished {
                    return Ok(Vec::new());
                }
                *finished = true;
                Ok(stream.read_to_eof().await)
            }
        }
    }
}

// Chunk size line: hex digits, optionally followed by ";ext" to strip.
async fn read_chunk_size(stream: &mut ByteStream) -> Result<usize, Error> {
    let line = stream.readline().await;
    let mut text = latin1(&line);
    if let Some(semi) = text.find(';') {
        text.truncate(semi);
    }
    usize::from_str_radix(text.trim(), 16)
        .map_err(|_| Error::IncompleteRead("malformed chunk size line".to_string()))
}

/// A message body: a [`BodyReader`] plus an optional decompression stage.
pub struct Body {
    reader: BodyReader,
    decoder: Option<Decoder>,
    finished: bool,
}

impl Body {
    pub fn new(reader: BodyReader, coding: Option<ContentCoding>) -> Self {
        Body {
            reader,
            decoder: coding.map(Decoder::new),
            finished: false,
        }
    }

    /// Next decoded chunk of the body, `None` once it is exhausted.
    pub async fn chunk(&mut self, stream: &mut ByteStream) -> Result<Option<Vec<u8>>, Error> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let raw = self.reader.read(stream).await?;
            if raw.is_empty() {
                self.finished = true;
                if let Some(decoder) = self.decoder.as_mut() {
                    let tail = decoder.finish()?;
                    if !tail.is_empty() {
                        return Ok(Some(tail));
                    }
                }
                return Ok(None);
            }
            let out = match self.decoder.as_mut() {
                Some(decoder) => decoder.decompress(&raw)?,
                None => raw,
            };
            // a compressed chunk may end mid-block and decode to nothing yet
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    /// Drain the remainder of the body in one call.
    pub async fn read(&mut self, stream: &mut ByteStream) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.chunk(stream).await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

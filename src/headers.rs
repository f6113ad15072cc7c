use crate::config::{MAX_HEADERFIELD_SIZE, MAX_HEADERS};
use crate::error::Error;
use crate::stream::ByteStream;

// RFC 7230 forbids these in a field name; the set also rejects embedded
// whitespace left over after canonicalization.
const FORBIDDEN_NAME_BYTES: &[u8] = b"()<>@,;:[]={} \t\\\"";

fn forbidden_name_byte(b: u8) -> bool {
    b <= 0x1F || b == 0x7F || FORBIDDEN_NAME_BYTES.contains(&b)
}

/// Bytes to text, one char per byte, the way header fields are defined.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Ordered collection of header fields.
///
/// Parsed names arrive canonicalized to uppercase; names pushed by user code
/// keep their spelling and all lookups compare case-insensitively. Duplicate
/// names are kept in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value for `name`, or append when absent.
    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.push(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn end_of_block(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n" || line.is_empty()
}

/// Read an RFC 7230 header block off the stream.
///
/// Names are canonicalized (surrounding whitespace stripped, uppercased) and
/// validated against the forbidden byte set. Obsolete line folding is
/// accepted: a line starting with SP or TAB continues the previous value and
/// is appended verbatim, its leading whitespace preserved. Size caps:
/// [`MAX_HEADERS`] for the whole block, [`MAX_HEADERFIELD_SIZE`] for one
/// field including its continuations, both counted over the raw line bytes.
pub async fn read_headers(stream: &mut ByteStream) -> Result<Headers, Error> {
    let mut headers = Headers::new();
    let mut total = 0usize;
    // a peeked line that turned out to start the next field
    let mut pending: Option<Vec<u8>> = None;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => stream.readline().await,
        };
        if end_of_block(&line) {
            break;
        }

        total += line.len();
        if total > MAX_HEADERS {
            return Err(Error::LineTooLong("max buffer headers"));
        }

        let colon = match line.iter().position(|&b| b == b':') {
            Some(pos) => pos,
            None => return Err(Error::InvalidHeader(latin1(&line).trim().to_string())),
        };

        let mut field_len = line.len();
        let raw_name = latin1(&line[..colon]);
        let name = raw_name
            .trim_end_matches([' ', '\t'])
            .to_ascii_uppercase();
        if name.bytes().any(forbidden_name_byte) {
            return Err(Error::InvalidHeaderName(name));
        }
        let name = name.trim().to_string();

        let mut value_parts = vec![latin1(&line[colon + 1..]).trim_start().to_string()];

        // consume continuation lines
        loop {
            let next = stream.readline().await;
            if next.first().is_some_and(|&b| b == b' ' || b == b'\t') {
                total += next.len();
                if total > MAX_HEADERS {
                    return Err(Error::LineTooLong("max buffer headers"));
                }
                field_len += next.len();
                if field_len > MAX_HEADERFIELD_SIZE {
                    return Err(Error::LineTooLong("limit request headers fields size"));
                }
                value_parts.push(latin1(&next));
            } else {
                pending = Some(next);
                break;
            }
        }

        if field_len > MAX_HEADERFIELD_SIZE {
            return Err(Error::LineTooLong("limit request headers fields size"));
        }

        let value = value_parts.concat().trim_end().to_string();
        headers.push(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(data: &[u8]) -> ByteStream {
        let stream = ByteStream::new();
        stream.feed(data);
        stream.feed_eof();
        stream
    }

    #[tokio::test]
    async fn parses_and_canonicalizes() {
        let mut stream = stream_with(b"content-type: text/html\r\nX-Thing :  spaced  \r\n\r\n");
        let headers = read_headers(&mut stream).await.unwrap();
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(headers.get("x-thing"), Some("spaced"));
        assert_eq!(headers.len(), 2);
    }

    #[tokio::test]
    async fn continuation_keeps_leading_whitespace() {
        let mut stream = stream_with(b"Warning: first\r\n\tsecond\r\n\r\n");
        let headers = read_headers(&mut stream).await.unwrap();
        assert_eq!(headers.get("WARNING"), Some("first\r\n\tsecond"));
    }

    #[tokio::test]
    async fn rejects_missing_colon() {
        let mut stream = stream_with(b"no colon here\r\n\r\n");
        assert!(matches!(
            read_headers(&mut stream).await,
            Err(Error::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn rejects_forbidden_name_bytes() {
        let mut stream = stream_with(b"Bad(Name): x\r\n\r\n");
        assert!(matches!(
            read_headers(&mut stream).await,
            Err(Error::InvalidHeaderName(_))
        ));
    }
}

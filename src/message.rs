use crate::body::{Body, BodyReader};
use crate::decoder::ContentCoding;
use crate::error::Error;
use crate::headers::{latin1, read_headers, Headers};
use crate::stream::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: (u8, u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: (u8, u8),
    pub code: u16,
    pub reason: String,
}

// Next whitespace-separated token and the rest of the line.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(|c: char| c.is_whitespace()) {
        Some(at) => Some((&s[..at], &s[at..])),
        None => Some((s, "")),
    }
}

// "HTTP/<major>.<minor>" with decimal version numbers.
fn parse_version(token: &str) -> Option<(u8, u8)> {
    let rest = token.strip_prefix("HTTP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Parse "METHOD URI HTTP/M.N". The method must be an alphabetic token and
/// is uppercased; a URI starting with "//" loses one leading slash.
pub async fn read_request_line(stream: &mut ByteStream) -> Result<RequestLine, Error> {
    let raw = stream.readline().await;
    let text = latin1(&raw);
    let line = text.trim();
    let bad = || Error::BadStatusLine(line.to_string());

    let (method, rest) = next_token(line).ok_or_else(bad)?;
    let (uri, rest) = next_token(rest).ok_or_else(bad)?;
    let (version, rest) = next_token(rest).ok_or_else(bad)?;
    if next_token(rest).is_some() {
        return Err(bad());
    }

    if !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(bad());
    }
    let version = parse_version(version).ok_or_else(bad)?;

    let uri = if let Some(stripped) = uri.strip_prefix("//") {
        format!("/{}", stripped)
    } else {
        uri.to_string()
    };

    Ok(RequestLine {
        method: method.to_ascii_uppercase(),
        uri,
        version,
    })
}

/// Parse "HTTP/M.N CODE REASON". The reason may be empty; the code must be a
/// three-digit number in [100, 999].
pub async fn read_response_status(stream: &mut ByteStream) -> Result<StatusLine, Error> {
    let raw = stream.readline().await;
    let text = latin1(&raw);
    let line = text.trim();
    if line.is_empty() {
        // the peer closed before sending a valid response
        return Err(Error::BadStatusLine(String::new()));
    }
    let bad = || Error::BadStatusLine(line.to_string());

    let (version, rest) = next_token(line).ok_or_else(bad)?;
    let version = parse_version(version).ok_or_else(bad)?;

    let (code, rest) = next_token(rest).ok_or_else(bad)?;
    let code: u16 = code.parse().map_err(|_| bad())?;
    if !(100..=999).contains(&code) {
        return Err(bad());
    }

    Ok(StatusLine {
        version,
        code,
        reason: rest.trim().to_string(),
    })
}

/// One parsed HTTP message: validated headers and a pending body.
pub struct HttpMessage {
    pub headers: Headers,
    pub body: Body,
    pub close_after: bool,
    pub compression: Option<ContentCoding>,
}

/// Read a header block and choose the body strategy for the message.
///
/// `length_hint` pre-seeds the body length when the caller already knows it
/// (HEAD responses, statuses defined to carry no payload); a Content-Length
/// header overrides it. `read_all` selects read-until-EOF when nothing else
/// determined a length, otherwise the body is empty. Content-Encoding is
/// honored only when `compression` is set.
pub async fn read_message(
    stream: &mut ByteStream,
    version: (u8, u8),
    length_hint: Option<u64>,
    compression: bool,
    read_all: bool,
) -> Result<HttpMessage, Error> {
    let headers = read_headers(stream).await?;

    let mut length = length_hint;
    let mut raw_length: Option<String> = None;
    let mut chunked = false;
    let mut close_conn: Option<bool> = None;
    let mut coding: Option<ContentCoding> = None;
    let mut legacy_ws_key = false;

    for (name, value) in headers.iter() {
        match name {
            "CONTENT-LENGTH" => raw_length = Some(value.to_string()),
            "TRANSFER-ENCODING" => {
                if value.to_ascii_lowercase().contains("chunked") {
                    chunked = true;
                }
            }
            // hixie-76 handshake: the challenge body is always 8 bytes
            "SEC-WEBSOCKET-KEY1" => legacy_ws_key = true,
            "CONNECTION" => {
                let value = value.to_ascii_lowercase();
                if value.contains("close") {
                    close_conn = Some(true);
                } else if value.contains("keep-alive") {
                    close_conn = Some(false);
                }
            }
            "CONTENT-ENCODING" if compression => match ContentCoding::from_value(value) {
                Some(found) => coding = Some(found),
                None => {
                    let plain = value.trim().to_ascii_lowercase();
                    if !plain.is_empty() && plain != "identity" {
                        return Err(Error::UnsupportedEncoding(value.to_string()));
                    }
                }
            },
            _ => {}
        }
    }

    if let Some(raw) = raw_length {
        let parsed: u64 = raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidLength(raw.clone()))?;
        length = Some(parsed);
    }
    if legacy_ws_key {
        length = Some(8);
    }

    let close_after = close_conn.unwrap_or(version <= (1, 0));

    let reader = if chunked {
        BodyReader::chunked()
    } else if let Some(n) = length {
        BodyReader::length(n)
    } else if read_all {
        BodyReader::eof()
    } else {
        BodyReader::length(0)
    };

    Ok(HttpMessage {
        headers,
        body: Body::new(reader, coding),
        close_after,
        compression: coding,
    })
}

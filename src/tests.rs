use crate::body::BodyReader;
use crate::client::{fetch, fetch_with_config, read_response};
use crate::config::{ClientConfig, ServerConfig, WsConfig, MAX_HEADERFIELD_SIZE};
use crate::connection::attach;
use crate::decoder::{ContentCoding, Decoder};
use crate::encoder::Encoder;
use crate::error::Error;
use crate::frame::{apply_mask, read_frame, FrameWriter, OpCode, Role};
use crate::handshake::{
    accept_async, connect_async_with_stream, generate_websocket_accept_value,
};
use crate::headers::read_headers;
use crate::message::{read_message, read_request_line, read_response_status};
use crate::request::HttpRequest;
use crate::server::{serve, ServerResponse};
use crate::session::{Message, WsSession};
use crate::stream::ByteStream;
use crate::writer::MessageWriter;
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn stream_with(data: &[u8]) -> ByteStream {
    let stream = ByteStream::new();
    stream.feed(data);
    stream.feed_eof();
    stream
}

async fn serialize_request(request: &HttpRequest) -> Vec<u8> {
    let mut wire = Vec::new();
    let mut writer = MessageWriter::new(&mut wire);
    request.send(&mut writer).await.unwrap();
    wire
}

// ---- ByteStream ----

#[tokio::test]
async fn byte_stream_basic_reads() {
    let mut stream = ByteStream::new();
    stream.feed(b"line one\r\nrest");
    stream.feed_eof();

    assert_eq!(stream.readline().await, b"line one\r\n".to_vec());
    assert_eq!(stream.read(2).await, b"re".to_vec());
    assert_eq!(stream.read_to_eof().await, b"st".to_vec());
    assert_eq!(stream.read(4).await, Vec::<u8>::new());
    assert!(stream.at_eof());
}

#[tokio::test]
async fn byte_stream_wakes_pending_reader() {
    let mut stream = ByteStream::new();
    let feeder = stream.feeder();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        feeder.feed(b"ab");
        tokio::time::sleep(Duration::from_millis(5)).await;
        feeder.feed(b"cd");
        feeder.feed_eof();
    });

    assert_eq!(stream.read_exactly(4).await.unwrap(), b"abcd".to_vec());
    assert!(!stream.wait_readable().await);
}

#[tokio::test]
async fn byte_stream_incomplete_read() {
    let mut stream = stream_with(b"ab");
    match stream.read_exactly(5).await {
        Err(Error::IncompleteRead(_)) => {}
        other => panic!("expected IncompleteRead, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn byte_stream_readline_without_newline() {
    let mut stream = stream_with(b"no newline");
    assert_eq!(stream.readline().await, b"no newline".to_vec());
    assert_eq!(stream.readline().await, Vec::<u8>::new());
}

// ---- start lines ----

#[tokio::test]
async fn parses_request_line() {
    let mut stream = stream_with(b"get /index.html HTTP/1.1\r\n");
    let rline = read_request_line(&mut stream).await.unwrap();
    assert_eq!(rline.method, "GET");
    assert_eq!(rline.uri, "/index.html");
    assert_eq!(rline.version, (1, 1));
}

#[tokio::test]
async fn collapses_double_slash_uri() {
    let mut stream = stream_with(b"GET //p/q HTTP/1.0\r\n");
    let rline = read_request_line(&mut stream).await.unwrap();
    assert_eq!(rline.uri, "/p/q");
    assert_eq!(rline.version, (1, 0));
}

#[tokio::test]
async fn rejects_malformed_request_lines() {
    for line in [
        &b"GET /\r\n"[..],
        &b"G3T / HTTP/1.1\r\n"[..],
        &b"GET / FTP/1.1\r\n"[..],
        &b"\r\n"[..],
    ] {
        let mut stream = stream_with(line);
        assert!(
            matches!(
                read_request_line(&mut stream).await,
                Err(Error::BadStatusLine(_))
            ),
            "accepted {:?}",
            line
        );
    }
}

#[tokio::test]
async fn bad_status_code_carries_line() {
    let mut stream = stream_with(b"HTTP/1.1 99 test\r\n");
    match read_response_status(&mut stream).await {
        Err(Error::BadStatusLine(line)) => assert_eq!(line, "HTTP/1.1 99 test"),
        other => panic!("expected BadStatusLine, got {:?}", other),
    }
}

#[tokio::test]
async fn status_code_range_edges() {
    let mut stream = stream_with(b"HTTP/1.1 100 Continue\r\n");
    assert_eq!(read_response_status(&mut stream).await.unwrap().code, 100);

    let mut stream = stream_with(b"HTTP/1.1 999 Whatever\r\n");
    assert_eq!(read_response_status(&mut stream).await.unwrap().code, 999);

    let mut stream = stream_with(b"HTTP/1.1 1000 Nope\r\n");
    assert!(matches!(
        read_response_status(&mut stream).await,
        Err(Error::BadStatusLine(_))
    ));
}

#[tokio::test]
async fn tolerates_empty_reason() {
    let mut stream = stream_with(b"HTTP/1.1 200\r\n");
    let status = read_response_status(&mut stream).await.unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.reason, "");
}

// ---- headers ----

#[tokio::test]
async fn canonicalizes_header_names() {
    let mut stream = stream_with(b"x-MiXeD \t: value\r\n\r\n");
    let headers = read_headers(&mut stream).await.unwrap();
    let (name, value) = headers.iter().next().unwrap();
    assert_eq!(name, "X-MIXED");
    assert_eq!(value, "value");
}

#[tokio::test]
async fn header_field_size_cap_edges() {
    // the cap counts raw line bytes, CRLF included
    let overhead = "X-PAD: ".len() + 2;

    let fill = "a".repeat(MAX_HEADERFIELD_SIZE - overhead);
    let mut stream = stream_with(format!("X-PAD: {}\r\n\r\n", fill).as_bytes());
    let headers = read_headers(&mut stream).await.unwrap();
    assert_eq!(headers.get("X-PAD").unwrap().len(), fill.len());

    let fill = "a".repeat(MAX_HEADERFIELD_SIZE - overhead + 1);
    let mut stream = stream_with(format!("X-PAD: {}\r\n\r\n", fill).as_bytes());
    assert!(matches!(
        read_headers(&mut stream).await,
        Err(Error::LineTooLong(_))
    ));
}

#[tokio::test]
async fn header_block_size_cap() {
    let mut block = String::new();
    for i in 0..5 {
        block.push_str(&format!("X-F{}: {}\r\n", i, "b".repeat(8000)));
    }
    block.push_str("\r\n");
    let mut stream = stream_with(block.as_bytes());
    assert!(matches!(
        read_headers(&mut stream).await,
        Err(Error::LineTooLong(_))
    ));
}

// ---- bodies ----

#[tokio::test]
async fn chunked_response_scenario() {
    let mut stream = stream_with(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ndata\r\n4\r\nline\r\n0\r\n\r\n",
    );
    let (status, mut message) = read_response(&mut stream, "GET", true).await.unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.reason, "OK");
    assert!(!message.close_after);
    assert_eq!(
        message.body.read(&mut stream).await.unwrap(),
        b"dataline".to_vec()
    );
}

#[tokio::test]
async fn chunk_extension_is_stripped() {
    let mut stream = stream_with(b"4;ext=foo\r\ndata\r\n0\r\n\r\n");
    let mut reader = BodyReader::chunked();
    assert_eq!(reader.read(&mut stream).await.unwrap(), b"data".to_vec());
    assert_eq!(reader.read(&mut stream).await.unwrap(), Vec::<u8>::new());
}

#[tokio::test]
async fn empty_chunked_body() {
    let mut stream = stream_with(b"0\r\n\r\n");
    let mut reader = BodyReader::chunked();
    assert_eq!(reader.read(&mut stream).await.unwrap(), Vec::<u8>::new());
}

#[tokio::test]
async fn chunked_framing_round_trip() {
    // the parser yields the concatenation; chunk boundaries are not kept
    let chunks: [&[u8]; 3] = [b"first", b"second piece", b"x"];
    let mut wire = Vec::new();
    {
        let mut writer = MessageWriter::new(&mut wire);
        for chunk in chunks {
            writer.write_chunk(chunk).await.unwrap();
        }
        writer.write_chunked_eof().await.unwrap();
    }

    let mut stream = stream_with(&wire);
    let mut reader = BodyReader::chunked();
    let mut out = Vec::new();
    loop {
        let piece = reader.read(&mut stream).await.unwrap();
        if piece.is_empty() {
            break;
        }
        out.extend_from_slice(&piece);
    }
    assert_eq!(out, b"firstsecond piecex".to_vec());
}

#[tokio::test]
async fn length_body_and_eof_body() {
    let mut stream = stream_with(b"12345rest");
    let mut reader = BodyReader::length(5);
    assert_eq!(reader.read(&mut stream).await.unwrap(), b"12345".to_vec());
    assert_eq!(reader.read(&mut stream).await.unwrap(), Vec::<u8>::new());

    let mut reader = BodyReader::eof();
    assert_eq!(reader.read(&mut stream).await.unwrap(), b"rest".to_vec());
    assert_eq!(reader.read(&mut stream).await.unwrap(), Vec::<u8>::new());
}

// ---- compression ----

#[test]
fn compression_round_trip() {
    for coding in [ContentCoding::Deflate, ContentCoding::Gzip] {
        let data = b"some payload some payload some payload".to_vec();
        let compressed = Encoder::compress_all(coding, &data).unwrap();
        let mut decoder = Decoder::new(coding);
        let mut out = decoder.decompress(&compressed).unwrap();
        out.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(out, data, "{:?} did not round-trip", coding);
    }
}

#[test]
fn streaming_encoder_output_is_decodable() {
    let mut encoder = Encoder::new(ContentCoding::Deflate);
    let mut wire = encoder.compress(b"hello ").unwrap();
    wire.extend_from_slice(&encoder.compress(b"world").unwrap());
    wire.extend_from_slice(&encoder.finish().unwrap());

    let mut decoder = Decoder::new(ContentCoding::Deflate);
    let mut out = decoder.decompress(&wire).unwrap();
    out.extend_from_slice(&decoder.finish().unwrap());
    assert_eq!(out, b"hello world".to_vec());
}

#[tokio::test]
async fn content_length_deflate_scenario() {
    let compressed = Encoder::compress_all(ContentCoding::Deflate, b"data").unwrap();
    let mut wire = format!(
        "HTTP/1.1 200 Ok\r\nContent-Length: {}\r\nContent-Encoding: deflate\r\n\r\n",
        compressed.len()
    )
    .into_bytes();
    wire.extend_from_slice(&compressed);

    let mut stream = stream_with(&wire);
    let (status, mut message) = read_response(&mut stream, "GET", true).await.unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.reason, "Ok");
    assert_eq!(message.body.read(&mut stream).await.unwrap(), b"data".to_vec());
}

#[tokio::test]
async fn trailing_garbage_after_compressed_body_is_ignored() {
    let mut body = Encoder::compress_all(ContentCoding::Deflate, b"data").unwrap();
    body.extend_from_slice(b"\x00\x00garbage");
    let mut wire = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Encoding: deflate\r\n\r\n",
        body.len()
    )
    .into_bytes();
    wire.extend_from_slice(&body);

    let mut stream = stream_with(&wire);
    let (_, mut message) = read_response(&mut stream, "GET", true).await.unwrap();
    assert_eq!(message.body.read(&mut stream).await.unwrap(), b"data".to_vec());
}

#[tokio::test]
async fn unsupported_content_encoding_fails_early() {
    let mut stream =
        stream_with(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nContent-Encoding: br\r\n\r\nabcd");
    match read_response(&mut stream, "GET", true).await {
        Err(Error::UnsupportedEncoding(value)) => assert_eq!(value, "br"),
        other => panic!("expected UnsupportedEncoding, got {:?}", other.map(|_| ())),
    }
}

// ---- message reading ----

#[tokio::test]
async fn close_after_rules() {
    let mut stream = stream_with(b"\r\n");
    let message = read_message(&mut stream, (1, 0), None, true, true).await.unwrap();
    assert!(message.close_after);

    let mut stream = stream_with(b"Connection: keep-alive\r\n\r\n");
    let message = read_message(&mut stream, (1, 0), None, true, false).await.unwrap();
    assert!(!message.close_after);

    let mut stream = stream_with(b"Connection: close\r\n\r\n");
    let message = read_message(&mut stream, (1, 1), None, true, false).await.unwrap();
    assert!(message.close_after);

    let mut stream = stream_with(b"\r\n");
    let message = read_message(&mut stream, (1, 1), None, true, false).await.unwrap();
    assert!(!message.close_after);
}

#[tokio::test]
async fn invalid_content_length() {
    let mut stream = stream_with(b"Content-Length: nope\r\n\r\n");
    assert!(matches!(
        read_message(&mut stream, (1, 1), None, true, false).await,
        Err(Error::InvalidLength(_))
    ));

    let mut stream = stream_with(b"Content-Length: -5\r\n\r\n");
    assert!(matches!(
        read_message(&mut stream, (1, 1), None, true, false).await,
        Err(Error::InvalidLength(_))
    ));
}

#[tokio::test]
async fn legacy_websocket_key_forces_length() {
    let mut stream = stream_with(b"Sec-WebSocket-Key1: k\r\n\r\n12345678rest");
    let mut message = read_message(&mut stream, (1, 1), None, false, true).await.unwrap();
    assert_eq!(
        message.body.read(&mut stream).await.unwrap(),
        b"12345678".to_vec()
    );
}

// ---- request serialization ----

#[tokio::test]
async fn request_round_trip() {
    let request = HttpRequest::new("post", "http://example.com:8080/submit?q=1")
        .unwrap()
        .header("X-Custom", "yes")
        .body(b"hello body".to_vec());
    let wire = serialize_request(&request).await;

    let mut stream = stream_with(&wire);
    let rline = read_request_line(&mut stream).await.unwrap();
    assert_eq!(rline.method, "POST");
    assert_eq!(rline.uri, "/submit?q=1");
    assert_eq!(rline.version, (1, 1));

    let mut message = read_message(&mut stream, rline.version, None, true, false)
        .await
        .unwrap();
    assert_eq!(message.headers.get("X-CUSTOM"), Some("yes"));
    assert_eq!(message.headers.get("HOST"), Some("example.com:8080"));
    assert_eq!(message.headers.get("ACCEPT"), Some("*/*"));
    assert_eq!(message.headers.get("ACCEPT-ENCODING"), Some("gzip, deflate"));
    assert_eq!(message.headers.get("CONTENT-LENGTH"), Some("10"));
    assert_eq!(
        message.body.read(&mut stream).await.unwrap(),
        b"hello body".to_vec()
    );
}

#[tokio::test]
async fn compressed_request_round_trip() {
    let payload = b"a body worth compressing, a body worth compressing".to_vec();
    let request = HttpRequest::new("POST", "http://example.com/up")
        .unwrap()
        .compressed()
        .body(payload.clone());
    let wire = serialize_request(&request).await;

    let mut stream = stream_with(&wire);
    let rline = read_request_line(&mut stream).await.unwrap();
    let mut message = read_message(&mut stream, rline.version, None, true, false)
        .await
        .unwrap();
    assert_eq!(message.headers.get("CONTENT-ENCODING"), Some("deflate"));
    assert_eq!(message.headers.get("TRANSFER-ENCODING"), Some("chunked"));
    assert!(message.headers.get("CONTENT-LENGTH").is_none());
    assert_eq!(message.body.read(&mut stream).await.unwrap(), payload);
}

#[tokio::test]
async fn chunked_request_uses_given_chunk_size() {
    let request = HttpRequest::new("POST", "http://example.com/up")
        .unwrap()
        .chunked(Some(4))
        .body(b"abcdefghij".to_vec());
    let wire = serialize_request(&request).await;
    let text = String::from_utf8_lossy(&wire);
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));
    assert!(text.contains("4\r\nabcd\r\n"));
    assert!(text.ends_with("2\r\nij\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn basic_auth_header() {
    let request = HttpRequest::new("GET", "http://example.com/")
        .unwrap()
        .basic_auth("nkim", "1234");
    let wire = serialize_request(&request).await;
    let text = String::from_utf8_lossy(&wire);
    assert!(text.contains("Authorization: Basic bmtpbToxMjM0\r\n"));
}

#[tokio::test]
async fn default_headers_do_not_override() {
    let request = HttpRequest::new("GET", "http://example.com/")
        .unwrap()
        .header("Accept", "text/plain");
    let wire = serialize_request(&request).await;
    let text = String::from_utf8_lossy(&wire);
    assert!(text.contains("Accept: text/plain\r\n"));
    assert!(!text.contains("Accept: */*"));
}

// ---- websocket handshake ----

#[test]
fn websocket_accept_value() {
    // the key/accept pair from RFC 6455 §1.3
    assert_eq!(
        generate_websocket_accept_value("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

#[tokio::test]
async fn rejects_bad_upgrade_request() {
    let (mut client_io, server_io) = duplex(4096);
    let server = tokio::spawn(accept_async(server_io));

    // no Sec-WebSocket-Key
    client_io
        .write_all(
            b"GET /chat HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\r\n",
        )
        .await
        .unwrap();

    let mut text = String::new();
    let mut buf = [0u8; 256];
    while !text.contains("\r\n\r\n") {
        let n = client_io.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        text.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.contains("Content-Length: 0\r\n"));
    assert!(matches!(
        server.await.unwrap(),
        Err(Error::HandshakeError(_))
    ));
}

async fn answer_upgrade_with(mut server_io: tokio::io::DuplexStream, response: &[u8]) {
    let mut seen = String::new();
    let mut buf = [0u8; 512];
    while !seen.contains("\r\n\r\n") {
        let n = server_io.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    server_io.write_all(response).await.unwrap();
    // keep the transport open until the client is done judging the response
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn client_rejects_non_101_response() {
    let (client_io, server_io) = duplex(4096);
    let fake =
        tokio::spawn(
            async move { answer_upgrade_with(server_io, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await },
        );
    assert!(matches!(
        connect_async_with_stream(client_io, "ws://h/").await,
        Err(Error::HandshakeError(_))
    ));
    fake.await.unwrap();
}

#[tokio::test]
async fn client_rejects_wrong_accept_value() {
    let (client_io, server_io) = duplex(4096);
    let fake = tokio::spawn(async move {
        answer_upgrade_with(
            server_io,
            b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\r\n",
        )
        .await
    });
    assert!(matches!(
        connect_async_with_stream(client_io, "ws://h/").await,
        Err(Error::HandshakeError(_))
    ));
    fake.await.unwrap();
}

// ---- websocket framing ----

#[test]
fn opcode_mapping() {
    assert_eq!(OpCode::from(0x0).unwrap(), OpCode::Continue);
    assert_eq!(OpCode::Text.as_u8(), 0x1);
    assert!(OpCode::Close.is_control());
    assert!(!OpCode::Binary.is_control());
    assert!(matches!(OpCode::from(0x3), Err(Error::InvalidOpcode(0x3))));
}

#[test]
fn masking_is_an_involution() {
    let original = b"masked payload".to_vec();
    let mut data = original.clone();
    let mask = [0x11, 0x22, 0x33, 0x44];
    apply_mask(&mut data, mask);
    assert_ne!(data, original);
    apply_mask(&mut data, mask);
    assert_eq!(data, original);
}

#[tokio::test]
async fn frame_round_trip_unmasked() {
    let mut wire = Vec::new();
    {
        let mut writer = FrameWriter::new(&mut wire, Role::Server);
        writer.write_frame(OpCode::Text, b"hi there").await.unwrap();
    }
    assert_eq!(wire[0], 0x81);
    assert_eq!(wire[1], 8);

    let mut stream = stream_with(&wire);
    let frame = read_frame(&mut stream, false, &WsConfig::default()).await.unwrap();
    assert!(frame.final_fragment);
    assert_eq!(frame.opcode, OpCode::Text);
    assert_eq!(frame.payload, b"hi there".to_vec());
}

#[tokio::test]
async fn frame_round_trip_masked() {
    let mut wire = Vec::new();
    {
        let mut writer = FrameWriter::new(&mut wire, Role::Client);
        writer
            .write_frame(OpCode::Binary, b"\x00\x01\x02")
            .await
            .unwrap();
    }
    assert_eq!(wire[1] & 0x80, 0x80);
    // the payload on the wire differs from the cleartext unless the random
    // key happens to be all zeroes; either way it must unmask correctly
    let mut stream = stream_with(&wire);
    let frame = read_frame(&mut stream, false, &WsConfig::default()).await.unwrap();
    assert_eq!(frame.payload, b"\x00\x01\x02".to_vec());
}

#[tokio::test]
async fn frame_extended_lengths() {
    for len in [126usize, 65536] {
        let payload = vec![0xAB; len];
        let mut wire = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut wire, Role::Server);
            writer.write_frame(OpCode::Binary, &payload).await.unwrap();
        }
        assert_eq!(wire[1], if len == 126 { 126 } else { 127 });

        let mut stream = stream_with(&wire);
        let frame = read_frame(&mut stream, false, &WsConfig::default()).await.unwrap();
        assert_eq!(frame.payload, payload);
    }
}

#[tokio::test]
async fn control_frame_length_cap() {
    // ping claiming a 16-bit extended length
    let mut stream = stream_with(&[0x89, 126]);
    assert!(matches!(
        read_frame(&mut stream, false, &WsConfig::default()).await,
        Err(Error::FrameTooLarge)
    ));

    let mut writer = FrameWriter::new(Vec::new(), Role::Server);
    assert!(matches!(
        writer.write_frame(OpCode::Ping, &[0u8; 126]).await,
        Err(Error::FrameTooLarge)
    ));
}

#[tokio::test]
async fn reserved_bits_rejected() {
    let mut stream = stream_with(&[0xC1, 0x00]);
    assert!(matches!(
        read_frame(&mut stream, false, &WsConfig::default()).await,
        Err(Error::ProtocolError(_))
    ));
}

#[tokio::test]
async fn fragmented_control_frame_rejected() {
    let mut stream = stream_with(&[0x09, 0x00]);
    assert!(matches!(
        read_frame(&mut stream, false, &WsConfig::default()).await,
        Err(Error::ProtocolError(_))
    ));
}

#[tokio::test]
async fn data_frame_rejected_mid_fragmentation() {
    for header in [[0x81u8, 0x00], [0x01, 0x00]] {
        let mut stream = stream_with(&header);
        assert!(matches!(
            read_frame(&mut stream, true, &WsConfig::default()).await,
            Err(Error::ProtocolError(_))
        ));
    }
}

// ---- websocket session ----

fn offline_session(frames: &[&[u8]]) -> WsSession<Vec<u8>> {
    let stream = ByteStream::new();
    for frame in frames {
        stream.feed(frame);
    }
    stream.feed_eof();
    WsSession::new(
        stream,
        FrameWriter::new(Vec::new(), Role::Server),
        WsConfig::default(),
        None,
    )
}

#[tokio::test]
async fn reassembles_fragmented_message() {
    let mut session = offline_session(&[
        &[0x01, 2, b'h', b'e'],
        &[0x80, 3, b'l', b'l', b'o'],
    ]);
    let message = session.receive().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("hello".to_string()));
    assert!(session.receive().await.unwrap().is_none());
}

#[tokio::test]
async fn continuation_without_start_is_rejected() {
    let mut session = offline_session(&[&[0x80, 2, b'x', b'y']]);
    assert!(matches!(
        session.receive().await,
        Err(Error::ProtocolError(_))
    ));
}

#[tokio::test]
async fn invalid_utf8_text_fails_with_1007() {
    let mut session = offline_session(&[&[0x81, 2, 0xFF, 0xFE]]);
    assert!(matches!(
        session.receive().await,
        Err(Error::FromUtf8Error { .. })
    ));
}

#[tokio::test]
async fn close_with_invalid_code_is_rejected() {
    // close code 999 is below the valid range
    let mut session = offline_session(&[&[0x88, 2, 0x03, 0xE7]]);
    assert!(matches!(
        session.receive().await,
        Err(Error::ProtocolError(_))
    ));
    assert_eq!(session.close_code(), Some(999));
}

#[tokio::test]
async fn close_without_code_ends_cleanly() {
    let mut session = offline_session(&[&[0x88, 0]]);
    assert!(session.receive().await.unwrap().is_none());
    assert_eq!(session.close_code(), None);
}

#[tokio::test]
async fn websocket_echo_scenario() {
    let (client_io, server_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let mut session = accept_async(server_io).await.unwrap();
        let message = session.receive().await.unwrap().unwrap();
        assert_eq!(message, Message::Text("hi".to_string()));
        session.send_binary(vec![0u8, 1]).await.unwrap();
        assert!(session.receive().await.unwrap().is_none());
        session
    });

    let mut client = connect_async_with_stream(client_io, "ws://testserver/chat")
        .await
        .unwrap();
    client.send_text("hi").await.unwrap();
    let reply = client.receive().await.unwrap().unwrap();
    assert_eq!(reply, Message::Binary(vec![0, 1]));
    client.close(1000, b"bye").await.unwrap();

    let session = server.await.unwrap();
    assert_eq!(session.close_code(), Some(1000));
    assert_eq!(session.close_message(), Some(&b"bye"[..]));
}

#[tokio::test]
async fn ping_is_answered_and_close_is_echoed() {
    let (peer_io, session_io) = duplex(4096);

    let (session_read, session_write) = split(session_io);
    let stream = ByteStream::new();
    let pump = attach(session_read, &stream);
    let mut session = WsSession::new(
        stream,
        FrameWriter::new(session_write, Role::Server),
        WsConfig::default(),
        Some(pump),
    );

    let (peer_read, peer_write) = split(peer_io);
    let mut peer_stream = ByteStream::new();
    let _peer_pump = attach(peer_read, &peer_stream);
    let mut peer_writer = FrameWriter::new(peer_write, Role::Client);

    peer_writer.write_frame(OpCode::Ping, b"abc").await.unwrap();
    let mut close_payload = 1000u16.to_be_bytes().to_vec();
    close_payload.extend_from_slice(b"goodbye");
    peer_writer
        .write_frame(OpCode::Close, &close_payload)
        .await
        .unwrap();

    // the ping never surfaces; the close ends the stream
    assert!(session.receive().await.unwrap().is_none());
    assert_eq!(session.close_code(), Some(1000));
    assert_eq!(session.close_message(), Some(&b"goodbye"[..]));

    let pong = read_frame(&mut peer_stream, false, &WsConfig::default()).await.unwrap();
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(pong.payload, b"abc".to_vec());

    let close = read_frame(&mut peer_stream, false, &WsConfig::default()).await.unwrap();
    assert_eq!(close.opcode, OpCode::Close);
    assert_eq!(u16::from_be_bytes([close.payload[0], close.payload[1]]), 1000);
}

#[tokio::test]
async fn split_session_echoes_messages() {
    let (client_io, server_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let session = accept_async(server_io).await.unwrap();
        let (mut reader, writer) = session.split();
        while let Some(result) = reader.next().await {
            writer.send(result.unwrap()).await.unwrap();
        }
    });

    let mut client = connect_async_with_stream(client_io, "ws://t/").await.unwrap();
    client.send_text("one").await.unwrap();
    assert_eq!(
        client.receive().await.unwrap().unwrap(),
        Message::Text("one".to_string())
    );
    client.send_binary(b"two".to_vec()).await.unwrap();
    assert_eq!(
        client.receive().await.unwrap().unwrap(),
        Message::Binary(b"two".to_vec())
    );
    client.close(1000, b"").await.unwrap();
    server.await.unwrap();
}

// ---- server dispatcher ----

#[tokio::test]
async fn http_server_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(
        listener,
        |request| async move {
            Ok::<_, Error>(
                ServerResponse::new(200)
                    .header("Content-Type", "text/plain")
                    .body(format!("{} {}", request.method, request.uri)),
            )
        },
        ServerConfig::default(),
    ));

    let request = HttpRequest::new("GET", &format!("http://{}/hello", addr)).unwrap();
    let mut response = fetch(&request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.reason, "OK");
    assert!(response.close_after);
    assert_eq!(response.body().await.unwrap(), b"GET /hello".to_vec());

    server.abort();
}

#[tokio::test]
async fn handler_failure_yields_500() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(
        listener,
        |_request| async move {
            Err::<ServerResponse, _>(Error::ProtocolError("handler exploded"))
        },
        ServerConfig {
            debug: true,
            ..ServerConfig::default()
        },
    ));

    let request = HttpRequest::new("GET", &format!("http://{}/", addr)).unwrap();
    let mut response = fetch(&request).await.unwrap();
    assert_eq!(response.status, 500);
    let body = String::from_utf8(response.body().await.unwrap()).unwrap();
    assert!(body.contains("500 Internal Server Error"));
    assert!(body.contains("handler exploded"));

    server.abort();
}

#[tokio::test]
async fn malformed_request_yields_400() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(
        listener,
        |_request| async move { Ok::<_, Error>(ServerResponse::new(200)) },
        ServerConfig::default(),
    ));

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(b"BOGUS\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    socket.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8_lossy(&buf);
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    server.abort();
}

#[tokio::test]
async fn keep_alive_serves_multiple_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(
        listener,
        |request| async move { Ok::<_, Error>(ServerResponse::new(200).body(request.uri)) },
        ServerConfig {
            keep_alive: true,
            ..ServerConfig::default()
        },
    ));

    let socket = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = socket.into_split();
    let mut stream = ByteStream::new();
    let _pump = attach(read_half, &stream);

    write_half
        .write_all(
            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n\
              GET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let (status, mut message) = read_response(&mut stream, "GET", true).await.unwrap();
    assert_eq!(status.code, 200);
    assert!(!message.close_after);
    assert_eq!(message.body.read(&mut stream).await.unwrap(), b"/a".to_vec());

    let (status, mut message) = read_response(&mut stream, "GET", true).await.unwrap();
    assert_eq!(status.code, 200);
    assert!(message.close_after);
    assert_eq!(message.body.read(&mut stream).await.unwrap(), b"/b".to_vec());

    server.abort();
}

#[tokio::test]
async fn fetch_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let request = HttpRequest::new("GET", &format!("http://{}/", addr)).unwrap();
    let config = ClientConfig {
        timeout: Some(Duration::from_millis(50)),
        ..ClientConfig::default()
    };
    match fetch_with_config(&request, &config).await {
        Err(Error::Timeout { .. }) => {}
        Ok(_) => panic!("expected a timeout, got a response"),
        Err(err) => panic!("expected a timeout, got {}", err),
    }

    silent.abort();
}

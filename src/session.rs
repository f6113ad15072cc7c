use crate::config::WsConfig;
use crate::error::Error;
use crate::frame::{read_frame, FrameWriter, OpCode};
use crate::split::{WsReader, WsWriter};
use crate::stream::ByteStream;
use std::mem;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Message::Text(text) => Ok(text),
            Message::Binary(data) => Ok(std::str::from_utf8(data)
                .map_err(|_| Error::ProtocolError("binary payload is not valid utf-8"))?),
        }
    }
}

/// One established WebSocket connection.
///
/// `receive` reassembles fragmented messages, answers pings, and drives the
/// close handshake; `send` writes single-frame messages; `close` is
/// idempotent. After a clean close (ours or the peer's) `receive` yields
/// `None`.
pub struct WsSession<W> {
    stream: ByteStream,
    writer: Arc<Mutex<FrameWriter<W>>>,
    config: WsConfig,
    fragments: Vec<u8>,
    message_opcode: Option<OpCode>,
    close_code: Option<u16>,
    close_message: Option<Vec<u8>>,
    closed: bool,
    _pump: Option<JoinHandle<()>>,
}

impl<W: AsyncWrite + Unpin> WsSession<W> {
    pub(crate) fn new(
        stream: ByteStream,
        writer: FrameWriter<W>,
        config: WsConfig,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        WsSession {
            stream,
            writer: Arc::new(Mutex::new(writer)),
            config,
            fragments: Vec::new(),
            message_opcode: None,
            close_code: None,
            close_message: None,
            closed: false,
            _pump: pump,
        }
    }

    /// Close code the peer sent, if a close frame carried one.
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Close reason the peer sent alongside the code.
    pub fn close_message(&self) -> Option<&[u8]> {
        self.close_message.as_deref()
    }

    /// Next complete data message, `None` once the connection wound down.
    pub async fn receive(&mut self) -> Result<Option<Message>, Error> {
        loop {
            if self.closed {
                return Ok(None);
            }
            if !self.stream.wait_readable().await {
                if self.message_opcode.is_some() {
                    return Err(Error::IncompleteRead(
                        "peer closed connection mid-message".to_string(),
                    ));
                }
                return Ok(None);
            }

            let in_progress = self.message_opcode.is_some();
            let frame = match read_frame(&mut self.stream, in_progress, &self.config).await {
                Ok(frame) => frame,
                Err(err) => {
                    if matches!(err, Error::ProtocolError(_) | Error::FrameTooLarge) {
                        let _ = self.close(1002, b"").await;
                    }
                    return Err(err);
                }
            };

            match frame.opcode {
                OpCode::Text | OpCode::Binary => {
                    self.message_opcode = Some(frame.opcode);
                    self.fragments = frame.payload;
                    self.check_message_size()?;
                    if frame.final_fragment {
                        return self.finalize_message().await;
                    }
                }
                OpCode::Continue => {
                    if self.message_opcode.is_none() {
                        let _ = self.close(1002, b"").await;
                        return Err(Error::ProtocolError(
                            "continuation frame with no message in progress",
                        ));
                    }
                    self.fragments.extend_from_slice(&frame.payload);
                    self.check_message_size()?;
                    if frame.final_fragment {
                        return self.finalize_message().await;
                    }
                }
                OpCode::Close => return self.handle_close(frame.payload).await,
                OpCode::Ping => {
                    self.writer
                        .lock()
                        .await
                        .write_frame(OpCode::Pong, &frame.payload)
                        .await?;
                }
                OpCode::Pong => {}
            }
        }
    }

    fn check_message_size(&self) -> Result<(), Error> {
        if let Some(max) = self.config.max_message_size {
            if self.fragments.len() > max {
                return Err(Error::MaxMessageSize);
            }
        }
        Ok(())
    }

    async fn finalize_message(&mut self) -> Result<Option<Message>, Error> {
        let opcode = self.message_opcode.take();
        let data = mem::take(&mut self.fragments);
        match opcode {
            Some(OpCode::Text) => match String::from_utf8(data) {
                Ok(text) => Ok(Some(Message::Text(text))),
                Err(err) => {
                    let _ = self.close(1007, b"").await;
                    Err(err.into())
                }
            },
            _ => Ok(Some(Message::Binary(data))),
        }
    }

    async fn handle_close(&mut self, payload: Vec<u8>) -> Result<Option<Message>, Error> {
        if payload.len() >= 2 {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            self.close_code = Some(code);
            self.close_message = Some(payload[2..].to_vec());
            if (1000..5000).contains(&code) {
                self.close(code, b"").await?;
                Ok(None)
            } else {
                let _ = self.close(1002, b"").await;
                Err(Error::ProtocolError("invalid close code"))
            }
        } else if payload.len() == 1 {
            let _ = self.close(1002, b"").await;
            Err(Error::ProtocolError("invalid close frame"))
        } else {
            // no code given, answer with a normal closure
            self.close(1000, b"").await?;
            Ok(None)
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<(), Error> {
        if let Some(max) = self.config.max_message_size {
            if message.len() > max {
                return Err(Error::MaxMessageSize);
            }
        }
        let opcode = message.opcode();
        let payload = message.into_payload();
        self.writer.lock().await.write_frame(opcode, &payload).await
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), Error> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.send(Message::Binary(data.into())).await
    }

    pub async fn send_ping(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.writer.lock().await.write_frame(OpCode::Ping, payload).await
    }

    /// Send a close frame carrying `code` and `reason`. Does nothing after
    /// the first call.
    pub async fn close(&mut self, code: u16, reason: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason);
        self.writer
            .lock()
            .await
            .write_frame(OpCode::Close, &payload)
            .await
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> WsSession<W> {
    /// Split into a `Stream` of incoming messages and a cloneable writer.
    ///
    /// A task keeps calling [`receive`](Self::receive), forwarding messages
    /// and the terminal error into the reader half; the writer half shares
    /// the underlying frame writer.
    pub fn split(mut self) -> (WsReader, WsWriter<W>) {
        let writer = WsWriter::new(self.writer.clone());
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            loop {
                match self.receive().await {
                    Ok(Some(message)) => {
                        if tx.send(Ok(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }
        });

        (WsReader::new(ReceiverStream::new(rx)), writer)
    }
}

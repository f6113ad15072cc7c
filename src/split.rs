use crate::error::Error;
use crate::frame::{FrameWriter, OpCode};
use crate::session::Message;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;

/// Read half of a split [`WsSession`](crate::session::WsSession): a stream
/// of complete incoming messages, ending after a clean close or the first
/// error.
pub struct WsReader {
    read_rx: ReceiverStream<Result<Message, Error>>,
}

impl WsReader {
    pub(crate) fn new(read_rx: ReceiverStream<Result<Message, Error>>) -> Self {
        Self { read_rx }
    }
}

impl Stream for WsReader {
    type Item = Result<Message, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.read_rx).poll_next(cx)
    }
}

/// Write half of a split session. Cloneable; all clones share one frame
/// writer.
pub struct WsWriter<W> {
    writer: Arc<Mutex<FrameWriter<W>>>,
}

impl<W> Clone for WsWriter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin> WsWriter<W> {
    pub(crate) fn new(writer: Arc<Mutex<FrameWriter<W>>>) -> Self {
        Self { writer }
    }

    pub async fn send(&self, message: Message) -> Result<(), Error> {
        let opcode = message.opcode();
        let payload = message.into_payload();
        self.writer.lock().await.write_frame(opcode, &payload).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.send(Message::Binary(data.into())).await
    }

    pub async fn send_ping(&self, payload: &[u8]) -> Result<(), Error> {
        self.writer.lock().await.write_frame(OpCode::Ping, payload).await
    }

    pub async fn close(&self, code: u16, reason: &[u8]) -> Result<(), Error> {
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

use crate::config::DEFAULT_BUFFER_LIMIT;
use crate::error::Error;
use bytes::BytesMut;
use std::future::poll_fn;
use std::sync::{Arc, Mutex};
use std::task::{Poll, Waker};
use tokio::sync::Notify;

/// Buffered byte source decoupling the transport callback side from the
/// protocol reading side.
///
/// The transport task pushes bytes in through a [`StreamFeeder`] handle
/// (`feed`/`feed_eof`, both non-blocking); protocol code pulls them out with
/// the async read operations below. The read operations take `&mut self`, so
/// at most one read can be pending on a stream at any instant.
pub struct ByteStream {
    shared: Arc<Shared>,
}

/// Cloneable feeding handle for the transport side of a [`ByteStream`].
#[derive(Clone)]
pub struct StreamFeeder {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    // signalled whenever the reader consumes bytes or parks, so a pump
    // honoring the high-water mark knows when to resume
    drained: Notify,
}

struct State {
    buffer: BytesMut,
    eof: bool,
    waker: Option<Waker>,
    limit: usize,
}

impl Shared {
    fn feed(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.buffer.extend_from_slice(data);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    fn feed_eof(&self) {
        let mut state = self.state.lock().unwrap();
        state.eof = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
        drop(state);
        self.drained.notify_waiters();
    }
}

impl ByteStream {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_BUFFER_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        ByteStream {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    buffer: BytesMut::new(),
                    eof: false,
                    waker: None,
                    limit,
                }),
                drained: Notify::new(),
            }),
        }
    }

    pub fn feeder(&self) -> StreamFeeder {
        StreamFeeder {
            shared: self.shared.clone(),
        }
    }

    /// Append bytes to the buffer and wake a pending reader.
    pub fn feed(&self, data: &[u8]) {
        self.shared.feed(data);
    }

    /// Mark end-of-stream; pending readers resolve with whatever remains.
    pub fn feed_eof(&self) {
        self.shared.feed_eof();
    }

    pub fn buffered(&self) -> usize {
        self.shared.state.lock().unwrap().buffer.len()
    }

    /// True once EOF was fed and the buffer is fully drained.
    pub fn at_eof(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state.eof && state.buffer.is_empty()
    }

    /// Suspend until at least one byte is buffered. Returns false when the
    /// stream is exhausted instead.
    pub async fn wait_readable(&mut self) -> bool {
        let shared = self.shared.clone();
        poll_fn(move |cx| {
            let mut state = shared.state.lock().unwrap();
            if !state.buffer.is_empty() {
                return Poll::Ready(true);
            }
            if state.eof {
                return Poll::Ready(false);
            }
            state.waker = Some(cx.waker().clone());
            drop(state);
            shared.drained.notify_waiters();
            Poll::Pending
        })
        .await
    }

    /// Read bytes up to and including the next `\n`. If no newline is ever
    /// seen, returns whatever is buffered at EOF, possibly nothing.
    pub async fn readline(&mut self) -> Vec<u8> {
        let shared = self.shared.clone();
        let line = poll_fn(move |cx| {
            let mut state = shared.state.lock().unwrap();
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                return Poll::Ready(state.buffer.split_to(pos + 1).to_vec());
            }
            if state.eof {
                let len = state.buffer.len();
                let rest = state.buffer.split_to(len);
                return Poll::Ready(rest.to_vec());
            }
            state.waker = Some(cx.waker().clone());
            drop(state);
            shared.drained.notify_waiters();
            Poll::Pending
        })
        .await;
        self.shared.drained.notify_waiters();
        line
    }

    /// Read exactly `n` bytes, suspending until they arrived. Premature EOF
    /// fails with [`Error::IncompleteRead`].
    pub async fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let shared = self.shared.clone();
        let data = poll_fn(move |cx| {
            let mut state = shared.state.lock().unwrap();
            if state.buffer.len() >= n {
                return Poll::Ready(Ok(state.buffer.split_to(n).to_vec()));
            }
            if state.eof {
                return Poll::Ready(Err(Error::IncompleteRead(format!(
                    "expected {} bytes, got {}",
                    n,
                    state.buffer.len()
                ))));
            }
            state.waker = Some(cx.waker().clone());
            drop(state);
            shared.drained.notify_waiters();
            Poll::Pending
        })
        .await?;
        self.shared.drained.notify_waiters();
        Ok(data)
    }

    /// Read up to `n` bytes, possibly fewer, empty only at EOF.
    pub async fn read(&mut self, n: usize) -> Vec<u8> {
        let shared = self.shared.clone();
        let data = poll_fn(move |cx| {
            let mut state = shared.state.lock().unwrap();
            if !state.buffer.is_empty() {
                let take = state.buffer.len().min(n);
                return Poll::Ready(state.buffer.split_to(take).to_vec());
            }
            if state.eof {
                return Poll::Ready(Vec::new());
            }
            state.waker = Some(cx.waker().clone());
            drop(state);
            shared.drained.notify_waiters();
            Poll::Pending
        })
        .await;
        self.shared.drained.notify_waiters();
        data
    }

    /// Drain the stream until EOF.
    pub async fn read_to_eof(&mut self) -> Vec<u8> {
        let shared = self.shared.clone();
        let data = poll_fn(move |cx| {
            let mut state = shared.state.lock().unwrap();
            if state.eof {
                let len = state.buffer.len();
                let rest = state.buffer.split_to(len);
                return Poll::Ready(rest.to_vec());
            }
            state.waker = Some(cx.waker().clone());
            drop(state);
            shared.drained.notify_waiters();
            Poll::Pending
        })
        .await;
        self.shared.drained.notify_waiters();
        data
    }
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFeeder {
    pub fn feed(&self, data: &[u8]) {
        self.shared.feed(data);
    }

    pub fn feed_eof(&self) {
        self.shared.feed_eof();
    }

    /// Suspend while the buffer sits at its high-water mark and no reader is
    /// waiting for more. Feeding past the mark is still allowed; this is the
    /// cooperative hook the transport pump uses to pause its reads.
    pub async fn writable(&self) {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            // register before checking, so a notification landing between
            // the check and the await is not lost
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock().unwrap();
                if state.eof || state.buffer.len() < state.limit || state.waker.is_some() {
                    return;
                }
            }
            notified.await;
        }
    }
}

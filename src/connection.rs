use crate::stream::ByteStream;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// Spawn the transport pump: a task reading the transport and feeding the
/// stream until EOF or a read error, then marking end-of-stream. The pump
/// pauses its reads while the stream buffer sits at its high-water mark.
pub fn attach<R>(mut reader: R, stream: &ByteStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let feeder = stream.feeder();
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            feeder.writable().await;
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => feeder.feed(&buf[..n]),
                Err(err) => {
                    debug!("transport read failed: {}", err);
                    break;
                }
            }
        }
        feeder.feed_eof();
    })
}

#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;
use wire_flow::handshake::accept_async;

// Throw arbitrary bytes at the server-side upgrade path: the request line
// parser, the header parser with its size caps, and the handshake checks.
// None of it may panic, whatever arrives.
fuzz_target!(|data: &[u8]| {
    let runtime = Runtime::new().unwrap();

    let data = data.to_vec();
    runtime.block_on(async move {
        let (mut client, server) = tokio::io::duplex(16 * 1024);

        tokio::spawn(async move {
            let _ = client.write_all(&data).await;
            let _ = client.shutdown().await;
            // drain the response so the server side never blocks on a
            // full duplex buffer
            let mut sink = Vec::new();
            let _ = client.read_to_end(&mut sink).await;
        });

        let _ = accept_async(server).await;
    });
});

use log::info;
use tokio::net::TcpListener;
use wire_flow::config::ServerConfig;
use wire_flow::server::{serve, ServerResponse};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let addr = "127.0.0.1:8080";
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);

    serve(
        listener,
        |request| async move {
            Ok::<_, wire_flow::error::Error>(
                ServerResponse::new(200)
                    .header("Content-Type", "text/plain")
                    .body(format!("hello from {} {}\n", request.method, request.uri)),
            )
        },
        ServerConfig {
            keep_alive: true,
            ..ServerConfig::default()
        },
    )
    .await
}

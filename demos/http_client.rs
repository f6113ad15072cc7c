use std::env;
use std::time::Duration;
use wire_flow::client::fetch_with_config;
use wire_flow::config::ClientConfig;
use wire_flow::request::HttpRequest;

#[tokio::main]
async fn main() {
    env_logger::init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("http://127.0.0.1:8080/"));
    let request = match HttpRequest::new("GET", &url) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Bad URL {}: {}", url, err);
            return;
        }
    };

    let config = ClientConfig {
        timeout: Some(Duration::from_secs(10)),
        ..ClientConfig::default()
    };
    match fetch_with_config(&request, &config).await {
        Ok(mut response) => {
            println!("{} {}", response.status, response.reason);
            for (name, value) in response.headers.iter() {
                println!("{}: {}", name, value);
            }
            match response.body().await {
                Ok(body) => println!("\n{}", String::from_utf8_lossy(&body)),
                Err(err) => eprintln!("Error reading body: {}", err),
            }
        }
        Err(err) => eprintln!("Request failed: {}", err),
    }
}

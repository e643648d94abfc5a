//! Simple example of crawling through the dispatch chain.

use crawl_dispatch::{CrawlDispatchMiddleware, DispatchConfig, RequestDispatchMiddleware};
use reqwest_middleware::ClientBuilder;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = DispatchConfig::builder()
        .region("krasnodar")
        // format like proxies.txt: one scheme://host:port per line
        .proxy_list(crawl_dispatch::load_proxy_file("proxies.txt").unwrap_or_default())
        .quarantine_threshold(3)
        .max_retries(3)
        .base_delay(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(30))
        .build();
    let request_timeout = config.request_timeout;

    let dispatch = RequestDispatchMiddleware::new(config);
    let middleware = CrawlDispatchMiddleware::new(dispatch, request_timeout);
    let handle = middleware.dispatch();

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(middleware)
        .build();

    println!("Crawling as region {}...", handle.current_region());
    let response = client.get("https://alkoteka.com/").send().await?;
    println!("Status: {}", response.status());

    for proxy in handle.pool_snapshot() {
        println!(
            "{}: {} ok / {} failed, quarantined: {}",
            proxy.address, proxy.success_count, proxy.failure_count, proxy.is_quarantined
        );
    }

    Ok(())
}

use anyhow::Result;
use clap::Parser;
use sitesearch_crawler::{load_sites, CrawlConfig};
use sitesearch_core::Store;
use sitesearch_server::build_app;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sitesearch")]
#[command(about = "Crawl configured sites and serve ranked search over the index")]
struct Args {
    /// JSON file with the configured sites: [{"url": "...", "name": "..."}]
    #[arg(long, default_value = "./sites.json")]
    sites: String,
    /// Directory for index snapshots
    #[arg(long, default_value = "./data")]
    store: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// User-Agent for page fetches
    #[arg(long, default_value = "SearchEngineBot/1.0")]
    user_agent: String,
    /// Referer header for page fetches
    #[arg(long, default_value = "https://www.google.com")]
    referrer: String,
    /// Politeness delay between fetches, milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
    /// Fetch timeout seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let sites = load_sites(Path::new(&args.sites))?;
    let store = Arc::new(Store::open(PathBuf::from(&args.store))?);
    let config = CrawlConfig {
        user_agent: args.user_agent,
        referrer: args.referrer,
        delay: Duration::from_millis(args.delay_ms),
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let app = build_app(store, config, sites);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

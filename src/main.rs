//! A small CLI around the ingestion core: fetch one module on demand
//! against a real proxy and print what the site would have indexed.

use std::sync::Arc;

use clap::Parser;
use modsite::config::{Config, DEFAULT_PROXY_URL};
use modsite::datasource::{DataSource, InMemoryDataSource};
use modsite::ondemand::fetch_and_poll;
use modsite::proxy;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "modsite", version, about = "Ingest one module and print the indexed result")]
struct Args {
    /// Full path to ingest, e.g. github.com/owner/repo/sub/pkg
    full_path: String,

    /// Requested version: a semantic version, "latest", or "master"
    #[arg(default_value = "latest")]
    version: String,

    /// Base URL of the module proxy
    #[arg(long, value_name = "URL", env = "MODSITE_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    proxy_url: Url,

    /// Base URL for source links
    #[arg(long, value_name = "URL", env = "MODSITE_SOURCE_URL")]
    source_url: Option<Url>,

    /// Per-request timeout against the proxy, in seconds
    #[arg(long, value_name = "SECS", env = "MODSITE_SOURCE_TIMEOUT_SECS", default_value_t = 30)]
    source_timeout_secs: u64,

    /// Overall deadline for the fetch, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 100)]
    fetch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), modsite::error::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config {
        proxy_url: args.proxy_url.clone(),
        source_url: args.source_url.clone(),
        source_timeout: std::time::Duration::from_secs(args.source_timeout_secs),
        fetch_timeout: std::time::Duration::from_secs(args.fetch_timeout_secs),
        ..Config::default()
    };
    let proxy_client = Arc::new(proxy::Client::new(&config.proxy_url, config.source_timeout)?);
    let ds = Arc::new(InMemoryDataSource::new());

    let (status, message) = fetch_and_poll(
        Arc::clone(&ds) as Arc<dyn DataSource>,
        proxy_client,
        &config,
        &args.full_path,
        &args.full_path,
        &args.version,
    )
    .await;

    println!("{status} {message}");
    for module in ds.modules().await {
        let info = &module.module_info;
        println!(
            "module {}@{} redistributable={} has_go_mod={}",
            info.module_path, info.version, info.is_redistributable, info.has_go_mod
        );
        for package in &module.packages {
            println!("  package {} ({}) {}", package.path, package.name, package.synopsis);
        }
        for unit in &module.units {
            println!("  unit {}", unit.meta.path);
        }
    }
    std::process::exit(i32::from(status != 200 && status != 290));
}

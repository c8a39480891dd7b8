use anyhow::{bail, Context as _, Result};
use bytes::Bytes;
use chrono::Utc;
use clap::Parser;
use futures::future::join_all;
use http_fanout::app::{config::ClientConfig, logging};
use http_fanout::models::{BatchSummary, HttpRequest, RequestReport};
use http_fanout::services::{BatchContext, Context, HttpClientPool};
use http_fanout::utils::read_lines;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Issue HTTP requests concurrently, bounded by one deadline.
#[derive(Parser, Debug)]
#[command(name = "fanout", version)]
struct Args {
    /// Target URLs
    urls: Vec<String>,

    /// File with one URL per line; blank lines and `#` comments are skipped
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// TOML client config; falls back to HTTP_* environment variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deadline for the whole run, in milliseconds
    #[arg(long, default_value_t = 1000)]
    deadline_ms: u64,

    /// Requests per batch; each batch is bound to one pooled client
    #[arg(long, default_value_t = 16)]
    group_size: usize,

    /// Extra header as `Name: value`, repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body; turns every request into a POST
    #[arg(short, long)]
    data: Option<String>,

    /// Include response bodies in the report
    #[arg(long)]
    show_body: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log);

    if args.group_size == 0 {
        bail!("--group-size must be at least 1");
    }

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };
    let pool = HttpClientPool::new(&config)?;

    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        urls.extend(load_urls(path.clone()).await?);
    }
    if urls.is_empty() {
        bail!("no URLs given");
    }
    let headers = parse_headers(&args.headers)?;

    let (ctx, cancel) = Context::background().with_timeout(Duration::from_millis(args.deadline_ms));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning outstanding requests");
            cancel.cancel();
        }
    });

    let body = args.data.map(Bytes::from);
    let mut batches = Vec::new();
    for chunk in urls.chunks(args.group_size) {
        let mut batch = BatchContext::new(&pool);
        for url in chunk {
            let mut request = HttpRequest::new(&ctx, url, body.clone())?;
            for (name, value) in &headers {
                request.add_header(name, value)?;
            }
            batch.add(request);
        }
        batches.push(batch);
    }

    let started_at = Utc::now();
    let batch_count = batches.len();
    info!(
        batches = batch_count,
        requests = urls.len(),
        deadline_ms = args.deadline_ms,
        "dispatching"
    );
    let results = join_all(batches.into_iter().map(|batch| batch.execute(&ctx))).await;

    for request in results.iter().flatten() {
        let report = RequestReport::from_request(request, args.show_body);
        println!("{}", serde_json::to_string(&report)?);
    }

    let summary = BatchSummary {
        started_at,
        finished_at: Utc::now(),
        batches: batch_count,
        requests: urls.len(),
        metrics: pool.metrics().snapshot(),
    };
    let summary = serde_json::to_string(&summary)?;
    info!(%summary, "done");

    Ok(())
}

async fn load_urls(path: PathBuf) -> Result<Vec<String>> {
    let (sender, mut receiver) = mpsc::channel(256);
    let reader = tokio::spawn(read_lines(path, b'\n', sender));

    let mut urls = Vec::new();
    while let Some(line) = receiver.recv().await {
        let url = line.text.trim();
        if url.is_empty() || url.starts_with('#') {
            continue;
        }
        urls.push(url.to_string());
    }
    reader.await.context("url reader task failed")??;

    Ok(urls)
}

fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|header| match header.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => bail!("malformed header {header:?}, expected `Name: value`"),
        })
        .collect()
}

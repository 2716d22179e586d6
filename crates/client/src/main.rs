use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use igloo_client::{ClientSettings, HttpQueryClient};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Submit a query to an Igloo coordinator and stream its results",
    long_about = None
)]
struct Args {
    /// Settings file; environment variables prefixed `IGLOO_CLIENT__` override it.
    #[arg(short, long)]
    config: Option<String>,

    /// Coordinator base URL, overrides the settings file.
    #[arg(long)]
    coordinator: Option<String>,

    /// Stop after this many pages.
    #[arg(long)]
    max_pages: Option<usize>,

    query: String,
}

#[derive(Debug, Default)]
struct Summary {
    pages: usize,
    rows: u64,
    bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings =
        ClientSettings::new(args.config.as_deref()).context("Failed to load client settings")?;
    if let Some(coordinator) = args.coordinator {
        settings.coordinator_url = coordinator;
    }

    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let client = HttpQueryClient::submit(&args.query, http, Handle::current(), settings)
        .await
        .context("Query submission failed")?;

    let outcome = tokio::select! {
        outcome = stream_results(&client, args.max_pages) => outcome,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cleaning up query");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    // Cleanup failure is logged by the client and does not change the outcome.
    let _ = client.destroy().await;

    let summary = outcome?;
    println!("{} pages, {} rows, {} bytes", summary.pages, summary.rows, summary.bytes);
    Ok(())
}

async fn stream_results(
    client: &HttpQueryClient,
    max_pages: Option<usize>,
) -> anyhow::Result<Summary> {
    let operator = client
        .await_results_operator()
        .await
        .context("Query did not produce a result stream")?;
    info!(channels = operator.channel_count(), schema = ?operator.schema(), "Streaming results");

    let mut pages = operator.pages();
    let mut summary = Summary::default();
    while let Some(page) = pages.next().await {
        let page = page.context("Result stream failed")?;
        summary.pages += 1;
        summary.rows += u64::from(page.position_count);
        summary.bytes += page.data.len();
        println!("page {}: {} rows, {} bytes", summary.pages, page.position_count, page.data.len());

        if max_pages.is_some_and(|max| summary.pages >= max) {
            info!(pages = summary.pages, "Reached page limit");
            break;
        }
    }
    Ok(summary)
}

//! 口コミスクレイパー CLI
//!
//! 実行方法:
//! ```
//! cargo run --bin review-scraper -- run --data-dir ./data
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tower::Service;
use tracing_subscriber::EnvFilter;

use restaurant_review_scraper::{CrawlRequest, CrawlService, ScraperError};

#[derive(Parser)]
#[command(name = "review-scraper")]
#[command(about = "Resumable restaurant review scraper for German municipalities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl until no processable work remains
    Run {
        /// Data directory (checkpoint, lists, artifacts)
        #[arg(long, env = "SCRAPER_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Municipality reference table (default: <data-dir>/raw/input_municipalities.csv)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Chrome/Chromium executable
        #[arg(long, env = "CHROME_PATH")]
        chrome_path: Option<String>,

        /// Log debug screenshots on validation failures
        #[arg(long, env = "SCRAPER_DEBUG")]
        debug: bool,

        /// Restarts allowed per fault kind
        #[arg(long)]
        max_restarts: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            data_dir,
            input,
            headed,
            chrome_path,
            debug,
            max_restarts,
        } => {
            let mut request = CrawlRequest::new(data_dir)
                .with_headless(!headed)
                .with_debug(debug);
            if let Some(input) = input {
                request = request.with_input_path(input);
            }
            if let Some(path) = chrome_path {
                request = request.with_chrome_path(path);
            }
            if let Some(max_restarts) = max_restarts {
                request = request.with_max_restarts(max_restarts);
            }

            let mut service = CrawlService::new();
            match service.call(request).await {
                Ok(result) => {
                    println!("{}", result.status);
                    if result.is_complete() {
                        println!("all complete");
                    } else {
                        println!("run drained; remaining targets are retried on the next run or need a query fix");
                    }
                    Ok(())
                }
                Err(e @ ScraperError::RestartBudgetExhausted { .. }) => {
                    eprintln!("stopped after exhausting restart budget: {}", e);
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

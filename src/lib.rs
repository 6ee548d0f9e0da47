//! ドイツの自治体ごとのレストラン・口コミを収集する再開可能スクレイパー
//!
//! - 探索: 自治体の検索クエリから店舗リストを作成
//! - 収集: 店舗ごとに全言語の口コミとユーザープロフィールを取得
//! - 統合: 自治体単位のデータセットにまとめる
//!
//! 進捗はチェックポイントCSVに逐次永続化され、どこで停止しても再実行で続きから再開する。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use restaurant_review_scraper::{CrawlRequest, CrawlService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = CrawlService::new();
//!
//!     let request = CrawlRequest::new("./data").with_headless(false);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("Status: {}", result.status);
//! }
//! ```

pub mod artifact;
pub mod browser;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod input;
pub mod naming;
pub mod pipeline;
pub mod service;
pub mod traits;

// 主要な型をリエクスポート
pub use browser::ChromiumClient;
pub use checkpoint::{CheckpointStore, CsvCheckpointStore, TargetRecord, TargetStatus};
pub use config::ScraperConfig;
pub use error::{FaultKind, ScraperError};
pub use naming::DataLayout;
pub use pipeline::{Pipeline, RunSummary, StatusReport};
pub use service::{CrawlRequest, CrawlResult, CrawlService};
pub use traits::PageClient;

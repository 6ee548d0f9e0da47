//! 再開可能なクロールパイプライン
//!
//! 探索 → レストラン収集 → 統合 の3ステージと、それらを駆動する
//! オーケストレータ。進捗はすべて `CheckpointStore` 経由で読み書きし、
//! ステージをまたいで状態をメモリに保持しない。

mod discovery;
mod merge;
mod orchestrator;
mod record;
mod reviews;
mod types;

#[cfg(test)]
pub(crate) mod fake;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::naming::DataLayout;
use crate::traits::PageClient;

pub use record::{RestaurantRecord, ReviewRow};
pub use types::{
    DiscoveryOutcome, MergeOutcome, PageFlow, RejectReason, RestaurantOutcome, RunSummary,
    ScrapeReport, StatusReport, StopReason,
};

/// ブラウザクライアントとチェックポイントストアを束ねた実行単位
pub struct Pipeline<C, S> {
    client: C,
    store: S,
    config: ScraperConfig,
    layout: DataLayout,
    session_open: bool,
}

impl<C, S> Pipeline<C, S>
where
    C: PageClient,
    S: CheckpointStore,
{
    pub fn new(client: C, store: S, config: ScraperConfig) -> Self {
        let layout = DataLayout::new(config.data_dir.clone());
        Self {
            client,
            store,
            config,
            layout,
            session_open: false,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn into_parts(self) -> (C, S) {
        (self.client, self.store)
    }

    /// 必要になった時点でブラウザセッションを開始
    async fn ensure_session(&mut self) -> Result<(), ScraperError> {
        if !self.session_open {
            info!("Starting browser session");
            self.client.initialize().await?;
            self.session_open = true;
        }
        Ok(())
    }

    /// セッションを破棄（次の `ensure_session` で張り直す）
    async fn drop_session(&mut self) {
        if !self.session_open {
            return;
        }
        self.session_open = false;
        if let Err(e) = self.client.close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            debug!("Sleeping {:?}", duration);
            tokio::time::sleep(duration).await;
        }
    }
}

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::browser::ChromiumClient;
use crate::checkpoint::CsvCheckpointStore;
use crate::config::{RecoveryConfig, ScraperConfig};
use crate::error::ScraperError;
use crate::naming::DataLayout;
use crate::pipeline::{Pipeline, RunSummary, StatusReport};

/// クロール実行リクエスト
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub data_dir: PathBuf,
    /// 省略時は `<data_dir>/raw/input_municipalities.csv`
    pub input_path: Option<PathBuf>,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub debug: bool,
    pub max_restarts: Option<u32>,
}

impl CrawlRequest {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            input_path: None,
            headless: true,
            chrome_path: None,
            debug: false,
            max_restarts: None,
        }
    }

    pub fn with_input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }
}

impl From<CrawlRequest> for ScraperConfig {
    fn from(req: CrawlRequest) -> Self {
        let mut config = ScraperConfig::new(req.data_dir)
            .with_headless(req.headless)
            .with_debug(req.debug);
        if let Some(path) = req.input_path {
            config = config.with_input_path(path);
        }
        if let Some(path) = req.chrome_path {
            config = config.with_chrome_path(path);
        }
        if let Some(max_restarts) = req.max_restarts {
            config = config.with_recovery(RecoveryConfig {
                max_restarts,
                ..RecoveryConfig::default()
            });
        }
        config
    }
}

/// クロール結果
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub summary: RunSummary,
    /// 実行後のチェックポイント状態
    pub status: StatusReport,
}

impl CrawlResult {
    /// 処理可能なターゲットが残っていないか
    pub fn is_complete(&self) -> bool {
        use crate::checkpoint::TargetStatus;

        self.status.counts.iter().all(|(status, count)| {
            *count == 0 || matches!(status, TargetStatus::Done | TargetStatus::NoQuery)
        })
    }
}

/// tower::Serviceを実装したクロールサービス
#[derive(Debug, Clone, Default)]
pub struct CrawlService {
    base: Option<ScraperConfig>,
}

impl CrawlService {
    pub fn new() -> Self {
        Self::default()
    }

    /// リクエストに無い項目（待機時間・上限値など）の既定値を差し替える
    pub fn with_base_config(mut self, config: ScraperConfig) -> Self {
        self.base = Some(config);
        self
    }

    fn config_for(&self, req: CrawlRequest) -> ScraperConfig {
        let requested: ScraperConfig = req.into();
        match &self.base {
            Some(base) => ScraperConfig {
                data_dir: requested.data_dir,
                input_path: requested.input_path,
                headless: requested.headless,
                chrome_path: requested.chrome_path.or_else(|| base.chrome_path.clone()),
                debug: requested.debug || base.debug,
                ..base.clone()
            },
            None => requested,
        }
    }
}

impl Service<CrawlRequest> for CrawlService {
    type Response = CrawlResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CrawlRequest) -> Self::Future {
        info!("Crawl request received: data_dir={:?}", req.data_dir);
        let config = self.config_for(req);

        Box::pin(async move {
            let store = CsvCheckpointStore::new(DataLayout::new(config.data_dir.clone()));
            let client = ChromiumClient::new(config.clone());
            let mut pipeline = Pipeline::new(client, store, config);

            let summary = pipeline.run().await?;
            let status = pipeline.status_report()?;

            info!("Crawl finished: {}", status);
            Ok(CrawlResult { summary, status })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_crawl_request_builder() {
        let req = CrawlRequest::new("/tmp/data")
            .with_input_path("/tmp/input.csv")
            .with_headless(false)
            .with_max_restarts(5);

        assert_eq!(req.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(req.input_path, Some(PathBuf::from("/tmp/input.csv")));
        assert!(!req.headless);
        assert_eq!(req.max_restarts, Some(5));
    }

    #[test]
    fn test_crawl_request_to_config() {
        let config: ScraperConfig = CrawlRequest::new("/tmp/data").into();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(
            config.input_path,
            PathBuf::from("/tmp/data/raw/input_municipalities.csv")
        );
        assert!(config.headless);
        assert_eq!(config.recovery.max_restarts, RecoveryConfig::default().max_restarts);
    }

    #[test]
    fn test_base_config_keeps_tuning() {
        let base = ScraperConfig::default().with_timeout(Duration::from_secs(3));
        let service = CrawlService::new().with_base_config(base);

        let config = service.config_for(CrawlRequest::new("/tmp/data"));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
    }

    #[tokio::test]
    async fn test_empty_data_dir_completes_without_browser() {
        // 処理対象が無ければブラウザは起動しない
        let dir = tempfile::tempdir().unwrap();
        let mut service = CrawlService::new();
        let result = service.call(CrawlRequest::new(dir.path())).await.unwrap();

        assert!(result.is_complete());
        assert_eq!(result.status.total(), 0);
        assert_eq!(result.summary, RunSummary::default());
        assert!(DataLayout::new(dir.path()).checkpoint_path().exists());
    }
}

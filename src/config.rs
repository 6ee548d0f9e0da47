use std::path::PathBuf;
use std::time::Duration;

use crate::error::FaultKind;

const DEFAULT_BASE_URL: &str = "https://www.tripadvisor.de/Restaurants";

/// 検出対策の固定待機時間
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// レストラン間の待機
    pub restaurant_delay: Duration,
    /// 口コミ言語切替後の待機
    pub language_settle: Duration,
    /// ユーザーオーバーレイ操作前の待機
    pub overlay_settle: Duration,
    /// ページ送り後の待機
    pub page_turn: Duration,
    /// 検索範囲拡大オプトアウト後の待機
    pub broaden_settle: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            restaurant_delay: Duration::from_secs(3),
            language_settle: Duration::from_secs(2),
            overlay_settle: Duration::from_secs(1),
            page_turn: Duration::from_secs(2),
            broaden_settle: Duration::from_secs(3),
        }
    }
}

impl PacingConfig {
    /// 待機なし（テスト用）
    pub fn none() -> Self {
        Self {
            restaurant_delay: Duration::ZERO,
            language_settle: Duration::ZERO,
            overlay_settle: Duration::ZERO,
            page_turn: Duration::ZERO,
            broaden_settle: Duration::ZERO,
        }
    }
}

/// 障害からの再起動設定
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// 障害種別ごとの再起動上限
    pub max_restarts: u32,
    pub session_cooldown: Duration,
    pub timeout_cooldown: Duration,
    pub transport_cooldown: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            session_cooldown: Duration::from_secs(5),
            timeout_cooldown: Duration::from_secs(30),
            transport_cooldown: Duration::from_secs(300),
        }
    }
}

impl RecoveryConfig {
    pub fn immediate(max_restarts: u32) -> Self {
        Self {
            max_restarts,
            session_cooldown: Duration::ZERO,
            timeout_cooldown: Duration::ZERO,
            transport_cooldown: Duration::ZERO,
        }
    }

    /// 障害種別ごとの待ち時間
    pub fn cooldown(&self, kind: FaultKind) -> Duration {
        match kind {
            FaultKind::SessionLost => self.session_cooldown,
            FaultKind::Timeout => self.timeout_cooldown,
            FaultKind::Transport => self.transport_cooldown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub data_dir: PathBuf,
    pub input_path: PathBuf,
    pub base_url: String,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub debug: bool,
    /// 要素待機のタイムアウト
    pub timeout: Duration,
    /// 原文と翻訳が混在する言語
    pub home_language: String,
    pub max_result_pages: u32,
    pub max_review_pages: u32,
    /// 1ページ内で口コミなしの店がこの件数に達したら検索結果の巡回を打ち切る
    pub reviewless_entry_limit: usize,
    /// レコードの欠損セル比率の上限
    pub max_missing_ratio: f64,
    pub pacing: PacingConfig,
    pub recovery: RecoveryConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            input_path: data_dir.join("raw").join("input_municipalities.csv"),
            data_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            chrome_path: None,
            debug: false,
            timeout: Duration::from_secs(10),
            home_language: "de".to_string(),
            max_result_pages: 1000,
            max_review_pages: 1000,
            reviewless_entry_limit: 3,
            max_missing_ratio: 0.5,
            pacing: PacingConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// データディレクトリを指定して作成（入力ファイルは `raw/` 配下）
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            input_path: data_dir.join("raw").join("input_municipalities.csv"),
            data_dir,
            ..Default::default()
        }
    }

    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let data_dir = std::env::var("SCRAPER_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let mut config = Self::new(data_dir);

        if let Ok(value) = std::env::var("SCRAPER_HEADLESS") {
            config.headless = parse_flag(&value).unwrap_or(config.headless);
        }
        if let Ok(value) = std::env::var("SCRAPER_DEBUG") {
            config.debug = parse_flag(&value).unwrap_or(config.debug);
        }
        config.chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .ok();
        config
    }

    pub fn with_input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = path.into();
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_home_language(mut self, language: impl Into<String>) -> Self {
        self.home_language = language.into();
        self
    }

    pub fn with_page_caps(mut self, result_pages: u32, review_pages: u32) -> Self {
        self.max_result_pages = result_pages;
        self.max_review_pages = review_pages;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

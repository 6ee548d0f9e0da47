use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 一時的な環境障害の分類（オーケストレータの再起動判定に使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// ブラウザセッション喪失。セッションを張り直して再開
    SessionLost,
    /// 待機タイムアウト・要素参照切れ。短いクールダウン後に再開
    Timeout,
    /// ドライバ・通信障害。長いクールダウン後に再開
    Transport,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::SessionLost => "session-lost",
            FaultKind::Timeout => "timeout",
            FaultKind::Transport => "transport",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("セッション喪失: {0}")]
    Session(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素参照が無効: {0}")]
    StaleElement(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("通信エラー: {0}")]
    Transport(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("チェックポイント破損: {path:?}: {message}")]
    CheckpointCorrupt { path: PathBuf, message: String },

    #[error("書き込み済みの値は上書きできません: {key} の {field}")]
    WriteOnce { key: String, field: String },

    #[error("未登録のターゲット: {0}")]
    UnknownTarget(String),

    #[error("店舗リストに存在しないレストラン: {list} の {id}")]
    UnknownRestaurant { list: String, id: String },

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("再起動上限に到達: {kind} ({restarts}回): {last}")]
    RestartBudgetExhausted {
        kind: FaultKind,
        restarts: u32,
        last: String,
    },
}

impl ScraperError {
    /// オーケストレータで再起動対象となる障害かを分類
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            ScraperError::Session(_) => Some(FaultKind::SessionLost),
            ScraperError::Timeout(_) | ScraperError::StaleElement(_) => Some(FaultKind::Timeout),
            ScraperError::Transport(_) | ScraperError::Navigation(_) => Some(FaultKind::Transport),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.fault_kind().is_some()
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        ScraperError::CheckpointCorrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

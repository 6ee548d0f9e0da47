//! ステージの結果型

use std::collections::BTreeMap;
use std::fmt;

use crate::checkpoint::{TargetRecord, TargetStatus};
use crate::error::FaultKind;

/// 探索ステージの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// 店舗リストを保存した
    Persisted { list: String, entries: usize },
    /// 1件目の郵便番号が一致せず、検索クエリを無効化した
    QueryInvalidated { found: Option<String> },
    /// 店舗リストの検証に失敗（以降の探索は打ち切り）
    ValidationFailed { rows: usize, missing: usize },
    /// 検索クエリが無い
    NoQuery,
}

/// レストラン単位の破棄理由
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Empty,
    /// ページの口コミ件数表示が読めない
    MissingReportedCount,
    /// 表示件数より少ない（読み込み失敗の可能性）
    TooFewReviews { collected: usize, reported: u32 },
    TooManyMissing { missing: usize, cells: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "no reviews collected"),
            RejectReason::MissingReportedCount => write!(f, "reported review count unavailable"),
            RejectReason::TooFewReviews {
                collected,
                reported,
            } => write!(f, "collected {} of {} reported reviews", collected, reported),
            RejectReason::TooManyMissing { missing, cells } => {
                write!(f, "{} of {} cells missing", missing, cells)
            }
        }
    }
}

/// レストラン単位の結果
#[derive(Debug, Clone, PartialEq)]
pub enum RestaurantOutcome {
    Saved { artifact: String, rows: usize },
    Rejected(RejectReason),
}

/// 言語ごとのページ送りを止めた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LastPage,
    PageCap,
    /// 母国語ページで翻訳済み口コミに到達
    TranslatedReview,
}

/// 1ページ処理後の指示（ページループから言語ループへ返す）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlow {
    Continue,
    Stop(StopReason),
}

/// 統合ステージの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { dataset: String, rows: usize },
    /// 未完了のレストランが残っている
    Deferred { pending: usize, total: usize },
    /// 統合済み、または店舗リスト未作成
    Skipped,
}

/// スクレイプステージ1ターゲット分の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub saved: usize,
    pub rejected: usize,
    pub merged: Option<String>,
}

/// 1回の実行全体の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub invalidated: usize,
    pub restaurants_saved: usize,
    pub restaurants_rejected: usize,
    pub merged: usize,
    /// 探索を検証失敗で打ち切ったか
    pub discovery_halted: bool,
    pub restarts: BTreeMap<String, u32>,
}

impl RunSummary {
    pub(crate) fn record_restart(&mut self, kind: FaultKind) -> u32 {
        let count = self.restarts.entry(kind.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn restarts_for(&self, kind: FaultKind) -> u32 {
        self.restarts.get(&kind.to_string()).copied().unwrap_or(0)
    }
}

/// 状態ごとのターゲット数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub counts: BTreeMap<TargetStatus, usize>,
}

impl StatusReport {
    pub fn of(plan: &[(TargetRecord, TargetStatus)]) -> Self {
        let mut counts = BTreeMap::new();
        for (_, status) in plan {
            *counts.entry(*status).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .counts
            .iter()
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

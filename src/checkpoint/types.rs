//! チェックポイントの行型と状態遷移

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

/// スクレイプ進行中を示す `scraped` 列の値
pub const PENDING: &str = "PENDING";

/// 自治体チェックポイントの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub ags: String,
    pub municipality: String,
    pub state: String,
    #[serde(with = "postcode_set")]
    pub postcodes: BTreeSet<String>,
    /// `None` は手動修正待ち
    pub querystring: Option<String>,
    /// 店舗リストへのパス（一度だけ設定）
    pub scraping_targets: Option<String>,
    /// 統合データセットへのパス、または `PENDING`
    pub scraped: Option<String>,
}

impl TargetRecord {
    pub const COLUMNS: [&'static str; 7] = [
        "ags",
        "municipality",
        "state",
        "postcodes",
        "querystring",
        "scraping_targets",
        "scraped",
    ];

    pub fn new(
        ags: impl Into<String>,
        municipality: impl Into<String>,
        state: impl Into<String>,
        postcodes: impl IntoIterator<Item = impl Into<String>>,
        querystring: Option<String>,
    ) -> Self {
        Self {
            ags: ags.into(),
            municipality: municipality.into(),
            state: state.into(),
            postcodes: postcodes.into_iter().map(Into::into).collect(),
            querystring,
            scraping_targets: None,
            scraped: None,
        }
    }

    pub fn get(&self, field: TargetField) -> Option<&str> {
        match field {
            TargetField::QueryString => self.querystring.as_deref(),
            TargetField::ScrapingTargets => self.scraping_targets.as_deref(),
            TargetField::Scraped => self.scraped.as_deref(),
        }
    }

    /// 1項目を更新する。書き込み済みのポインタは上書き不可
    pub fn apply(&mut self, field: TargetField, value: Option<&str>) -> Result<(), ScraperError> {
        let current = self.get(field);
        let locked = match field {
            TargetField::QueryString => false,
            TargetField::ScrapingTargets => current.is_some(),
            TargetField::Scraped => current.is_some_and(|v| v != PENDING),
        };
        if locked && current != value {
            return Err(ScraperError::WriteOnce {
                key: self.ags.clone(),
                field: field.to_string(),
            });
        }

        let value = value.map(str::to_string);
        match field {
            TargetField::QueryString => self.querystring = value,
            TargetField::ScrapingTargets => self.scraping_targets = value,
            TargetField::Scraped => self.scraped = value,
        }
        Ok(())
    }

    /// 統合データセットが書き出し済みか
    pub fn is_merged(&self) -> bool {
        self.scraped.as_deref().is_some_and(|v| v != PENDING)
    }

    pub fn accepts_postcode(&self, postcode: &str) -> bool {
        self.postcodes.contains(postcode)
    }
}

/// 更新可能な項目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetField {
    QueryString,
    ScrapingTargets,
    Scraped,
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = match self {
            TargetField::QueryString => "querystring",
            TargetField::ScrapingTargets => "scraping_targets",
            TargetField::Scraped => "scraped",
        };
        f.write_str(column)
    }
}

/// 店舗リストの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantListEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    pub timestamp: String,
    /// 成果物へのパス。`None` は未スクレイプ
    pub scraped: Option<String>,
}

impl RestaurantListEntry {
    pub const COLUMNS: [&'static str; 5] = ["id", "name", "url", "timestamp", "scraped"];

    pub fn is_done(&self) -> bool {
        self.scraped.is_some()
    }
}

/// 店舗リストの消化状況
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListProgress {
    pub done: usize,
    pub total: usize,
}

impl ListProgress {
    pub fn of(entries: &[RestaurantListEntry]) -> Self {
        Self {
            done: entries.iter().filter(|e| e.is_done()).count(),
            total: entries.len(),
        }
    }

    pub fn pending(&self) -> usize {
        self.total - self.done
    }

    pub fn is_complete(&self) -> bool {
        self.done == self.total
    }
}

/// ターゲットの状態（この順に進む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetStatus {
    /// 検索クエリの手動修正待ち
    NoQuery,
    NeedsDiscovery,
    /// 探索ステージ処理中（永続化しない）
    DiscoveryInProgress,
    NeedsScrape,
    ScrapeInProgress,
    NeedsMerge,
    Done,
}

impl TargetStatus {
    /// チェックポイントと店舗リストの状況から状態を導出
    pub fn derive(record: &TargetRecord, progress: Option<ListProgress>) -> Self {
        if record.is_merged() {
            return TargetStatus::Done;
        }
        if record.scraping_targets.is_none() {
            return match record.querystring {
                Some(_) => TargetStatus::NeedsDiscovery,
                None => TargetStatus::NoQuery,
            };
        }
        let progress = progress.unwrap_or_default();
        if progress.total > 0 && progress.is_complete() {
            TargetStatus::NeedsMerge
        } else if record.scraped.as_deref() == Some(PENDING) || progress.done > 0 {
            TargetStatus::ScrapeInProgress
        } else {
            TargetStatus::NeedsScrape
        }
    }

    /// 今回の実行で処理を進められる状態か
    pub fn is_drivable(self) -> bool {
        matches!(
            self,
            TargetStatus::NeedsDiscovery
                | TargetStatus::DiscoveryInProgress
                | TargetStatus::NeedsScrape
                | TargetStatus::ScrapeInProgress
                | TargetStatus::NeedsMerge
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetStatus::NoQuery => "NO_QUERY",
            TargetStatus::NeedsDiscovery => "NEEDS_DISCOVERY",
            TargetStatus::DiscoveryInProgress => "DISCOVERY_IN_PROGRESS",
            TargetStatus::NeedsScrape => "NEEDS_SCRAPE",
            TargetStatus::ScrapeInProgress => "SCRAPE_IN_PROGRESS",
            TargetStatus::NeedsMerge => "NEEDS_MERGE",
            TargetStatus::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// 郵便番号集合の列表現
///
/// 書き出しはカンマ区切り。読み込みは `['09337', '09350']` 形式も受け付ける。
pub(crate) mod postcode_set {
    use std::collections::BTreeSet;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> BTreeSet<String> {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(|p| p.trim_matches(|c: char| matches!(c, '[' | ']' | '\'' | '"')))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn serialize<S: Serializer>(set: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error> {
        let joined = set.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse(&raw))
    }
}

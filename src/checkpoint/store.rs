use crate::error::ScraperError;

use super::types::{ListProgress, RestaurantListEntry, TargetField, TargetRecord};

/// 進捗状態の永続ストア
///
/// 読み出しは毎回永続化された最新の状態を返すこと（呼び出し側はステージを
/// またいで結果を保持しない）。書き込みは戻る前に永続化を完了すること。
pub trait CheckpointStore: Send {
    /// 全ターゲットを読み込む。初回（ファイルなし）は空で作成する
    fn load(&self) -> Result<Vec<TargetRecord>, ScraperError>;

    /// 未登録のターゲットを追加。既に存在すれば何もせず `false`
    fn insert_target(&mut self, record: TargetRecord) -> Result<bool, ScraperError>;

    /// 1ターゲットの1項目を更新して即時永続化
    fn upsert(
        &mut self,
        ags: &str,
        field: TargetField,
        value: Option<&str>,
    ) -> Result<(), ScraperError>;

    /// 店舗リストを読み込む
    fn read_restaurant_list(&self, list: &str) -> Result<Vec<RestaurantListEntry>, ScraperError>;

    /// 店舗リストを書き出す
    fn write_restaurant_list(
        &mut self,
        list: &str,
        entries: &[RestaurantListEntry],
    ) -> Result<(), ScraperError>;

    /// レストランの成果物パスを記録して即時永続化
    fn mark_restaurant(&mut self, list: &str, id: &str, artifact: &str) -> Result<(), ScraperError>;

    fn target(&self, ags: &str) -> Result<TargetRecord, ScraperError> {
        self.load()?
            .into_iter()
            .find(|t| t.ags == ags)
            .ok_or_else(|| ScraperError::UnknownTarget(ags.to_string()))
    }

    /// `field` が未設定のターゲット
    fn targets_missing(&self, field: TargetField) -> Result<Vec<TargetRecord>, ScraperError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|t| t.get(field).is_none())
            .collect())
    }

    /// `field` が未設定、または進行中を示す値のターゲット
    fn targets_pending(
        &self,
        field: TargetField,
        sentinels: &[&str],
    ) -> Result<Vec<TargetRecord>, ScraperError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|t| t.get(field).map_or(true, |v| sentinels.contains(&v)))
            .collect())
    }

    fn list_progress(&self, list: &str) -> Result<ListProgress, ScraperError> {
        Ok(ListProgress::of(&self.read_restaurant_list(list)?))
    }
}

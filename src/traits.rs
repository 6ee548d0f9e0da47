use async_trait::async_trait;

use crate::error::ScraperError;
use crate::extract::{FetchMode, Field, Scope};

/// 口コミ言語の選択UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    /// 「Weitere Sprachen」オーバーレイ
    Overlay,
    /// 口コミ欄のラジオボタン一覧
    Radio,
}

/// 対象サイトを操作するブラウザ側の窓口
///
/// パイプラインはこのトレイト経由でのみページに触れる。
/// 要素が無いだけなら `Ok(None)` / `Ok(false)` を返し、
/// セッション喪失やタイムアウトは対応する `ScraperError` で返すこと。
#[async_trait]
pub trait PageClient: Send {
    /// ブラウザセッション開始
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// 検索クエリでレストラン検索結果ページを開く
    async fn search(&mut self, query: &str) -> Result<(), ScraperError>;

    /// 検索範囲の自動拡大をオプトアウト（該当UIがなければ `false`）
    async fn opt_out_radius_broadening(&mut self) -> Result<bool, ScraperError>;

    /// 検索結果1件目の住所（生テキスト）
    async fn top_result_address(&mut self) -> Result<Option<String>, ScraperError>;

    /// 現在の検索結果ページの店舗一覧
    async fn list_entries(&mut self) -> Result<Vec<Scope>, ScraperError>;

    /// 店舗に口コミが付いているか
    async fn entry_has_reviews(&mut self, entry: &Scope) -> Result<bool, ScraperError>;

    /// レストランの口コミページを開く
    async fn open_entry(&mut self, url: &str) -> Result<(), ScraperError>;

    /// フィールドの生テキストを取得（整形は `extract::fetch_field` 側）
    async fn get_field(
        &mut self,
        scope: &Scope,
        field: Field,
        mode: FetchMode,
    ) -> Result<Option<String>, ScraperError>;

    /// 口コミ言語の選択UIと選択肢数
    async fn list_review_languages(&mut self) -> Result<(PickerMode, usize), ScraperError>;

    /// n 番目の言語を有効化して言語コードを返す
    async fn select_language(
        &mut self,
        mode: PickerMode,
        index: usize,
    ) -> Result<Option<String>, ScraperError>;

    /// 現在ページの口コミ一覧
    async fn list_reviews(&mut self) -> Result<Vec<Scope>, ScraperError>;

    /// 機械翻訳された口コミか
    async fn is_machine_translated(&mut self, review: &Scope) -> Result<bool, ScraperError>;

    /// ユーザープロフィールのオーバーレイを開く。開けなければ `None`
    async fn open_user_overlay(&mut self, review: &Scope) -> Result<Option<Scope>, ScraperError>;

    /// 開いたままのオーバーレイを閉じる
    async fn close_overlays(&mut self) -> Result<(), ScraperError>;

    /// 次ページへ。`current` は現在のページ番号（1始まり）
    async fn next_page(&mut self, current: u32) -> Result<bool, ScraperError>;

    /// 調査用の画面キャプチャ（既定では何もしない）
    async fn debug_snapshot(&mut self, _label: &str) -> Result<(), ScraperError> {
        Ok(())
    }
}

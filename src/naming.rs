//! ファイル名・識別子の導出とデータディレクトリの配置

use std::path::{Path, PathBuf};

/// 自治体名からファイル名用の接尾辞を作る
///
/// ウムラウト等を ASCII に畳み込み、空白・記号を除去して小文字化する。
pub fn file_suffix(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'ä' | 'Ä' => folded.push_str("ae"),
            'ö' | 'Ö' => folded.push_str("oe"),
            'ü' | 'Ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            'à' | 'á' | 'â' | 'ã' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Å' => folded.push('a'),
            'ç' | 'Ç' => folded.push('c'),
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => folded.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => folded.push('i'),
            'ñ' | 'Ñ' => folded.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => folded.push('o'),
            'ù' | 'ú' | 'û' | 'Ù' | 'Ú' | 'Û' => folded.push('u'),
            'ý' | 'ÿ' | 'Ý' => folded.push('y'),
            c if c.is_ascii_alphanumeric() => folded.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    folded
}

/// レストランURLから識別子を導出
///
/// `.../Restaurant_Review-g1931731-d5511518-Reviews-Name-Ort.html` -> `g1931731d5511518`
pub fn restaurant_id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("Restaurant_Review-")?;
    let mut parts = tail.split('-');
    let geo = parts.next().filter(|p| p.starts_with('g') && p.len() > 1)?;
    let detail = parts.next().filter(|p| p.starts_with('d') && p.len() > 1)?;
    Some(format!("{}{}", geo, detail))
}

/// データディレクトリ配下のファイル配置
///
/// チェックポイントに保存するパスは `root` からの相対パス。
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 自治体単位のチェックポイント
    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("raw").join("query_municipalities.csv")
    }

    /// 店舗リスト（相対パス）
    pub fn restaurant_list(&self, municipality: &str, ags: &str) -> String {
        format!("raw/query_restaurants_{}_{}.csv", file_suffix(municipality), ags)
    }

    /// レストラン単位の一時成果物（相対パス）
    pub fn restaurant_artifact(&self, municipality: &str, ags: &str, restaurant_id: &str) -> String {
        format!(
            "temp/results_restaurant_{}_{}_{}.csv",
            file_suffix(municipality),
            ags,
            restaurant_id
        )
    }

    /// 自治体単位の統合データセット（相対パス）
    pub fn merged_dataset(&self, municipality: &str, ags: &str) -> String {
        format!("processed/results_{}_{}.json", file_suffix(municipality), ags)
    }

    /// 相対パスを絶対パスへ
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

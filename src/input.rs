//! 自治体参照テーブルの読み込み

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::artifact::csv_reader;
use crate::checkpoint::TargetRecord;
use crate::error::ScraperError;

/// 参照テーブルの1行（列順は問わない）
#[derive(Debug, Clone, Deserialize)]
struct InputRow {
    ags: String,
    municipality: String,
    state: String,
    #[serde(with = "crate::checkpoint::postcode_set")]
    postcodes: BTreeSet<String>,
    #[serde(default)]
    querystring: Option<String>,
}

/// 既定の検索クエリ
pub fn default_query(municipality: &str, state: &str) -> String {
    format!("{} {}", municipality.trim(), state.trim())
}

/// 参照テーブルを読み込んでターゲット行にする
///
/// 検索クエリが空なら `"<自治体名> <州名>"` を補う。`ags` の重複は設定エラー。
pub fn read_targets(path: &Path) -> Result<Vec<TargetRecord>, ScraperError> {
    let mut reader = csv_reader(path)
        .map_err(|e| ScraperError::Config(format!("{}: {}", path.display(), e)))?;

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for row in reader.deserialize::<InputRow>() {
        let row = row.map_err(|e| ScraperError::Config(format!("{}: {}", path.display(), e)))?;
        if !seen.insert(row.ags.clone()) {
            return Err(ScraperError::Config(format!(
                "{}: duplicate ags {}",
                path.display(),
                row.ags
            )));
        }

        let query = row
            .querystring
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| default_query(&row.municipality, &row.state));
        targets.push(TargetRecord::new(
            row.ags,
            row.municipality,
            row.state,
            row.postcodes,
            Some(query),
        ));
    }
    Ok(targets)
}

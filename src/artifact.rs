//! 成果物ファイルの読み書き
//!
//! - レストラン単位: セミコロン区切りCSV（1行 = 1口コミ）
//! - 自治体単位: 統合JSON（カテゴリ列の値域つき）

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

/// カテゴリとして値域を保持する列
pub const CATEGORICAL_COLUMNS: [&str; 8] = [
    "cuisine1",
    "cuisine2",
    "cuisine3",
    "review_user_gender",
    "review_user_age",
    "review_user_country",
    "review_user_overlay_failed",
    "review_language",
];

/// 一時ファイルに書いてからリネームする
///
/// `write` は書き終えたファイルを返す。リネーム前に内容を、リネーム後に
/// ディレクトリエントリをディスクへ同期する。
pub(crate) fn persist_atomically<F>(path: &Path, write: F) -> Result<(), ScraperError>
where
    F: FnOnce(&Path) -> Result<File, ScraperError>,
{
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let synced = write(&tmp).and_then(|file| Ok(file.sync_all()?));
    if let Err(e) = synced {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    if let Some(parent) = parent {
        sync_dir(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), ScraperError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), ScraperError> {
    Ok(())
}

/// CSVライターを閉じて中身の入ったファイルを取り出す
pub(crate) fn finish_csv(writer: csv::Writer<File>) -> Result<File, ScraperError> {
    writer.into_inner().map_err(|e| {
        ScraperError::FileIO(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })
}

pub(crate) fn csv_writer(path: &Path) -> Result<csv::Writer<File>, ScraperError> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)?)
}

pub(crate) fn csv_reader(path: &Path) -> Result<csv::Reader<File>, ScraperError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_path(path)?)
}

/// 列名つきの表（欠損は `None`）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    pub fn missing_cells(&self) -> usize {
        self.rows.iter().flatten().filter(|c| c.is_none()).count()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 列の値域（欠損を除く）
    pub fn domain(&self, column: &str) -> BTreeSet<String> {
        let Some(idx) = self.column_index(column) else {
            return BTreeSet::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).cloned().flatten())
            .collect()
    }
}

pub fn write_table(path: &Path, table: &Table) -> Result<(), ScraperError> {
    persist_atomically(path, |tmp| {
        let mut writer = csv_writer(tmp)?;
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        finish_csv(writer)
    })
}

pub fn read_table(path: &Path) -> Result<Table, ScraperError> {
    let mut reader = csv_reader(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        );
    }
    Ok(Table { columns, rows })
}

/// 自治体単位の統合データセット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDataset {
    pub ags: String,
    pub municipality: String,
    pub columns: Vec<String>,
    /// カテゴリ列ごとの値域（全入力の和集合）
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub rows: Vec<Vec<Option<String>>>,
    pub merged_at: String,
}

impl MergedDataset {
    /// レストラン単位の表を縦に連結する
    ///
    /// 列は初出順の和集合、入力に無い列は欠損で埋める。
    pub fn merge(ags: &str, municipality: &str, tables: &[Table]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(tables.iter().map(Table::len).sum());
        for table in tables {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| table.column_index(c)).collect();
            for row in &table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.and_then(|i| row.get(i).cloned().flatten()))
                        .collect(),
                );
            }
        }

        let mut categories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for column in CATEGORICAL_COLUMNS {
            if !columns.iter().any(|c| c == column) {
                continue;
            }
            let domain = categories.entry(column.to_string()).or_default();
            for table in tables {
                domain.extend(table.domain(column));
            }
        }

        Self {
            ags: ags.to_string(),
            municipality: municipality.to_string(),
            columns,
            categories,
            rows,
            merged_at: Local::now().format("%Y-%m-%d, %H:%M:%S").to_string(),
        }
    }
}

pub fn write_merged(path: &Path, dataset: &MergedDataset) -> Result<(), ScraperError> {
    persist_atomically(path, |tmp| {
        let mut writer = BufWriter::new(File::create(tmp)?);
        serde_json::to_writer(&mut writer, dataset)?;
        Ok(writer.into_inner().map_err(|e| e.into_error())?)
    })
}

pub fn read_merged(path: &Path) -> Result<MergedDataset, ScraperError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_table_survives_csv_with_missing_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("temp").join("r.csv");
        let table = Table {
            columns: vec!["id".into(), "review_text".into(), "review_score".into()],
            rows: vec![
                vec![cell("g1d1"), cell("Sehr gut; gerne wieder"), cell("5")],
                vec![cell("g1d1"), None, cell("3")],
            ],
        };
        write_table(&path, &table).unwrap();
        assert!(!path.with_extension("csv.tmp").exists());

        let read = read_table(&path).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.missing_cells(), 1);
        assert_eq!(read.cell_count(), 6);
    }

    #[test]
    fn test_merge_unions_columns_and_categories() {
        let first = Table {
            columns: vec!["id".into(), "review_language".into()],
            rows: vec![vec![cell("a"), cell("de")], vec![cell("a"), cell("en")]],
        };
        let second = Table {
            columns: vec!["id".into(), "review_language".into(), "cuisine1".into()],
            rows: vec![vec![cell("b"), cell("fr"), cell("Italienisch")]],
        };

        let merged = MergedDataset::merge("14523300", "Oelsnitz", &[first, second]);
        assert_eq!(merged.columns, vec!["id", "review_language", "cuisine1"]);
        assert_eq!(merged.rows.len(), 3);
        assert_eq!(merged.rows[0], vec![cell("a"), cell("de"), None]);

        let languages: Vec<&str> = merged.categories["review_language"]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(languages, vec!["de", "en", "fr"]);
        assert_eq!(merged.categories["cuisine1"].len(), 1);
        assert!(!merged.categories.contains_key("review_user_gender"));
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw").join("list.csv");
        let table = Table {
            columns: vec!["id".into()],
            rows: vec![vec![cell("g1d1")]],
        };
        write_table(&path, &table).unwrap();

        let result = persist_atomically(&path, |tmp| {
            File::create(tmp)?;
            Err(ScraperError::Config("interrupted".into()))
        });
        assert!(result.is_err());
        assert!(!dir.path().join("raw").join("list.csv.tmp").exists());
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn test_merged_dataset_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed").join("m.json");
        let merged = MergedDataset::merge("1", "A", &[Table::default()]);
        write_merged(&path, &merged).unwrap();
        assert_eq!(read_merged(&path).unwrap(), merged);
    }
}

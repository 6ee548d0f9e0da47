//! セミコロン区切りCSVによるチェックポイントストア

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::artifact::{csv_reader, csv_writer, finish_csv, persist_atomically};
use crate::error::ScraperError;
use crate::naming::DataLayout;

use super::store::CheckpointStore;
use super::types::{RestaurantListEntry, TargetField, TargetRecord};

/// `DataLayout` 配下のCSVファイルに進捗を保存するストア
///
/// 全ての書き込みは一時ファイル経由で置き換えるため、途中で落ちても
/// 直前の内容か新しい内容のどちらかが残る。
#[derive(Debug, Clone)]
pub struct CsvCheckpointStore {
    layout: DataLayout,
}

impl CsvCheckpointStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    fn save_targets(&self, targets: &[TargetRecord]) -> Result<(), ScraperError> {
        write_rows(&self.layout.checkpoint_path(), &TargetRecord::COLUMNS, targets)
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>, ScraperError> {
    let mut reader = csv_reader(path).map_err(|e| ScraperError::corrupt(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| ScraperError::corrupt(path, e))?
        .clone();
    if headers.iter().ne(columns.iter().copied()) {
        return Err(ScraperError::corrupt(
            path,
            format!("unexpected header: {:?}", headers.iter().collect::<Vec<_>>()),
        ));
    }

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record.map_err(|e| ScraperError::corrupt(path, e))?);
    }
    Ok(rows)
}

fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<(), ScraperError> {
    persist_atomically(path, |tmp| {
        let mut writer = csv_writer(tmp)?;
        writer.write_record(columns)?;
        for row in rows {
            writer.serialize(row)?;
        }
        finish_csv(writer)
    })
}

impl CheckpointStore for CsvCheckpointStore {
    fn load(&self) -> Result<Vec<TargetRecord>, ScraperError> {
        let path = self.layout.checkpoint_path();
        if !path.exists() {
            debug!("Creating empty checkpoint at {}", path.display());
            self.save_targets(&[])?;
            return Ok(Vec::new());
        }

        let targets: Vec<TargetRecord> = read_rows(&path, &TargetRecord::COLUMNS)?;
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.ags.as_str()) {
                return Err(ScraperError::corrupt(
                    &path,
                    format!("duplicate ags {}", target.ags),
                ));
            }
        }
        Ok(targets)
    }

    fn insert_target(&mut self, record: TargetRecord) -> Result<bool, ScraperError> {
        let mut targets = self.load()?;
        if targets.iter().any(|t| t.ags == record.ags) {
            return Ok(false);
        }
        targets.push(record);
        self.save_targets(&targets)?;
        Ok(true)
    }

    fn upsert(
        &mut self,
        ags: &str,
        field: TargetField,
        value: Option<&str>,
    ) -> Result<(), ScraperError> {
        let mut targets = self.load()?;
        let target = targets
            .iter_mut()
            .find(|t| t.ags == ags)
            .ok_or_else(|| ScraperError::UnknownTarget(ags.to_string()))?;
        target.apply(field, value)?;
        self.save_targets(&targets)
    }

    fn read_restaurant_list(&self, list: &str) -> Result<Vec<RestaurantListEntry>, ScraperError> {
        read_rows(&self.layout.resolve(list), &RestaurantListEntry::COLUMNS)
    }

    fn write_restaurant_list(
        &mut self,
        list: &str,
        entries: &[RestaurantListEntry],
    ) -> Result<(), ScraperError> {
        write_rows(&self.layout.resolve(list), &RestaurantListEntry::COLUMNS, entries)
    }

    fn mark_restaurant(&mut self, list: &str, id: &str, artifact: &str) -> Result<(), ScraperError> {
        let mut entries = self.read_restaurant_list(list)?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ScraperError::UnknownRestaurant {
                list: list.to_string(),
                id: id.to_string(),
            })?;
        match entry.scraped.as_deref() {
            Some(existing) if existing == artifact => return Ok(()),
            Some(_) => {
                return Err(ScraperError::WriteOnce {
                    key: id.to_string(),
                    field: "scraped".to_string(),
                })
            }
            None => entry.scraped = Some(artifact.to_string()),
        }
        self.write_restaurant_list(list, &entries)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::checkpoint::types::{TargetStatus, PENDING};

    fn store(root: &Path) -> CsvCheckpointStore {
        CsvCheckpointStore::new(DataLayout::new(root))
    }

    fn target(ags: &str) -> TargetRecord {
        TargetRecord::new(
            ags,
            "Oelsnitz/Erzgeb.",
            "Sachsen",
            ["09376"],
            Some("Oelsnitz/Erzgeb. Sachsen".to_string()),
        )
    }

    fn entry(id: &str) -> RestaurantListEntry {
        RestaurantListEntry {
            id: id.to_string(),
            name: format!("Restaurant {}", id),
            url: format!("https://www.tripadvisor.de/Restaurant_Review-g1-{}-Reviews.html", id),
            timestamp: "2026-10-16, 10:00:00".to_string(),
            scraped: None,
        }
    }

    #[test]
    fn test_load_creates_empty_checkpoint() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.load().unwrap().is_empty());

        let content = fs::read_to_string(dir.path().join("raw/query_municipalities.csv")).unwrap();
        assert_eq!(
            content.trim_end(),
            "ags;municipality;state;postcodes;querystring;scraping_targets;scraped"
        );
    }

    #[test]
    fn test_upsert_is_visible_to_fresh_store() {
        let dir = tempdir().unwrap();
        let mut first = store(dir.path());
        assert!(first.insert_target(target("14521440")).unwrap());
        assert!(!first.insert_target(target("14521440")).unwrap());
        first
            .upsert("14521440", TargetField::ScrapingTargets, Some("raw/list.csv"))
            .unwrap();
        first
            .upsert("14521440", TargetField::Scraped, Some(PENDING))
            .unwrap();

        // 別インスタンスから読み直しても同じ内容
        let second = store(dir.path());
        let record = second.target("14521440").unwrap();
        assert_eq!(record.scraping_targets.as_deref(), Some("raw/list.csv"));
        assert_eq!(record.scraped.as_deref(), Some(PENDING));
        assert!(record.accepts_postcode("09376"));
        assert_eq!(
            TargetStatus::derive(&record, None),
            TargetStatus::ScrapeInProgress
        );
        assert!(second.targets_missing(TargetField::ScrapingTargets).unwrap().is_empty());
        assert_eq!(
            second
                .targets_pending(TargetField::Scraped, &[PENDING])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_write_once_survives_reload() {
        let dir = tempdir().unwrap();
        let mut store = store(dir.path());
        store.insert_target(target("1")).unwrap();
        store
            .upsert("1", TargetField::ScrapingTargets, Some("raw/a.csv"))
            .unwrap();
        let err = store
            .upsert("1", TargetField::ScrapingTargets, Some("raw/b.csv"))
            .unwrap_err();
        assert!(matches!(err, ScraperError::WriteOnce { .. }));
        assert_eq!(
            store.target("1").unwrap().scraping_targets.as_deref(),
            Some("raw/a.csv")
        );
        assert!(matches!(
            store.upsert("2", TargetField::Scraped, Some(PENDING)),
            Err(ScraperError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_corrupt_checkpoint_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw/query_municipalities.csv");
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(&path, "ags;name\n1;x\n").unwrap();
        assert!(matches!(
            store(dir.path()).load(),
            Err(ScraperError::CheckpointCorrupt { .. })
        ));

        fs::write(
            &path,
            "ags;municipality;state;postcodes;querystring;scraping_targets;scraped\n\
             1;A;S;01234;A S;;\n\
             1;A;S;01234;A S;;\n",
        )
        .unwrap();
        assert!(matches!(
            store(dir.path()).load(),
            Err(ScraperError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_mark_restaurant() {
        let dir = tempdir().unwrap();
        let mut store = store(dir.path());
        let list = "raw/query_restaurants_x_1.csv";
        store
            .write_restaurant_list(list, &[entry("d1"), entry("d2")])
            .unwrap();
        store.mark_restaurant(list, "d1", "temp/r1.csv").unwrap();
        store.mark_restaurant(list, "d1", "temp/r1.csv").unwrap();

        let progress = store.list_progress(list).unwrap();
        assert_eq!((progress.done, progress.total), (1, 2));

        assert!(matches!(
            store.mark_restaurant(list, "d1", "temp/other.csv"),
            Err(ScraperError::WriteOnce { .. })
        ));
        assert!(matches!(
            store.mark_restaurant(list, "d9", "temp/r9.csv"),
            Err(ScraperError::UnknownRestaurant { .. })
        ));
    }
}

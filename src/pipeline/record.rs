//! レストラン単位の収集結果（1行 = 1口コミ、店舗情報は各行に複製）

use std::collections::HashSet;

use crate::artifact::Table;
use crate::checkpoint::{RestaurantListEntry, TargetRecord};
use crate::extract::{FetchMode, Field};

use super::types::RejectReason;

const OVERLAY_FAILED: &str = "review_user_overlay_failed";
const LANGUAGE: &str = "review_language";

/// 口コミ1件分
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub values: Vec<(Field, Option<String>)>,
    /// ユーザー情報の取得経路
    pub mode: FetchMode,
    pub language: Option<String>,
}

impl ReviewRow {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn review_id(&self) -> Option<&str> {
        self.get(Field::ReviewId)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub municipality: String,
    pub ags: String,
    /// 店舗情報（`Field::RESTAURANT`）
    pub facts: Vec<(Field, Option<String>)>,
    /// ページに表示された口コミ件数
    pub reported_reviews: Option<u32>,
    pub reviews: Vec<ReviewRow>,
}

impl RestaurantRecord {
    pub fn new(target: &TargetRecord, entry: &RestaurantListEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            url: entry.url.clone(),
            municipality: target.municipality.clone(),
            ags: target.ags.clone(),
            facts: Vec::new(),
            reported_reviews: None,
            reviews: Vec::new(),
        }
    }

    /// 成果物の列
    pub fn columns() -> Vec<&'static str> {
        let mut columns = vec!["id", "name", "url", "municipality", "ags"];
        columns.extend(Field::RESTAURANT.iter().map(|f| f.column()));
        columns.extend(Field::USER_PROFILE.iter().map(|f| f.column()));
        columns.push(OVERLAY_FAILED);
        columns.extend(Field::REVIEW.iter().map(|f| f.column()));
        columns.push(LANGUAGE);
        columns
    }

    fn fact(&self, field: Field) -> Option<String> {
        self.facts
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, v)| v.clone())
    }

    /// 口コミIDの重複を除去（後に出たものを残す）
    ///
    /// IDが取れなかった口コミは除去しない。
    pub fn dedup_reviews(&mut self) -> usize {
        let before = self.reviews.len();
        let mut seen = HashSet::new();
        let mut kept: Vec<ReviewRow> = Vec::with_capacity(before);
        for row in self.reviews.drain(..).rev() {
            let keep = match row.review_id() {
                Some(id) => seen.insert(id.to_string()),
                None => true,
            };
            if keep {
                kept.push(row);
            }
        }
        kept.reverse();
        self.reviews = kept;
        before - self.reviews.len()
    }

    pub fn to_table(&self) -> Table {
        let columns: Vec<String> = Self::columns().into_iter().map(str::to_string).collect();
        let mut head = vec![
            Some(self.id.clone()),
            Some(self.name.clone()),
            Some(self.url.clone()),
            Some(self.municipality.clone()),
            Some(self.ags.clone()),
        ];
        head.extend(Field::RESTAURANT.iter().map(|f| self.fact(*f)));

        let rows = self
            .reviews
            .iter()
            .map(|review| {
                let mut row = head.clone();
                row.extend(
                    Field::USER_PROFILE
                        .iter()
                        .map(|f| review.get(*f).map(str::to_string)),
                );
                row.push(Some(review.mode.overlay_failed_flag().to_string()));
                row.extend(Field::REVIEW.iter().map(|f| review.get(*f).map(str::to_string)));
                row.push(review.language.clone());
                row
            })
            .collect();

        Table { columns, rows }
    }

    /// 保存前の検証
    ///
    /// 表示件数より多いのは許容（表示が1件多くずれることがある）。
    pub fn validate(&self, max_missing_ratio: f64) -> Result<Table, RejectReason> {
        if self.reviews.is_empty() {
            return Err(RejectReason::Empty);
        }
        let reported = self
            .reported_reviews
            .ok_or(RejectReason::MissingReportedCount)?;
        if self.reviews.len() < reported as usize {
            return Err(RejectReason::TooFewReviews {
                collected: self.reviews.len(),
                reported,
            });
        }

        let table = self.to_table();
        let missing = table.missing_cells();
        let cells = table.cell_count();
        if missing as f64 > max_missing_ratio * cells as f64 {
            return Err(RejectReason::TooManyMissing { missing, cells });
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RestaurantRecord {
        let target = TargetRecord::new("14523300", "Oelsnitz/Vogtl.", "Sachsen", ["08606"], None);
        let entry = RestaurantListEntry {
            id: "g1d2".into(),
            name: "Ratskeller".into(),
            url: "https://www.tripadvisor.de/Restaurant_Review-g1-d2-Reviews.html".into(),
            timestamp: "2026-10-16, 10:00:00".into(),
            scraped: None,
        };
        let mut record = RestaurantRecord::new(&target, &entry);
        record.facts = Field::RESTAURANT
            .iter()
            .map(|f| (*f, Some(format!("{:?}", f))))
            .collect();
        record
    }

    fn review(id: Option<&str>, title: &str, mode: FetchMode) -> ReviewRow {
        let mut values: Vec<(Field, Option<String>)> = Field::REVIEW
            .iter()
            .map(|f| (*f, Some(format!("{:?}", f))))
            .collect();
        values.retain(|(f, _)| *f != Field::ReviewId && *f != Field::ReviewTitle);
        values.push((Field::ReviewId, id.map(str::to_string)));
        values.push((Field::ReviewTitle, Some(title.to_string())));
        for field in Field::USER_PROFILE {
            let value = match mode {
                FetchMode::Primary => Some("x".to_string()),
                FetchMode::Fallback => None,
            };
            values.push((field, value));
        }
        ReviewRow {
            values,
            mode,
            language: Some("de".into()),
        }
    }

    #[test]
    fn test_dedup_keeps_last_copy() {
        let mut record = record();
        record.reviews = vec![
            review(Some("1"), "first", FetchMode::Primary),
            review(Some("2"), "two", FetchMode::Primary),
            review(Some("1"), "second", FetchMode::Primary),
            review(None, "anonymous", FetchMode::Primary),
            review(None, "anonymous", FetchMode::Primary),
        ];
        assert_eq!(record.dedup_reviews(), 1);
        let titles: Vec<&str> = record
            .reviews
            .iter()
            .map(|r| r.get(Field::ReviewTitle).unwrap())
            .collect();
        assert_eq!(titles, vec!["two", "second", "anonymous", "anonymous"]);
    }

    #[test]
    fn test_validation_accepts_overshoot_but_not_shortfall() {
        let mut record = record();
        record.reviews = (0..12)
            .map(|i| review(Some(&i.to_string()), "t", FetchMode::Primary))
            .collect();

        record.reported_reviews = Some(12);
        assert_eq!(record.validate(0.5).unwrap().len(), 12);
        record.reported_reviews = Some(11);
        assert!(record.validate(0.5).is_ok());
        record.reported_reviews = Some(13);
        assert_eq!(
            record.validate(0.5).unwrap_err(),
            RejectReason::TooFewReviews {
                collected: 12,
                reported: 13
            }
        );
        record.reported_reviews = None;
        assert_eq!(
            record.validate(0.5).unwrap_err(),
            RejectReason::MissingReportedCount
        );
        record.reviews.clear();
        assert_eq!(record.validate(0.5).unwrap_err(), RejectReason::Empty);
    }

    #[test]
    fn test_missing_ratio_bound() {
        let mut record = record();
        record.reported_reviews = Some(1);
        record.reviews = vec![review(Some("1"), "t", FetchMode::Fallback)];
        let table = record.validate(0.5).unwrap();
        assert!(table.missing_cells() > 0);

        record.facts.iter_mut().for_each(|(_, v)| *v = None);
        record.reviews[0].values.iter_mut().for_each(|(_, v)| *v = None);
        assert!(matches!(
            record.validate(0.5),
            Err(RejectReason::TooManyMissing { .. })
        ));
    }

    #[test]
    fn test_table_layout() {
        let mut record = record();
        record.reviews = vec![review(Some("9"), "t", FetchMode::Fallback)];
        let table = record.to_table();
        assert_eq!(table.columns.len(), RestaurantRecord::columns().len());
        let row = &table.rows[0];
        let flag = table.column_index("review_user_overlay_failed").unwrap();
        assert_eq!(row[flag].as_deref(), Some("1"));
        let ags = table.column_index("ags").unwrap();
        assert_eq!(row[ags].as_deref(), Some("14523300"));
        let language = table.column_index("review_language").unwrap();
        assert_eq!(row[language].as_deref(), Some("de"));
    }
}

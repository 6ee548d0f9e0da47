//! テスト用のスクリプト化された `PageClient`

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;

use crate::checkpoint::CsvCheckpointStore;
use crate::config::{PacingConfig, RecoveryConfig, ScraperConfig};
use crate::error::ScraperError;
use crate::extract::{FetchMode, Field, Scope};
use crate::naming::DataLayout;
use crate::traits::{PageClient, PickerMode};

use super::Pipeline;

pub(crate) const PROFILE: &str = "Mann, 35-49 aus Chemnitz, Sachsen, Deutschland";

#[derive(Debug, Clone)]
pub(crate) struct FakeEntry {
    pub name: String,
    pub url: Option<String>,
    pub has_reviews: bool,
}

impl FakeEntry {
    pub fn restaurant(geo: &str, detail: &str, name: &str) -> Self {
        Self {
            name: format!("1. {}", name),
            url: Some(restaurant_url(geo, detail)),
            has_reviews: true,
        }
    }

    pub fn reviewless(mut self) -> Self {
        self.has_reviews = false;
        self
    }
}

pub(crate) fn restaurant_url(geo: &str, detail: &str) -> String {
    format!(
        "https://www.tripadvisor.de/Restaurant_Review-{}-{}-Reviews-Fake.html",
        geo, detail
    )
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSearch {
    pub top_address: Option<String>,
    pub broadening: bool,
    pub pages: Vec<Vec<FakeEntry>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeReview {
    pub id: Option<String>,
    pub title: String,
    pub translated: bool,
    pub overlay: bool,
}

impl FakeReview {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            title: format!("Review {}", id),
            translated: false,
            overlay: true,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn translated(mut self) -> Self {
        self.translated = true;
        self
    }

    pub fn without_overlay(mut self) -> Self {
        self.overlay = false;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeLanguage {
    pub code: String,
    pub pages: Vec<Vec<FakeReview>>,
}

impl FakeLanguage {
    pub fn new(code: &str, pages: Vec<Vec<FakeReview>>) -> Self {
        Self {
            code: code.to_string(),
            pages,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeRestaurant {
    pub address: String,
    pub reported: Option<String>,
    pub picker: PickerMode,
    /// 言語選択肢が「全言語」だけのページ（先頭の言語をそのまま表示）
    pub aggregate_only: bool,
    pub languages: Vec<FakeLanguage>,
}

impl FakeRestaurant {
    /// 表示件数 = 全言語の口コミ数
    pub fn new(languages: Vec<FakeLanguage>) -> Self {
        let total: usize = languages
            .iter()
            .flat_map(|l| l.pages.iter())
            .map(Vec::len)
            .sum();
        Self {
            address: "Markt 1, 09376 Oelsnitz/Erzgeb. Deutschland".to_string(),
            reported: Some(format!("{} Bewertungen", total)),
            picker: PickerMode::Radio,
            aggregate_only: false,
            languages,
        }
    }

    pub fn with_picker(mut self, picker: PickerMode) -> Self {
        self.picker = picker;
        self
    }

    pub fn aggregate_only(mut self) -> Self {
        self.aggregate_only = true;
        self
    }

    /// 表示中の言語
    fn shown(&self, selected: Option<usize>) -> Option<&FakeLanguage> {
        selected
            .or_else(|| self.aggregate_only.then_some(0))
            .and_then(|l| self.languages.get(l))
    }

    pub fn reporting(mut self, reported: Option<&str>) -> Self {
        self.reported = reported.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Blank,
    Search,
    Restaurant,
}

#[derive(Debug)]
pub(crate) struct FakeClient {
    pub searches: HashMap<String, FakeSearch>,
    pub restaurants: HashMap<String, FakeRestaurant>,
    /// `open_entry` の呼び出しごとに先頭から返す障害
    pub open_faults: VecDeque<ScraperError>,

    pub calls: usize,
    pub initialized: usize,
    pub closed: usize,
    pub opened: Vec<String>,
    pub snapshots: Vec<String>,

    location: Location,
    query: Option<String>,
    url: Option<String>,
    language: Option<usize>,
    page: usize,
    overlay_for: Option<usize>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            searches: HashMap::new(),
            restaurants: HashMap::new(),
            open_faults: VecDeque::new(),
            calls: 0,
            initialized: 0,
            closed: 0,
            opened: Vec::new(),
            snapshots: Vec::new(),
            location: Location::Blank,
            query: None,
            url: None,
            language: None,
            page: 0,
            overlay_for: None,
        }
    }

    pub fn with_search(mut self, query: &str, search: FakeSearch) -> Self {
        self.searches.insert(query.to_string(), search);
        self
    }

    pub fn with_restaurant(mut self, url: String, restaurant: FakeRestaurant) -> Self {
        self.restaurants.insert(url, restaurant);
        self
    }

    fn current_search(&self) -> Result<&FakeSearch, ScraperError> {
        self.query
            .as_ref()
            .and_then(|q| self.searches.get(q))
            .ok_or_else(|| ScraperError::ElementNotFound("search results".into()))
    }

    fn restaurant(&self) -> Result<&FakeRestaurant, ScraperError> {
        self.url
            .as_ref()
            .and_then(|u| self.restaurants.get(u))
            .ok_or_else(|| ScraperError::ElementNotFound("restaurant page".into()))
    }

    fn current_reviews(&self) -> Result<&[FakeReview], ScraperError> {
        let restaurant = self.restaurant()?;
        let reviews = restaurant
            .shown(self.language)
            .and_then(|l| l.pages.get(self.page))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(reviews)
    }

    fn review(&self, index: usize) -> Result<&FakeReview, ScraperError> {
        self.current_reviews()?
            .get(index)
            .ok_or_else(|| ScraperError::StaleElement(format!("review {}", index)))
    }

    fn review_field(review: &FakeReview, field: Field, mode: FetchMode) -> Option<String> {
        let id = review.id.clone().unwrap_or_default();
        match (field, mode) {
            (Field::ReviewId, _) => review.id.clone(),
            (Field::ReviewUserId, _) => Some(format!("UID_U{}-SRC_{}", id, id)),
            (Field::ReviewDate, _) => Some("16. Oktober 2026".into()),
            (Field::ReviewScore, _) => Some("ui_bubble_rating bubble_40".into()),
            (Field::ReviewTitle, _) => Some(review.title.clone()),
            (Field::ReviewText, _) => Some("Sehr gutes Essen.".into()),
            (Field::ReviewUserName, FetchMode::Fallback) => Some("Inline Gast".into()),
            (Field::ReviewUserReviews, FetchMode::Fallback) => Some("12 Bewertungen".into()),
            _ => None,
        }
    }

    fn overlay_field(field: Field) -> Option<String> {
        match field {
            Field::ReviewUserName => Some("Overlay Gast".into()),
            Field::ReviewUserGender
            | Field::ReviewUserAge
            | Field::ReviewUserCity
            | Field::ReviewUserCountry => Some(PROFILE.into()),
            Field::ReviewUserSignup => Some("Tripadvisor-Mitglied seit 2015".into()),
            Field::ReviewUserReviews => Some("34 Beiträge".into()),
            Field::ReviewUserThumbsup => Some("10 Hilfreich".into()),
            Field::ReviewUserCitiesVisited => Some("5 besuchte Städte".into()),
            _ => None,
        }
    }
}

#[async_trait]
impl PageClient for FakeClient {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        self.calls += 1;
        self.initialized += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.closed += 1;
        self.location = Location::Blank;
        Ok(())
    }

    async fn search(&mut self, query: &str) -> Result<(), ScraperError> {
        self.calls += 1;
        self.location = Location::Search;
        self.query = Some(query.to_string());
        self.page = 0;
        Ok(())
    }

    async fn opt_out_radius_broadening(&mut self) -> Result<bool, ScraperError> {
        self.calls += 1;
        Ok(self.current_search()?.broadening)
    }

    async fn top_result_address(&mut self) -> Result<Option<String>, ScraperError> {
        self.calls += 1;
        Ok(self.current_search()?.top_address.clone())
    }

    async fn list_entries(&mut self) -> Result<Vec<Scope>, ScraperError> {
        self.calls += 1;
        let count = self.current_search()?.pages.get(self.page).map_or(0, Vec::len);
        Ok((0..count).map(Scope::ResultEntry).collect())
    }

    async fn entry_has_reviews(&mut self, entry: &Scope) -> Result<bool, ScraperError> {
        self.calls += 1;
        let Scope::ResultEntry(index) = *entry else {
            return Ok(false);
        };
        Ok(self
            .current_search()?
            .pages
            .get(self.page)
            .and_then(|p| p.get(index))
            .is_some_and(|e| e.has_reviews))
    }

    async fn open_entry(&mut self, url: &str) -> Result<(), ScraperError> {
        self.calls += 1;
        if let Some(fault) = self.open_faults.pop_front() {
            return Err(fault);
        }
        self.opened.push(url.to_string());
        self.location = Location::Restaurant;
        self.url = Some(url.to_string());
        self.language = None;
        self.page = 0;
        Ok(())
    }

    async fn get_field(
        &mut self,
        scope: &Scope,
        field: Field,
        mode: FetchMode,
    ) -> Result<Option<String>, ScraperError> {
        self.calls += 1;
        match *scope {
            Scope::ResultEntry(index) => {
                let entry = self
                    .current_search()?
                    .pages
                    .get(self.page)
                    .and_then(|p| p.get(index))
                    .ok_or_else(|| ScraperError::StaleElement(format!("entry {}", index)))?;
                Ok(match field {
                    Field::EntryName => Some(entry.name.clone()),
                    Field::EntryUrl => entry.url.clone(),
                    _ => None,
                })
            }
            Scope::Document => {
                let restaurant = self.restaurant()?;
                Ok(match field {
                    Field::StreetWithNo | Field::Postcode => Some(restaurant.address.clone()),
                    Field::Cuisine1 | Field::Cuisine2 | Field::Cuisine3 => {
                        Some("Deutsch, Europäisch, Regional".into())
                    }
                    Field::PriceRangeLo | Field::PriceRangeHi => Some("10 € - 25 €".into()),
                    Field::ReviewCount => restaurant.reported.clone(),
                    _ => None,
                })
            }
            Scope::Review(index) => Ok(Self::review_field(self.review(index)?, field, mode)),
            Scope::UserOverlay => match self.overlay_for {
                Some(_) => Ok(Self::overlay_field(field)),
                None => Err(ScraperError::ElementNotFound("overlay".into())),
            },
        }
    }

    async fn list_review_languages(&mut self) -> Result<(PickerMode, usize), ScraperError> {
        self.calls += 1;
        let restaurant = self.restaurant()?;
        let count = match restaurant.languages.len() {
            _ if restaurant.aggregate_only => 1,
            0 => 0,
            n => n + 1,
        };
        Ok((restaurant.picker, count))
    }

    async fn select_language(
        &mut self,
        mode: PickerMode,
        index: usize,
    ) -> Result<Option<String>, ScraperError> {
        self.calls += 1;
        let restaurant = self.restaurant()?;
        if mode != restaurant.picker || index == 0 {
            return Err(ScraperError::ElementNotFound(format!("language {}", index)));
        }
        let code = restaurant.languages.get(index - 1).map(|l| l.code.clone());
        self.language = Some(index - 1);
        self.page = 0;
        Ok(code)
    }

    async fn list_reviews(&mut self) -> Result<Vec<Scope>, ScraperError> {
        self.calls += 1;
        let count = self.current_reviews()?.len();
        Ok((0..count).map(Scope::Review).collect())
    }

    async fn is_machine_translated(&mut self, review: &Scope) -> Result<bool, ScraperError> {
        self.calls += 1;
        let Scope::Review(index) = *review else {
            return Ok(false);
        };
        Ok(self.review(index)?.translated)
    }

    async fn open_user_overlay(&mut self, review: &Scope) -> Result<Option<Scope>, ScraperError> {
        self.calls += 1;
        let Scope::Review(index) = *review else {
            return Ok(None);
        };
        if self.review(index)?.overlay {
            self.overlay_for = Some(index);
            Ok(Some(Scope::UserOverlay))
        } else {
            Err(ScraperError::Timeout("member overlay".into()))
        }
    }

    async fn close_overlays(&mut self) -> Result<(), ScraperError> {
        self.calls += 1;
        self.overlay_for = None;
        Ok(())
    }

    async fn next_page(&mut self, current: u32) -> Result<bool, ScraperError> {
        self.calls += 1;
        let pages = match self.location {
            Location::Search => self.current_search()?.pages.len(),
            Location::Restaurant => {
                let restaurant = self.restaurant()?;
                restaurant.shown(self.language).map_or(0, |l| l.pages.len())
            }
            Location::Blank => 0,
        };
        let next = current as usize;
        if next < pages {
            self.page = next;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn debug_snapshot(&mut self, label: &str) -> Result<(), ScraperError> {
        self.snapshots.push(label.to_string());
        Ok(())
    }
}

/// 待ち時間なし・即時再起動の設定でパイプラインを作る
pub(crate) fn test_pipeline(
    root: &Path,
    client: FakeClient,
) -> Pipeline<FakeClient, CsvCheckpointStore> {
    let config = ScraperConfig::new(root)
        .with_pacing(PacingConfig::none())
        .with_recovery(RecoveryConfig::immediate(3));
    let store = CsvCheckpointStore::new(DataLayout::new(root));
    Pipeline::new(client, store, config)
}

use tracing::{debug, info, warn};

use crate::artifact::write_table;
use crate::checkpoint::{
    CheckpointStore, RestaurantListEntry, TargetField, TargetRecord, PENDING,
};
use crate::error::{FaultKind, ScraperError};
use crate::extract::{fetch_field, parse, FetchMode, Field, Scope};
use crate::traits::PageClient;

use super::record::{RestaurantRecord, ReviewRow};
use super::types::{MergeOutcome, PageFlow, RestaurantOutcome, ScrapeReport, StopReason};
use super::Pipeline;

impl<C, S> Pipeline<C, S>
where
    C: PageClient,
    S: CheckpointStore,
{
    /// 1ターゲットの未完了レストランを順に収集する
    ///
    /// レストランを1件保存するたびに統合可否を評価し直す。
    pub async fn scrape_target(&mut self, target: &TargetRecord) -> Result<ScrapeReport, ScraperError> {
        let mut report = ScrapeReport::default();
        let Some(list) = target.scraping_targets.as_deref() else {
            return Ok(report);
        };
        if target.scraped.is_none() {
            self.store.upsert(&target.ags, TargetField::Scraped, Some(PENDING))?;
        }

        let entries = self.store.read_restaurant_list(list)?;
        let pending: Vec<RestaurantListEntry> =
            entries.iter().filter(|e| !e.is_done()).cloned().collect();
        info!(
            "Scraping {} ({}): {} of {} restaurants pending",
            target.municipality,
            target.ags,
            pending.len(),
            entries.len()
        );

        for (i, entry) in pending.iter().enumerate() {
            if i > 0 {
                self.pause(self.config.pacing.restaurant_delay).await;
            }
            info!("[{}/{}] {} ({})", i + 1, pending.len(), entry.name, entry.id);

            match self.scrape_restaurant(target, entry).await? {
                RestaurantOutcome::Saved { artifact, rows } => {
                    info!("Saved {} reviews for {} to {}", rows, entry.id, artifact);
                    report.saved += 1;
                    if let MergeOutcome::Merged { dataset, .. } = self.merge_target(&target.ags)? {
                        report.merged = Some(dataset);
                    }
                }
                RestaurantOutcome::Rejected(reason) => {
                    warn!("Discarded {} ({}): {}", entry.name, entry.id, reason);
                    report.rejected += 1;
                }
            }
        }

        if pending.is_empty() {
            if let MergeOutcome::Merged { dataset, .. } = self.merge_target(&target.ags)? {
                report.merged = Some(dataset);
            }
        }
        Ok(report)
    }

    /// 1レストランを収集し、検証に通れば成果物を保存する
    pub async fn scrape_restaurant(
        &mut self,
        target: &TargetRecord,
        entry: &RestaurantListEntry,
    ) -> Result<RestaurantOutcome, ScraperError> {
        self.ensure_session().await?;
        self.client.open_entry(&entry.url).await?;

        let mut record = RestaurantRecord::new(target, entry);
        for field in Field::RESTAURANT {
            let value = fetch_field(&mut self.client, &Scope::Document, field, FetchMode::Primary).await?;
            record.facts.push((field, value));
        }
        record.reported_reviews =
            fetch_field(&mut self.client, &Scope::Document, Field::ReviewCount, FetchMode::Primary)
                .await?
                .as_deref()
                .and_then(parse::count);

        let (mode, count) = self.client.list_review_languages().await?;
        // 0番目は「全言語」
        let languages: Vec<Option<usize>> = if count > 1 {
            (1..count).map(Some).collect()
        } else {
            vec![None]
        };
        debug!("{} review languages ({:?} picker)", languages.len(), mode);

        for index in languages {
            let language = match index {
                Some(index) => {
                    let code = self.client.select_language(mode, index).await?;
                    self.pause(self.config.pacing.language_settle).await;
                    code
                }
                // 選択肢が無ければ母国語の一覧がそのまま表示されている
                None => Some(self.config.home_language.clone()),
            };
            let before = record.reviews.len();
            let reason = self.scrape_language(language.as_deref(), &mut record.reviews).await?;
            info!(
                "Language {}: {} reviews ({:?})",
                language.as_deref().unwrap_or("-"),
                record.reviews.len() - before,
                reason
            );
        }

        let duplicates = record.dedup_reviews();
        if duplicates > 0 {
            debug!("Dropped {} duplicate reviews for {}", duplicates, entry.id);
        }
        let table = match record.validate(self.config.max_missing_ratio) {
            Ok(table) => table,
            Err(reason) => return Ok(RestaurantOutcome::Rejected(reason)),
        };

        let artifact = self
            .layout
            .restaurant_artifact(&target.municipality, &target.ags, &entry.id);
        write_table(&self.layout.resolve(&artifact), &table)?;
        let list = target
            .scraping_targets
            .as_deref()
            .ok_or_else(|| ScraperError::UnknownTarget(target.ags.clone()))?;
        self.store.mark_restaurant(list, &entry.id, &artifact)?;
        Ok(RestaurantOutcome::Saved {
            artifact,
            rows: table.len(),
        })
    }

    /// 選択中の言語の口コミをページ送りしながら集める
    async fn scrape_language(
        &mut self,
        language: Option<&str>,
        rows: &mut Vec<ReviewRow>,
    ) -> Result<StopReason, ScraperError> {
        let mut page: u32 = 1;
        loop {
            if let PageFlow::Stop(reason) = self.scrape_review_page(language, rows).await? {
                return Ok(reason);
            }
            if page >= self.config.max_review_pages {
                return Ok(StopReason::PageCap);
            }
            if !self.client.next_page(page).await? {
                return Ok(StopReason::LastPage);
            }
            page += 1;
            self.pause(self.config.pacing.page_turn).await;
        }
    }

    /// 現在ページの口コミを集める
    ///
    /// 母国語ページでは原文の後に翻訳済み口コミが続くため、
    /// 翻訳済みに当たった時点でその言語のページ送りを終える。
    async fn scrape_review_page(
        &mut self,
        language: Option<&str>,
        rows: &mut Vec<ReviewRow>,
    ) -> Result<PageFlow, ScraperError> {
        let home = language == Some(self.config.home_language.as_str());
        for review in self.client.list_reviews().await? {
            if home && self.client.is_machine_translated(&review).await? {
                return Ok(PageFlow::Stop(StopReason::TranslatedReview));
            }
            self.client.close_overlays().await?;
            let row = self.scrape_review(&review, language).await?;
            rows.push(row);
        }
        Ok(PageFlow::Continue)
    }

    async fn scrape_review(
        &mut self,
        review: &Scope,
        language: Option<&str>,
    ) -> Result<ReviewRow, ScraperError> {
        let mut values = Vec::with_capacity(Field::REVIEW.len() + Field::USER_PROFILE.len());
        for field in Field::REVIEW {
            values.push((field, fetch_field(&mut self.client, review, field, FetchMode::Primary).await?));
        }

        let overlay = match self.client.open_user_overlay(review).await {
            Ok(overlay) => overlay,
            Err(e) if matches!(e.fault_kind(), Some(FaultKind::SessionLost | FaultKind::Transport)) => {
                return Err(e)
            }
            Err(e) => {
                debug!("Member overlay unavailable: {}", e);
                None
            }
        };

        let (scope, mode) = match overlay {
            Some(scope) => {
                self.pause(self.config.pacing.overlay_settle).await;
                (scope, FetchMode::Primary)
            }
            None => (*review, FetchMode::Fallback),
        };
        for field in Field::USER_PROFILE {
            values.push((field, fetch_field(&mut self.client, &scope, field, mode).await?));
        }
        if mode == FetchMode::Primary {
            self.client.close_overlays().await?;
        }

        Ok(ReviewRow {
            values,
            mode,
            language: language.map(str::to_string),
        })
    }
}

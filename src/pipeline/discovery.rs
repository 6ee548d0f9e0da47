use std::collections::HashSet;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, RestaurantListEntry, TargetField, TargetRecord};
use crate::error::ScraperError;
use crate::extract::{fetch_field, parse, FetchMode, Field};
use crate::naming::restaurant_id_from_url;
use crate::traits::PageClient;

use super::types::DiscoveryOutcome;
use super::Pipeline;

/// 検索結果から拾った候補
#[derive(Debug, Clone)]
struct Candidate {
    name: Option<String>,
    url: Option<String>,
}

impl Candidate {
    fn missing(&self) -> usize {
        usize::from(self.name.is_none()) + usize::from(self.url.is_none())
    }
}

impl<C, S> Pipeline<C, S>
where
    C: PageClient,
    S: CheckpointStore,
{
    /// 1ターゲットの店舗リストを作成して保存する
    pub async fn discover(&mut self, target: &TargetRecord) -> Result<DiscoveryOutcome, ScraperError> {
        let Some(query) = target.querystring.as_deref() else {
            return Ok(DiscoveryOutcome::NoQuery);
        };
        info!(
            "Discovering restaurants for {} ({}) with query {:?}",
            target.municipality, target.ags, query
        );
        self.ensure_session().await?;

        self.client.search(query).await?;
        if self.client.opt_out_radius_broadening().await? {
            debug!("Opted out of radius broadening");
            self.pause(self.config.pacing.broaden_settle).await;
        }

        let found = self
            .client
            .top_result_address()
            .await?
            .as_deref()
            .and_then(parse::postcode);
        if !found.as_deref().is_some_and(|p| target.accepts_postcode(p)) {
            warn!(
                "Top result postcode {:?} not in {:?} for {} ({}), query needs manual fix",
                found, target.postcodes, target.municipality, target.ags
            );
            self.store.upsert(&target.ags, TargetField::QueryString, None)?;
            return Ok(DiscoveryOutcome::QueryInvalidated { found });
        }

        let candidates = self.collect_candidates().await?;
        let candidates = dedup_by_restaurant(candidates);

        let rows = candidates.len();
        let missing: usize = candidates.iter().map(Candidate::missing).sum();
        let entries = to_list_entries(&candidates);
        if rows == 0 || missing > rows || entries.is_empty() {
            warn!(
                "Restaurant list for {} ({}) failed validation: {} rows, {} missing fields",
                target.municipality, target.ags, rows, missing
            );
            self.client.debug_snapshot("discovery-validation").await?;
            return Ok(DiscoveryOutcome::ValidationFailed { rows, missing });
        }

        let list = self.layout.restaurant_list(&target.municipality, &target.ags);
        self.store.write_restaurant_list(&list, &entries)?;
        self.store
            .upsert(&target.ags, TargetField::ScrapingTargets, Some(&list))?;
        info!(
            "Saved {} restaurants for {} ({}) to {}",
            entries.len(),
            target.municipality,
            target.ags,
            list
        );
        Ok(DiscoveryOutcome::Persisted {
            list,
            entries: entries.len(),
        })
    }

    /// 検索結果ページを順に送り、口コミのある店舗を集める
    async fn collect_candidates(&mut self) -> Result<Vec<Candidate>, ScraperError> {
        let mut candidates = Vec::new();
        let mut page: u32 = 1;
        loop {
            let entries = self.client.list_entries().await?;
            debug!("Result page {}: {} entries", page, entries.len());

            let mut reviewless = 0;
            let mut exhausted = false;
            for entry in &entries {
                if !self.client.entry_has_reviews(entry).await? {
                    reviewless += 1;
                    if reviewless >= self.config.reviewless_entry_limit {
                        debug!("{} reviewless entries on page {}, stopping", reviewless, page);
                        exhausted = true;
                        break;
                    }
                    continue;
                }
                let name = fetch_field(&mut self.client, entry, Field::EntryName, FetchMode::Primary).await?;
                let url = fetch_field(&mut self.client, entry, Field::EntryUrl, FetchMode::Primary).await?;
                candidates.push(Candidate { name, url });
            }

            if exhausted || page >= self.config.max_result_pages {
                break;
            }
            if !self.client.next_page(page).await? {
                break;
            }
            page += 1;
            self.pause(self.config.pacing.page_turn).await;
        }
        Ok(candidates)
    }
}

/// 同じレストランの重複を除去（先に出たものを残す）
///
/// 広告枠などでスラッグ違いのURLが出るため、識別子が導出できれば識別子で、
/// できなければURLで比較する。
fn dedup_by_restaurant(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| match &c.url {
            Some(url) => seen.insert(restaurant_id_from_url(url).unwrap_or_else(|| url.clone())),
            None => true,
        })
        .collect()
}

/// 識別子を導出できた候補だけをリスト行にする
fn to_list_entries(candidates: &[Candidate]) -> Vec<RestaurantListEntry> {
    let timestamp = Local::now().format("%Y-%m-%d, %H:%M:%S").to_string();
    candidates
        .iter()
        .filter_map(|c| {
            let url = c.url.as_ref()?;
            let Some(id) = restaurant_id_from_url(url) else {
                debug!("Skipping entry without restaurant id: {}", url);
                return None;
            };
            Some(RestaurantListEntry {
                id,
                name: c.name.clone().unwrap_or_default(),
                url: url.clone(),
                timestamp: timestamp.clone(),
                scraped: None,
            })
        })
        .collect()
}

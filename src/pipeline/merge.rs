use std::fs;
use std::io::ErrorKind;

use tracing::{info, warn};

use crate::artifact::{read_table, write_merged, MergedDataset};
use crate::checkpoint::{CheckpointStore, ListProgress, TargetField};
use crate::error::ScraperError;
use crate::traits::PageClient;

use super::types::MergeOutcome;
use super::Pipeline;

impl<C, S> Pipeline<C, S>
where
    C: PageClient,
    S: CheckpointStore,
{
    /// 全レストランが完了していれば統合データセットを作る
    ///
    /// 判定は毎回ストアから読み直した最新の店舗リストで行う。
    pub fn merge_target(&mut self, ags: &str) -> Result<MergeOutcome, ScraperError> {
        let target = self.store.target(ags)?;
        if target.is_merged() {
            return Ok(MergeOutcome::Skipped);
        }
        let Some(list) = target.scraping_targets.as_deref() else {
            return Ok(MergeOutcome::Skipped);
        };

        let entries = self.store.read_restaurant_list(list)?;
        let progress = ListProgress::of(&entries);
        if !progress.is_complete() {
            info!(
                "{} ({}) incomplete: {} of {} restaurants pending, merge deferred",
                target.municipality,
                target.ags,
                progress.pending(),
                progress.total
            );
            return Ok(MergeOutcome::Deferred {
                pending: progress.pending(),
                total: progress.total,
            });
        }

        let artifacts: Vec<&str> = entries.iter().filter_map(|e| e.scraped.as_deref()).collect();
        let mut tables = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            tables.push(read_table(&self.layout.resolve(artifact))?);
        }
        let merged = MergedDataset::merge(&target.ags, &target.municipality, &tables);
        let rows = merged.rows.len();

        let dataset = self.layout.merged_dataset(&target.municipality, &target.ags);
        write_merged(&self.layout.resolve(&dataset), &merged)?;
        self.store
            .upsert(&target.ags, TargetField::Scraped, Some(&dataset))?;
        info!(
            "Merged {} restaurants ({} reviews) for {} ({}) into {}",
            tables.len(),
            rows,
            target.municipality,
            target.ags,
            dataset
        );

        for artifact in artifacts {
            match fs::remove_file(self.layout.resolve(artifact)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", artifact, e),
            }
        }
        Ok(MergeOutcome::Merged { dataset, rows })
    }
}

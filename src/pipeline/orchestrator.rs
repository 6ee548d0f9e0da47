use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointStore, TargetRecord, TargetStatus};
use crate::error::{FaultKind, ScraperError};
use crate::input::read_targets;
use crate::traits::PageClient;

use super::types::{DiscoveryOutcome, MergeOutcome, RunSummary, StatusReport};
use super::Pipeline;

/// 1回の実行内で試行済みのターゲット（再起動をまたいで保持）
#[derive(Debug, Default)]
struct RunState {
    discovered: HashSet<String>,
    scraped: HashSet<String>,
    merged: HashSet<String>,
    discovery_halted: bool,
}

impl RunState {
    /// 今回の実行でまだ手を付けられるか
    fn is_actionable(&self, ags: &str, status: TargetStatus) -> bool {
        match status {
            TargetStatus::NeedsDiscovery | TargetStatus::DiscoveryInProgress => {
                !self.discovery_halted && !self.discovered.contains(ags)
            }
            TargetStatus::NeedsScrape | TargetStatus::ScrapeInProgress => !self.scraped.contains(ags),
            TargetStatus::NeedsMerge => !self.merged.contains(ags),
            TargetStatus::NoQuery | TargetStatus::Done => false,
        }
    }
}

impl<C, S> Pipeline<C, S>
where
    C: PageClient,
    S: CheckpointStore,
{
    /// 処理できる作業が無くなるまで実行する
    ///
    /// 一時障害は種類ごとに `max_restarts` 回までクールダウンを挟んで再開する。
    /// 上限を超えた場合は `RestartBudgetExhausted` を返す。
    pub async fn run(&mut self) -> Result<RunSummary, ScraperError> {
        let mut summary = RunSummary::default();
        let mut state = RunState::default();

        loop {
            let result = self.drive(&mut state, &mut summary).await;
            let err = match result {
                Ok(()) => {
                    self.drop_session().await;
                    info!(
                        "All processable work drained: {} discovered, {} restaurants saved, {} merged",
                        summary.discovered, summary.restaurants_saved, summary.merged
                    );
                    return Ok(summary);
                }
                Err(e) => e,
            };

            let Some(kind) = err.fault_kind() else {
                error!("Fatal error: {}", err);
                self.drop_session().await;
                return Err(err);
            };

            let used = summary.restarts_for(kind);
            if used >= self.config.recovery.max_restarts {
                error!("Restart budget for {} faults exhausted: {}", kind, err);
                self.drop_session().await;
                return Err(ScraperError::RestartBudgetExhausted {
                    kind,
                    restarts: used,
                    last: err.to_string(),
                });
            }
            let attempt = summary.record_restart(kind);
            let cooldown = self.config.recovery.cooldown(kind);
            warn!(
                "{} fault ({}), restart {}/{} after {:?}",
                kind, err, attempt, self.config.recovery.max_restarts, cooldown
            );
            if kind == FaultKind::SessionLost {
                self.drop_session().await;
            }
            self.pause(cooldown).await;
        }
    }

    /// 状態を読み直しながら、ステージ単位で全ターゲットを処理する
    ///
    /// 探索待ちが1件でもあれば、収集より先に全ターゲットの探索を行う。
    async fn drive(&mut self, state: &mut RunState, summary: &mut RunSummary) -> Result<(), ScraperError> {
        loop {
            self.sync_input()?;
            let plan = self.plan()?;
            let report = StatusReport::of(&plan);
            info!("Status: {}", report);

            let actionable: Vec<(TargetRecord, TargetStatus)> = plan
                .into_iter()
                .filter(|(t, s)| state.is_actionable(&t.ags, *s))
                .collect();
            if actionable.is_empty() {
                return Ok(());
            }

            let discovery: Vec<&TargetRecord> = actionable
                .iter()
                .filter(|(_, s)| *s == TargetStatus::NeedsDiscovery)
                .map(|(t, _)| t)
                .collect();
            if !discovery.is_empty() {
                for target in discovery {
                    let outcome = self.discover(target).await?;
                    state.discovered.insert(target.ags.clone());
                    match outcome {
                        DiscoveryOutcome::Persisted { .. } => summary.discovered += 1,
                        DiscoveryOutcome::QueryInvalidated { .. } => summary.invalidated += 1,
                        DiscoveryOutcome::ValidationFailed { .. } => {
                            error!("Discovery halted for this run after validation failure");
                            state.discovery_halted = true;
                            summary.discovery_halted = true;
                            break;
                        }
                        DiscoveryOutcome::NoQuery => {}
                    }
                }
                continue;
            }

            for (target, status) in &actionable {
                match status {
                    TargetStatus::NeedsScrape | TargetStatus::ScrapeInProgress => {
                        let report = self.scrape_target(target).await?;
                        state.scraped.insert(target.ags.clone());
                        summary.restaurants_saved += report.saved;
                        summary.restaurants_rejected += report.rejected;
                        if report.merged.is_some() {
                            summary.merged += 1;
                        }
                    }
                    TargetStatus::NeedsMerge => {
                        let outcome = self.merge_target(&target.ags)?;
                        state.merged.insert(target.ags.clone());
                        if matches!(outcome, MergeOutcome::Merged { .. }) {
                            summary.merged += 1;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// 参照テーブルの新規ターゲットをチェックポイントへ追加
    pub fn sync_input(&mut self) -> Result<usize, ScraperError> {
        let path = self.config.input_path.clone();
        if !path.exists() {
            debug!("No input table at {}", path.display());
            return Ok(0);
        }
        let mut added = 0;
        for target in read_targets(&path)? {
            if self.store.insert_target(target)? {
                added += 1;
            }
        }
        if added > 0 {
            info!("Added {} new targets from {}", added, path.display());
        }
        Ok(added)
    }

    /// 全ターゲットの現在の状態
    fn plan(&self) -> Result<Vec<(TargetRecord, TargetStatus)>, ScraperError> {
        let mut plan = Vec::new();
        for target in self.store.load()? {
            let progress = match (&target.scraping_targets, target.is_merged()) {
                (Some(list), false) => Some(self.store.list_progress(list)?),
                _ => None,
            };
            let status = TargetStatus::derive(&target, progress);
            plan.push((target, status));
        }
        Ok(plan)
    }

    /// 状態ごとのターゲット数
    pub fn status_report(&self) -> Result<StatusReport, ScraperError> {
        Ok(StatusReport::of(&self.plan()?))
    }
}

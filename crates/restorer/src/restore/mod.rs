/// 恢复流程
///
/// 两轮处理：先为所有目标发出创建请求，再逐个等待并完成配置。
/// 单个目标的失败只记录日志，不影响其他目标。

pub mod finalizer;
pub mod pending;
pub mod resolver;
pub mod wait;

#[cfg(test)]
pub(crate) mod fake;

use chrono::{DateTime, Utc};
use common::{Error, Result};
use tracing::{error, info, warn};

use crate::config::{MatchMode, RestoreTarget};
use crate::longhorn::LonghornApi;
use finalizer::RestorationFinalizer;
use pending::PendingRestorations;
use resolver::{Resolution, VolumeResolver};
use wait::WaitPolicy;

/// 单个目标的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// 卷已存在，未做任何操作
    Existing { volume: String },
    /// 已创建卷但尚未完成配置
    Created { volume: String },
    /// 恢复完成
    Restored { volume: String },
    /// 没有可用备份
    Skipped { reason: String },
    /// 失败
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Finalize,
}

/// 一次运行的汇总
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    outcomes: Vec<(String, TargetOutcome)>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, key: &str, outcome: TargetOutcome) {
        match self.outcomes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = outcome,
            None => self.outcomes.push((key.to_string(), outcome)),
        }
    }

    pub fn outcome(&self, key: &str) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }

    pub fn outcomes(&self) -> &[(String, TargetOutcome)] {
        &self.outcomes
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TargetOutcome::Failed { .. }))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    pub fn log_summary(&self) {
        let count = |f: fn(&TargetOutcome) -> bool| self.outcomes().iter().filter(|(_, o)| f(o)).count();
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default();

        info!(
            "Restore finished in {}s: {} restored, {} existing, {} skipped, {} failed",
            elapsed,
            count(|o| matches!(o, TargetOutcome::Restored { .. })),
            count(|o| matches!(o, TargetOutcome::Existing { .. })),
            count(|o| matches!(o, TargetOutcome::Skipped { .. })),
            self.failures(),
        );
        for (key, outcome) in &self.outcomes {
            if let TargetOutcome::Failed { stage, reason } = outcome {
                error!("{} failed during {:?}: {}", key, stage, reason);
            }
        }
    }
}

/// 一次恢复运行，持有本次运行的待完成记录
pub struct RestoreRun<'a> {
    api: &'a dyn LonghornApi,
    mode: MatchMode,
    policy: WaitPolicy,
    pending: PendingRestorations,
    report: RunReport,
}

impl<'a> RestoreRun<'a> {
    pub fn new(api: &'a dyn LonghornApi, mode: MatchMode, policy: WaitPolicy) -> Self {
        Self {
            api,
            mode,
            policy,
            pending: PendingRestorations::new(),
            report: RunReport::new(),
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> &PendingRestorations {
        &self.pending
    }

    #[cfg(test)]
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// 执行两轮处理并返回汇总，只有取消会返回错误
    pub async fn run(mut self, targets: &[RestoreTarget]) -> Result<RunReport> {
        info!(
            "Restoring {} target(s), matching by {}",
            targets.len(),
            self.mode
        );
        self.resolve_all(targets).await?;
        self.finalize_all(targets).await?;
        self.report.finished_at = Some(Utc::now());
        Ok(self.report)
    }

    /// 第一轮：为每个不存在的目标发出创建请求
    pub async fn resolve_all(&mut self, targets: &[RestoreTarget]) -> Result<()> {
        let resolver = VolumeResolver::new(self.api, self.mode);

        for target in targets {
            self.check_cancelled()?;

            let outcome = match resolver.resolve(target, &mut self.pending).await {
                Ok(Resolution::Exists { volume }) => TargetOutcome::Existing { volume },
                Ok(Resolution::Created { volume, size }) => {
                    info!("Restore of {} started as volume {} ({} bytes)", target.key, volume, size);
                    TargetOutcome::Created { volume }
                }
                Err(e) if e.is_skip() => {
                    warn!("Skipping {}: {}", target.key, e);
                    TargetOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Err(e @ Error::Cancelled(_)) => return Err(e),
                Err(e) => {
                    error!("Failed to restore {}: {}", target.key, e);
                    TargetOutcome::Failed {
                        stage: Stage::Resolve,
                        reason: e.to_string(),
                    }
                }
            };
            self.report.record(&target.key, outcome);
        }
        Ok(())
    }

    /// 第二轮：完成本轮创建的卷
    pub async fn finalize_all(&mut self, targets: &[RestoreTarget]) -> Result<()> {
        if self.pending.is_empty() {
            info!("No restored volumes to finalize");
            return Ok(());
        }
        info!("Finalizing {} restored volume(s)", self.pending.len());
        let finalizer = RestorationFinalizer::new(self.api, &self.policy);

        for target in targets {
            if !self.pending.contains(&target.key) {
                continue;
            }
            if self.policy.cancel.is_cancelled() {
                return Err(Error::Cancelled("restore run".to_string()));
            }

            let outcome = match finalizer.finalize(target, &mut self.pending).await {
                Ok(_) => {
                    let volume = self
                        .report
                        .outcome(&target.key)
                        .and_then(|o| match o {
                            TargetOutcome::Created { volume } => Some(volume.clone()),
                            _ => None,
                        })
                        .unwrap_or_else(|| target.key.clone());
                    TargetOutcome::Restored { volume }
                }
                Err(e @ Error::Cancelled(_)) => return Err(e),
                Err(e) => {
                    error!("Failed to finalize {}: {}", target.key, e);
                    TargetOutcome::Failed {
                        stage: Stage::Finalize,
                        reason: e.to_string(),
                    }
                }
            };
            self.report.record(&target.key, outcome);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.policy.cancel.is_cancelled() {
            return Err(Error::Cancelled("restore run".to_string()));
        }
        Ok(())
    }
}

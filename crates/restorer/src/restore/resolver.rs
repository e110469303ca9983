/// 卷解析
///
/// 判断目标卷是否已经存在，不存在时找到最新备份并从备份创建卷

use common::models::CreateVolumeRequest;
use common::utils::format_bytes;
use chrono::DateTime;
use common::{Backup, BackupVolume, Error, KubernetesStatus, Result, Volume};
use tracing::{debug, info, warn};

use super::pending::{PendingRestoration, PendingRestorations};
use crate::config::{MatchMode, RestoreTarget};
use crate::longhorn::LonghornApi;

/// 单个目标的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// 卷已存在，跳过
    Exists { volume: String },
    /// 已发出创建请求
    Created { volume: String, size: u64 },
}

pub struct VolumeResolver<'a> {
    api: &'a dyn LonghornApi,
    mode: MatchMode,
}

impl<'a> VolumeResolver<'a> {
    pub fn new(api: &'a dyn LonghornApi, mode: MatchMode) -> Self {
        Self { api, mode }
    }

    /// 解析一个目标，创建成功时登记到 `pending`
    ///
    /// 失败时 `pending` 保持不变。
    pub async fn resolve(
        &self,
        target: &RestoreTarget,
        pending: &mut PendingRestorations,
    ) -> Result<Resolution> {
        if let Some(volume) = self.find_existing(target).await? {
            info!("Volume {} exists for {}, skipping", volume.name, target.key);
            return Ok(Resolution::Exists {
                volume: volume.name,
            });
        }

        info!("Volume for {} not found, restoring", target.key);
        let backup_volume = self.find_backup_volume(target).await?;

        // 标签匹配时卷名来自备份卷，这里再确认一次
        if self.mode == MatchMode::PvcName {
            if let Some(volume) = self.api.get_volume(&backup_volume.name).await? {
                info!("Volume {} already restored for {}, skipping", volume.name, target.key);
                return Ok(Resolution::Exists {
                    volume: volume.name,
                });
            }
        }

        if backup_volume.last_backup_name.is_empty() {
            return Err(Error::NoBackupAvailable(target.key.clone()));
        }

        let backup = self
            .api
            .get_backup(&backup_volume.name, &backup_volume.last_backup_name)
            .await?;
        if backup.url.is_empty() {
            return Err(Error::NoBackupAvailable(format!(
                "{} (backup {} has no URL)",
                target.key, backup.name
            )));
        }

        let source_status = match backup.kubernetes_status()? {
            Some(status) => status,
            None => {
                warn!(
                    "Backup {} has no KubernetesStatus label, PV/PVC names must be configured for {}",
                    backup.name, target.key
                );
                KubernetesStatus::default()
            }
        };

        let size = resolve_size(target, &backup_volume, &backup);
        let request = CreateVolumeRequest {
            name: backup_volume.name.clone(),
            size: size.to_string(),
            from_backup: backup.url.clone(),
        };

        info!(
            "Creating volume {} ({}) from backup {}",
            request.name,
            format_bytes(size),
            backup.name
        );
        debug!("Backup URL for {}: {}", request.name, request.from_backup);
        let created = self.api.create_volume(&request).await?;

        pending.insert(
            target.key.clone(),
            PendingRestoration {
                volume_name: created.name.clone(),
                backup_name: backup.name,
                source_status,
            },
        );

        Ok(Resolution::Created {
            volume: created.name,
            size,
        })
    }

    async fn find_existing(&self, target: &RestoreTarget) -> Result<Option<Volume>> {
        match self.mode {
            MatchMode::VolumeHandle => self.api.get_volume(&target.key).await,
            MatchMode::PvcName => {
                let volumes = self.api.list_volumes().await?;
                Ok(volumes
                    .into_iter()
                    .find(|v| status_matches_pvc(&v.kubernetes_status, target)))
            }
        }
    }

    async fn find_backup_volume(&self, target: &RestoreTarget) -> Result<BackupVolume> {
        match self.mode {
            MatchMode::VolumeHandle => self
                .api
                .get_backup_volume(&target.key)
                .await?
                .ok_or_else(|| Error::NotFound(format!("backup volume {}", target.key))),
            MatchMode::PvcName => {
                let mut matched = Vec::new();
                for backup_volume in self.api.list_backup_volumes().await? {
                    let status = match backup_volume.kubernetes_status() {
                        Ok(Some(status)) => status,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("Ignoring backup volume {}: {}", backup_volume.name, e);
                            continue;
                        }
                    };
                    if status_matches_pvc(&status, target) {
                        debug!(
                            "Backup volume {} matches PVC {}",
                            backup_volume.name, target.key
                        );
                        matched.push(backup_volume);
                    }
                }

                if matched.is_empty() {
                    return Err(Error::NotFound(format!(
                        "no backup volume labelled with PVC {}",
                        target.key
                    )));
                }
                latest_backup_volume(matched)
                    .ok_or_else(|| Error::NoBackupAvailable(target.key.clone()))
            }
        }
    }
}

/// 同一个 PVC 被删除重建后会留下多个备份卷，取最近一次备份的那个
///
/// 没有任何备份的备份卷不参与选择。
fn latest_backup_volume(candidates: Vec<BackupVolume>) -> Option<BackupVolume> {
    candidates
        .into_iter()
        .filter(|bv| !bv.last_backup_name.is_empty())
        .max_by_key(|bv| DateTime::parse_from_rfc3339(&bv.last_backup_at).ok())
}

/// 显式配置的大小优先，其次是备份卷记录的大小，备份卷没有记录时用备份本身的大小
pub fn resolve_size(target: &RestoreTarget, backup_volume: &BackupVolume, backup: &Backup) -> u64 {
    match (target.size, backup_volume.size) {
        (Some(size), _) => size,
        (None, 0) => backup.volume_size,
        (None, size) => size,
    }
}

fn status_matches_pvc(status: &KubernetesStatus, target: &RestoreTarget) -> bool {
    if status.pvc_name != target.key {
        return false;
    }
    match target.pvc_namespace.as_deref() {
        Some(namespace) => status.namespace == namespace,
        None => true,
    }
}

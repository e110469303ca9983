/// 恢复收尾
///
/// 等待新卷就绪后加入定时任务组，并重建 PV、PVC 绑定

use common::models::constants::{DEFAULT_FS_TYPE, PV_STATUS_AVAILABLE, PV_STATUS_BOUND};
use common::models::KubeStatusField;
use common::{Error, KubernetesStatus, Result, VolumeState};
use tracing::{debug, info};

use super::pending::PendingRestorations;
use super::wait::{
    wait_for_kubernetes_status, wait_for_volume_state, StatusExpectation, WaitPolicy,
};
use crate::config::RestoreTarget;
use crate::longhorn::LonghornApi;

/// 最终使用的 PV/PVC 名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNames {
    pub pv_name: String,
    pub pvc_name: String,
    pub pvc_namespace: String,
}

impl ResolvedNames {
    /// 配置中显式给出的值优先，否则使用备份记录的值
    pub fn resolve(target: &RestoreTarget, source: &KubernetesStatus) -> Self {
        let pick = |explicit: &Option<String>, recorded: &str| {
            explicit.clone().unwrap_or_else(|| recorded.to_string())
        };
        Self {
            pv_name: pick(&target.pv_name, &source.pv_name),
            pvc_name: pick(&target.pvc_name, &source.pvc_name),
            pvc_namespace: pick(&target.pvc_namespace, &source.namespace),
        }
    }
}

pub struct RestorationFinalizer<'a> {
    api: &'a dyn LonghornApi,
    policy: &'a WaitPolicy,
}

impl<'a> RestorationFinalizer<'a> {
    pub fn new(api: &'a dyn LonghornApi, policy: &'a WaitPolicy) -> Self {
        Self { api, policy }
    }

    /// 完成一个目标的恢复，成功后从 `pending` 中移除
    pub async fn finalize(
        &self,
        target: &RestoreTarget,
        pending: &mut PendingRestorations,
    ) -> Result<ResolvedNames> {
        let record = pending
            .get(&target.key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pending restoration for {}", target.key)))?;
        let volume = record.volume_name.as_str();
        let names = ResolvedNames::resolve(target, &record.source_status);

        if target.create_pv && names.pv_name.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "{}: no pvName configured or recorded in backup {}",
                target.key, record.backup_name
            )));
        }
        if target.create_pvc && (names.pvc_name.is_empty() || names.pvc_namespace.is_empty()) {
            return Err(Error::InvalidTarget(format!(
                "{}: no pvcName/pvcNamespace configured or recorded in backup {}",
                target.key, record.backup_name
            )));
        }

        // 一直没有进入 detached 的卷按不存在处理
        wait_for_volume_state(self.api, self.policy, volume, VolumeState::Detached)
            .await
            .map_err(|e| match e {
                Error::Timeout { condition, attempts } => Error::NotFound(format!(
                    "{} (not reached after {} attempts)",
                    condition, attempts
                )),
                other => other,
            })?;
        info!("Restored volume {}", volume);

        for group in &target.groups {
            self.api.add_recurring_job_group(volume, group).await?;
            info!("Added volume {} to recurring job group {}", volume, group);
        }

        if target.create_pv {
            self.create_pv(volume, &names.pv_name).await?;
            info!("Restored PersistentVolume {}", names.pv_name);
        }

        if target.create_pvc {
            self.create_pvc(volume, &names.pvc_namespace, &names.pvc_name).await?;
            info!(
                "Restored PersistentVolumeClaim {}/{}",
                names.pvc_namespace, names.pvc_name
            );
        }

        pending.remove(&target.key);
        Ok(names)
    }

    async fn create_pv(&self, volume: &str, pv_name: &str) -> Result<()> {
        debug!("Creating PV {} for volume {}", pv_name, volume);
        self.api.create_pv(volume, pv_name, DEFAULT_FS_TYPE).await?;

        let expectations = [
            StatusExpectation::new(KubeStatusField::PvName, pv_name),
            StatusExpectation::new(KubeStatusField::PvStatus, PV_STATUS_AVAILABLE),
            StatusExpectation::empty(KubeStatusField::LastPvcRefAt),
            StatusExpectation::empty(KubeStatusField::LastPodRefAt),
        ];
        wait_for_kubernetes_status(self.api, self.policy, volume, &expectations).await?;
        Ok(())
    }

    async fn create_pvc(&self, volume: &str, namespace: &str, pvc_name: &str) -> Result<()> {
        debug!("Creating PVC {}/{} for volume {}", namespace, pvc_name, volume);
        self.api.create_pvc(volume, namespace, pvc_name).await?;

        let expectations = [
            StatusExpectation::new(KubeStatusField::PvStatus, PV_STATUS_BOUND),
            StatusExpectation::new(KubeStatusField::Namespace, namespace),
            StatusExpectation::present(KubeStatusField::LastPvcRefAt),
        ];
        wait_for_kubernetes_status(self.api, self.policy, volume, &expectations).await?;
        Ok(())
    }
}

/// 测试用的内存版 Longhorn
///
/// 创建卷、PV、PVC 时按 Longhorn 的行为更新 `kubernetesStatus`

use async_trait::async_trait;
use common::models::{CreateVolumeRequest, LABEL_KUBERNETES_STATUS};
use common::{Backup, BackupVolume, Error, KubernetesStatus, Result, Volume, VolumeState};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::longhorn::LonghornApi;

pub const PVC_REF_TIMESTAMP: &str = "2024-05-01T10:00:00Z";

/// 记录下来的写操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateVolume(CreateVolumeRequest),
    RecurringJobAdd { volume: String, group: String },
    PvCreate { volume: String, pv_name: String, fs_type: String },
    PvcCreate { volume: String, namespace: String, pvc_name: String },
}

#[derive(Default)]
struct State {
    volumes: HashMap<String, Volume>,
    backup_volumes: Vec<BackupVolume>,
    backups: HashMap<(String, String), Backup>,
    calls: Vec<Call>,
    get_volume_calls: HashMap<String, u32>,
    detach_after: HashMap<String, u32>,
    frozen: HashSet<String>,
    fail_create: HashSet<String>,
    unreachable: bool,
}

#[derive(Default)]
pub struct FakeLonghorn {
    state: Mutex<State>,
}

impl FakeLonghorn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_volume(&self, name: &str, state: VolumeState) {
        let volume = Volume {
            name: name.to_string(),
            state,
            size: 0,
            kubernetes_status: KubernetesStatus::default(),
        };
        self.state.lock().unwrap().volumes.insert(name.to_string(), volume);
    }

    pub fn add_volume_with_status(&self, name: &str, status: KubernetesStatus) {
        self.add_volume(name, VolumeState::Attached);
        let mut state = self.state.lock().unwrap();
        if let Some(volume) = state.volumes.get_mut(name) {
            volume.kubernetes_status = status;
        }
    }

    /// 添加备份卷及其最新备份，`status` 同时写入两者的标签
    pub fn add_backup(&self, volume: &str, backup_name: &str, size: u64, status: Option<&KubernetesStatus>) {
        let labels: HashMap<String, String> = status
            .map(|ks| {
                let blob = serde_json::to_string(ks).unwrap();
                HashMap::from([(LABEL_KUBERNETES_STATUS.to_string(), blob)])
            })
            .unwrap_or_default();
        self.add_backup_with_labels(volume, backup_name, size, labels);
    }

    pub fn add_backup_with_labels(
        &self,
        volume: &str,
        backup_name: &str,
        size: u64,
        labels: HashMap<String, String>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.backup_volumes.push(BackupVolume {
            name: volume.to_string(),
            size,
            last_backup_name: backup_name.to_string(),
            last_backup_at: String::new(),
            labels: labels.clone(),
        });
        if !backup_name.is_empty() {
            state.backups.insert(
                (volume.to_string(), backup_name.to_string()),
                Backup {
                    name: backup_name.to_string(),
                    url: backup_url(volume, backup_name),
                    volume_size: size,
                    labels,
                },
            );
        }
    }

    pub fn set_last_backup_at(&self, volume: &str, at: &str) {
        let mut state = self.state.lock().unwrap();
        for bv in state.backup_volumes.iter_mut().filter(|bv| bv.name == volume) {
            bv.last_backup_at = at.to_string();
        }
    }

    /// 只改备份卷记录的大小，备份本身的 `volumeSize` 不变
    pub fn set_backup_volume_size(&self, volume: &str, size: u64) {
        let mut state = self.state.lock().unwrap();
        for bv in state.backup_volumes.iter_mut().filter(|bv| bv.name == volume) {
            bv.size = size;
        }
    }

    /// 卷在前 `polls` 次查询中保持 creating
    pub fn detach_after(&self, volume: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .detach_after
            .insert(volume.to_string(), polls);
    }

    /// PV/PVC 创建后状态不再变化，用来制造超时
    pub fn freeze_status(&self, volume: &str) {
        self.state.lock().unwrap().frozen.insert(volume.to_string());
    }

    pub fn fail_create(&self, volume: &str) {
        self.state.lock().unwrap().fail_create.insert(volume.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn create_calls(&self) -> Vec<CreateVolumeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateVolume(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn get_volume_calls(&self, volume: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .get_volume_calls
            .get(volume)
            .copied()
            .unwrap_or(0)
    }

    pub fn volume(&self, name: &str) -> Option<Volume> {
        self.state.lock().unwrap().volumes.get(name).cloned()
    }

    fn check_reachable(state: &State) -> Result<()> {
        if state.unreachable {
            return Err(Error::Request("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn backup_url(volume: &str, backup_name: &str) -> String {
    format!("s3://backups@us-east-1/?backup={}&volume={}", backup_name, volume)
}

#[async_trait]
impl LonghornApi for FakeLonghorn {
    async fn get_volume(&self, name: &str) -> Result<Option<Volume>> {
        let mut state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        *state.get_volume_calls.entry(name.to_string()).or_default() += 1;

        let still_creating = match state.detach_after.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        Ok(state.volumes.get_mut(name).map(|volume| {
            if volume.state == VolumeState::Creating && !still_creating {
                volume.state = VolumeState::Detached;
            }
            volume.clone()
        }))
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        Ok(state.volumes.values().cloned().collect())
    }

    async fn get_backup_volume(&self, name: &str) -> Result<Option<BackupVolume>> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        Ok(state.backup_volumes.iter().find(|bv| bv.name == name).cloned())
    }

    async fn list_backup_volumes(&self) -> Result<Vec<BackupVolume>> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        Ok(state.backup_volumes.clone())
    }

    async fn get_backup(&self, backup_volume: &str, backup_name: &str) -> Result<Backup> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        state
            .backups
            .get(&(backup_volume.to_string(), backup_name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("backup {}/{}", backup_volume, backup_name)))
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume> {
        let mut state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        state.calls.push(Call::CreateVolume(request.clone()));

        if state.fail_create.contains(&request.name) {
            return Err(Error::Request(format!("POST volumes returned 500: {}", request.name)));
        }
        if state.volumes.contains_key(&request.name) {
            return Err(Error::Request(format!("POST volumes returned 409: {}", request.name)));
        }

        let volume = Volume {
            name: request.name.clone(),
            state: VolumeState::Creating,
            size: request.size.parse().unwrap_or_default(),
            kubernetes_status: KubernetesStatus::default(),
        };
        state.volumes.insert(request.name.clone(), volume.clone());
        Ok(volume)
    }

    async fn add_recurring_job_group(&self, volume: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        state.calls.push(Call::RecurringJobAdd {
            volume: volume.to_string(),
            group: group.to_string(),
        });
        Ok(())
    }

    async fn create_pv(&self, volume: &str, pv_name: &str, fs_type: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        state.calls.push(Call::PvCreate {
            volume: volume.to_string(),
            pv_name: pv_name.to_string(),
            fs_type: fs_type.to_string(),
        });
        if state.frozen.contains(volume) {
            return Ok(());
        }
        let v = state
            .volumes
            .get_mut(volume)
            .ok_or_else(|| Error::NotFound(volume.to_string()))?;
        v.kubernetes_status.pv_name = pv_name.to_string();
        v.kubernetes_status.pv_status = "Available".to_string();
        Ok(())
    }

    async fn create_pvc(&self, volume: &str, namespace: &str, pvc_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_reachable(&state)?;
        state.calls.push(Call::PvcCreate {
            volume: volume.to_string(),
            namespace: namespace.to_string(),
            pvc_name: pvc_name.to_string(),
        });
        if state.frozen.contains(volume) {
            return Ok(());
        }
        let v = state
            .volumes
            .get_mut(volume)
            .ok_or_else(|| Error::NotFound(volume.to_string()))?;
        v.kubernetes_status.namespace = namespace.to_string();
        v.kubernetes_status.pvc_name = pvc_name.to_string();
        v.kubernetes_status.pv_status = "Bound".to_string();
        v.kubernetes_status.last_pvc_ref_at = PVC_REF_TIMESTAMP.to_string();
        Ok(())
    }
}

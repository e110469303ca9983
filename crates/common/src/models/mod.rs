/// Longhorn 数据模型
///
/// 对应 Longhorn v1 REST API 中的 Volume、BackupVolume、Backup 等资源

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{Error, Result};
use crate::utils::{de_null_default, de_size};

/// 备份标签中记录原始 Kubernetes 绑定信息的键
pub const LABEL_KUBERNETES_STATUS: &str = "KubernetesStatus";

// ============================================================================
// Volume
// ============================================================================

/// 卷生命周期状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Creating,
    Attached,
    Detached,
    Attaching,
    Detaching,
    Deleting,
    #[default]
    #[serde(other)]
    Unknown,
}

impl VolumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Attaching => "attaching",
            Self::Detaching => "detaching",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub state: VolumeState,
    #[serde(default, deserialize_with = "de_size")]
    pub size: u64,
    #[serde(default)]
    pub kubernetes_status: KubernetesStatus,
}

/// 卷上记录的 Kubernetes 绑定状态
///
/// 同样的结构以 JSON 字符串的形式保存在备份的 `KubernetesStatus` 标签中。
/// 缺失的字段按空字符串处理。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesStatus {
    pub pv_name: String,
    pub pv_status: String,
    pub namespace: String,
    pub pvc_name: String,
    #[serde(rename = "lastPVCRefAt")]
    pub last_pvc_ref_at: String,
    #[serde(rename = "lastPodRefAt")]
    pub last_pod_ref_at: String,
}

impl KubernetesStatus {
    /// 解码标签中的 JSON 字符串
    ///
    /// `source_name` 只用于错误信息，通常是备份或备份卷的名称。
    pub fn from_label(source_name: &str, blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| Error::MalformedLabel {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })
    }

    /// 从标签集合中取出并解码 `KubernetesStatus`，标签不存在时返回 `None`
    pub fn from_labels(source_name: &str, labels: &HashMap<String, String>) -> Result<Option<Self>> {
        labels
            .get(LABEL_KUBERNETES_STATUS)
            .map(|blob| Self::from_label(source_name, blob))
            .transpose()
    }

    pub fn get(&self, field: KubeStatusField) -> &str {
        match field {
            KubeStatusField::PvName => &self.pv_name,
            KubeStatusField::PvStatus => &self.pv_status,
            KubeStatusField::Namespace => &self.namespace,
            KubeStatusField::PvcName => &self.pvc_name,
            KubeStatusField::LastPvcRefAt => &self.last_pvc_ref_at,
            KubeStatusField::LastPodRefAt => &self.last_pod_ref_at,
        }
    }
}

/// `KubernetesStatus` 中可被等待的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KubeStatusField {
    PvName,
    PvStatus,
    Namespace,
    PvcName,
    LastPvcRefAt,
    LastPodRefAt,
}

impl KubeStatusField {
    /// API 中的字段名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PvName => "pvName",
            Self::PvStatus => "pvStatus",
            Self::Namespace => "namespace",
            Self::PvcName => "pvcName",
            Self::LastPvcRefAt => "lastPVCRefAt",
            Self::LastPodRefAt => "lastPodRefAt",
        }
    }

    /// 时间戳字段只比较“是否为空”，不比较具体值
    pub fn is_timestamp(&self) -> bool {
        matches!(self, Self::LastPvcRefAt | Self::LastPodRefAt)
    }
}

impl fmt::Display for KubeStatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// 备份
// ============================================================================

/// 备份卷：同一个源卷的所有备份
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVolume {
    pub name: String,
    #[serde(default, deserialize_with = "de_size")]
    pub size: u64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub last_backup_name: String,
    /// 最新备份的时间，RFC 3339
    #[serde(default, deserialize_with = "de_null_default")]
    pub last_backup_at: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub labels: HashMap<String, String>,
}

impl BackupVolume {
    pub fn kubernetes_status(&self) -> Result<Option<KubernetesStatus>> {
        KubernetesStatus::from_labels(&self.name, &self.labels)
    }
}

/// 某一时刻的备份快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub name: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub url: String,
    #[serde(default, deserialize_with = "de_size")]
    pub volume_size: u64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub labels: HashMap<String, String>,
}

impl Backup {
    pub fn kubernetes_status(&self) -> Result<Option<KubernetesStatus>> {
        KubernetesStatus::from_labels(&self.name, &self.labels)
    }
}

/// 列表接口的返回包装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

// ============================================================================
// 请求体
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    /// Longhorn 以十进制字符串传递字节数
    pub size: String,
    pub from_backup: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupGetRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvCreateRequest {
    pub pv_name: String,
    pub fs_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcCreateRequest {
    pub namespace: String,
    pub pvc_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringJobAddRequest {
    pub name: String,
    pub is_group: bool,
}

/// 常量定义
pub mod constants {
    /// 默认 Longhorn API 地址
    pub const DEFAULT_LONGHORN_URL: &str = "http://longhorn-frontend.longhorn-system/v1";

    /// 默认配置文件路径
    pub const DEFAULT_CONFIG_PATH: &str = "/config/config.json";

    /// 默认轮询间隔（秒）
    pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 1;

    /// 默认最大轮询次数
    pub const DEFAULT_RETRY_COUNT: u32 = 120;

    /// 创建 PV 时使用的文件系统
    pub const DEFAULT_FS_TYPE: &str = "ext4";

    pub const PV_STATUS_AVAILABLE: &str = "Available";
    pub const PV_STATUS_BOUND: &str = "Bound";
}
